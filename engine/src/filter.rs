use crate::{
    ast::{Ast, AstNode, LogicalOp, NodeId},
    compare::compare,
    materialize::materialize,
    tree::PacketTree,
};
use log::trace;

impl Ast {
    /// Evaluates the filter against one packet.
    pub fn apply<T: PacketTree>(&self, tree: &T) -> bool {
        self.eval(self.root(), tree)
    }

    fn eval<T: PacketTree>(&self, id: NodeId, tree: &T) -> bool {
        match *self.node(id) {
            AstNode::Existence { field } => tree.find_field_subtree(tree.root(), field).is_some(),
            AstNode::Unregistered { .. } => false,
            AstNode::Relation {
                op,
                lhs,
                rhs,
                ty,
                window,
            } => {
                let lhs_values = materialize(self, lhs, ty, window, tree);
                let rhs_values = materialize(self, rhs, ty, window, tree);
                let res = compare(op, &lhs_values, &rhs_values);
                trace!(
                    "{:?} {:?} {:?} as {:?} => {}",
                    lhs_values,
                    op,
                    rhs_values,
                    ty,
                    res
                );
                res
            }
            AstNode::Logical {
                op: LogicalOp::And,
                lhs,
                rhs: Some(rhs),
            } => self.eval(lhs, tree) && self.eval(rhs, tree),
            AstNode::Logical {
                op: LogicalOp::Or,
                lhs,
                rhs: Some(rhs),
            } => {
                let lhs = self.eval(lhs, tree);
                let rhs = self.eval(rhs, tree);
                lhs || rhs
            }
            AstNode::Logical {
                op: LogicalOp::Xor,
                lhs,
                rhs: Some(rhs),
            } => {
                let lhs = self.eval(lhs, tree);
                let rhs = self.eval(rhs, tree);
                lhs != rhs
            }
            AstNode::Logical {
                op: LogicalOp::Not,
                lhs,
                rhs: None,
            } => !self.eval(lhs, tree),
            AstNode::Logical { op, rhs, .. } => {
                unreachable!("{:?} with right operand {:?}", op, rhs)
            }
            AstNode::Literal { .. } | AstNode::FieldRef { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ast::{CompilerSettings, FilterCompiler},
        registry::{FieldId, Registry},
        tree::ProtoTree,
    };
    use lazy_static::lazy_static;
    use std::net::Ipv4Addr;

    lazy_static! {
        static ref REGISTRY: Registry = Registry! {
            ip {
                ip.src: Ipv4,
                ip.dst: Ipv4,
            },
            tcp {
                tcp.port: Uint16,
                tcp.flags.syn: Boolean,
            },
            udp {
                udp.port: Uint16,
            },
        };
        static ref COMPILER: FilterCompiler = FilterCompiler::new(&*REGISTRY);
    }

    fn field(name: &str) -> FieldId {
        REGISTRY.get_field_id(name).unwrap()
    }

    fn tcp_packet() -> ProtoTree {
        let mut tree = ProtoTree::new(vec![
            10, 0, 0, 1, // ip.src
            10, 0, 0, 2, // ip.dst
            0x1f, 0x90, // tcp.port
            0x00, 0x50, // tcp.port
            0x02, // tcp.flags.syn
        ]);
        let root = tree.root_item();
        let ip = tree.add_protocol(root, field("ip"), 0, 8).unwrap();
        tree.add_item(ip, field("ip.src"), 0, 4, Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();
        tree.add_item(ip, field("ip.dst"), 4, 4, Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();
        let tcp = tree.add_protocol(root, field("tcp"), 8, 5).unwrap();
        tree.add_item(tcp, field("tcp.port"), 8, 2, 8080u16).unwrap();
        tree.add_item(tcp, field("tcp.port"), 10, 2, 80u16).unwrap();
        tree.add_item(tcp, field("tcp.flags.syn"), 12, 1, true)
            .unwrap();
        tree
    }

    fn apply(filter: &str) -> bool {
        COMPILER.compile(filter).unwrap().apply(&tcp_packet())
    }

    #[test]
    fn test_relations() {
        assert!(apply("tcp.port eq 80"));
        assert!(apply("tcp.port == 8080"));
        assert!(!apply("tcp.port eq 443"));
        assert!(apply("tcp.port gt 1024"));
        assert!(apply("ip.src lt ip.dst"));
        assert!(apply("ip.dst eq 10.0.0.0/24"));
        assert!(apply("tcp.flags.syn"));
        assert!(apply("tcp.flags.syn eq true"));
        assert!(apply("tcp.port[1] eq 50"));
        assert!(!apply("udp.port eq 80"));
        assert!(!apply("udp.port ne 80"));
    }

    #[test]
    fn test_logical() {
        assert!(apply("tcp and ip"));
        assert!(!apply("tcp and udp"));
        assert!(apply("udp or tcp"));
        assert!(!apply("not tcp"));
        assert!(apply("!udp"));
        assert!(apply("not (udp or tcp.port eq 22)"));
        assert!(apply("tcp.port eq 22 or tcp.port eq 80 and ip"));
    }

    #[test]
    fn test_xor() {
        assert!(!apply("tcp xor ip"));
        assert!(apply("tcp xor udp"));
        assert!(apply("udp ^^ ip"));
        assert!(!apply("udp xor udp.port"));

        let legacy = FilterCompiler::with_settings(
            &*REGISTRY,
            CompilerSettings {
                legacy_xor: true,
                ..CompilerSettings::default()
            },
        );
        assert!(legacy.compile("tcp xor ip").unwrap().apply(&tcp_packet()));
        assert!(legacy.compile("tcp xor udp").unwrap().apply(&tcp_packet()));
        assert!(!legacy.compile("udp xor udp.port").unwrap().apply(&tcp_packet()));
    }

    #[test]
    fn test_bare_literals() {
        assert!(apply("true"));
        assert!(apply("false"));
        assert!(apply(r#""anything""#));
    }

    #[test]
    fn test_empty_packet() {
        let tree = ProtoTree::new(Vec::new());
        for filter in &["tcp", "tcp.port eq 80", "tcp.port ne 80", "ip.src le 0.0.0.0"] {
            assert!(!COMPILER.compile(filter).unwrap().apply(&tree), "{}", filter);
        }
        assert!(COMPILER.compile("not tcp").unwrap().apply(&tree));
    }
}
