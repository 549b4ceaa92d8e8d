use crate::{
    ast::{Ast, AstNode, ByteWindow, NodeId},
    rhs_types::{EtherAddr, Ipv4Net, LiteralValue},
    tree::{FieldInstance, FieldValue, PacketTree},
    types::FieldType,
};
use log::warn;

/// The values one relation operand denotes in one packet, in tree order.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Values<'v> {
    Unsigned(Vec<u32>),
    Ipv4(Vec<Ipv4Net>),
    Ether(Vec<[u8; 6]>),
    Boolean(Vec<bool>),
    Bytes(Vec<&'v [u8]>),
}

fn window_bytes(bytes: &[u8], window: Option<ByteWindow>) -> Option<&[u8]> {
    match window {
        Some(window) => bytes.get(window.offset..window.offset.checked_add(window.length)?),
        None => Some(bytes),
    }
}

impl<'v> Values<'v> {
    fn new(ty: FieldType) -> Self {
        match ty {
            FieldType::Unsigned8 | FieldType::Unsigned16 | FieldType::Unsigned32 => {
                Values::Unsigned(Vec::new())
            }
            FieldType::Ipv4 => Values::Ipv4(Vec::new()),
            FieldType::Ether => Values::Ether(Vec::new()),
            FieldType::Boolean => Values::Boolean(Vec::new()),
            FieldType::Bytes => Values::Bytes(Vec::new()),
            FieldType::AbsTime | FieldType::NoValue => {
                unreachable!("relation compared as {:?}", ty)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Unsigned(values) => values.len(),
            Values::Ipv4(values) => values.len(),
            Values::Ether(values) => values.len(),
            Values::Boolean(values) => values.len(),
            Values::Bytes(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_instance(&mut self, instance: FieldInstance<'v>, window: Option<ByteWindow>) {
        match (self, instance.value) {
            (Values::Unsigned(values), FieldValue::Unsigned(value)) => values.push(*value),
            (Values::Ipv4(values), FieldValue::Ipv4(addr)) => values.push(Ipv4Net::host(*addr)),
            (Values::Ether(values), FieldValue::Ether(addr)) => values.push(*addr),
            (Values::Boolean(values), FieldValue::Boolean(value)) => values.push(*value),
            (Values::Bytes(values), _) => {
                if let Some(bytes) = window_bytes(instance.bytes, window) {
                    values.push(bytes);
                }
            }
            (values, value) => warn!(
                "skipping field instance at offset {} with value {:?}, expected {}",
                instance.offset,
                value,
                values.kind()
            ),
        }
    }

    fn push_literal(&mut self, literal: &'v LiteralValue, window: Option<ByteWindow>) {
        match (self, literal) {
            (Values::Unsigned(values), LiteralValue::Unsigned(value)) => values.push(*value),
            (Values::Ipv4(values), LiteralValue::Ipv4(net)) => values.push(*net),
            (Values::Ether(values), LiteralValue::Ether(EtherAddr(addr))) => values.push(*addr),
            (Values::Boolean(values), LiteralValue::Boolean(value)) => values.push(*value),
            (Values::Bytes(values), LiteralValue::Bytes(bytes)) => {
                // literals are not offset, only cut to the window length
                let bytes = match window {
                    Some(window) => bytes.get(..window.length),
                    None => Some(&bytes[..]),
                };
                if let Some(bytes) = bytes {
                    values.push(bytes);
                }
            }
            (values, literal) => unreachable!(
                "literal {:?} in a relation compared as {}",
                literal,
                values.kind()
            ),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Values::Unsigned(_) => "an unsigned integer",
            Values::Ipv4(_) => "an IPv4 address",
            Values::Ether(_) => "an Ethernet address",
            Values::Boolean(_) => "a boolean",
            Values::Bytes(_) => "bytes",
        }
    }
}

/// Collects the values of a relation operand.
///
/// Field references yield every instance found under the field's protocol
/// subtree, a literal yields itself. Both are cut to `window` when compared
/// as bytes.
pub(crate) fn materialize<'v, T: PacketTree>(
    ast: &'v Ast,
    operand: NodeId,
    ty: FieldType,
    window: Option<ByteWindow>,
    tree: &'v T,
) -> Values<'v> {
    let mut values = Values::new(ty);

    match ast.node(operand) {
        AstNode::Literal { value, .. } => values.push_literal(value, window),
        AstNode::FieldRef {
            field, protocol, ..
        } => {
            let root = tree.root();
            let subtree = match protocol {
                Some(protocol) => match tree.find_protocol_subtree(root, *protocol) {
                    Some(subtree) => subtree,
                    None => return values,
                },
                None => root,
            };
            tree.for_each_field_instance(subtree, *field, |instance| {
                values.push_instance(instance, window)
            });
        }
        node => panic!("{:?} is not a relation operand", node),
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::FilterCompiler,
        registry::{FieldId, Registry},
        tree::ProtoTree,
    };
    use lazy_static::lazy_static;
    use std::net::Ipv4Addr;

    lazy_static! {
        static ref REGISTRY: Registry = Registry! {
            eth {
                eth.src: Ether,
            },
            ip {
                ip.addr: Ipv4,
                ip.ttl: Uint8,
            },
            udp {
                udp.port: Uint16,
            },
        };
    }

    fn field(name: &str) -> FieldId {
        REGISTRY.get_field_id(name).unwrap()
    }

    fn packet() -> ProtoTree {
        let mut tree = ProtoTree::new(vec![
            0, 1, 2, 3, 4, 5, // eth.src
            10, 0, 0, 1, // ip.addr
            10, 0, 0, 2, // ip.addr
            64, // ip.ttl
        ]);
        let root = tree.root_item();
        let eth = tree.add_protocol(root, field("eth"), 0, 6).unwrap();
        tree.add_item(eth, field("eth.src"), 0, 6, [0, 1, 2, 3, 4, 5])
            .unwrap();
        let ip = tree.add_protocol(root, field("ip"), 6, 9).unwrap();
        tree.add_item(ip, field("ip.addr"), 6, 4, Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();
        tree.add_item(ip, field("ip.addr"), 10, 4, Ipv4Addr::new(10, 0, 0, 2))
            .unwrap();
        // wrong shape for an Ipv4 field
        tree.add_item(ip, field("ip.addr"), 10, 4, 7u32).unwrap();
        tree.add_item(ip, field("ip.ttl"), 14, 1, 64u8).unwrap();
        tree
    }

    /// Materializes both operands of a single relation.
    fn operands<'v>(ast: &'v Ast, tree: &'v ProtoTree) -> (Values<'v>, Values<'v>) {
        match *ast.node(ast.root()) {
            AstNode::Relation {
                lhs,
                rhs,
                ty,
                window,
                ..
            } => (
                materialize(ast, lhs, ty, window, tree),
                materialize(ast, rhs, ty, window, tree),
            ),
            ref node => panic!("unexpected root {:?}", node),
        }
    }

    #[test]
    fn test_field_instances() {
        let compiler = FilterCompiler::new(&*REGISTRY);
        let tree = packet();

        let ast = compiler.compile("ip.addr eq 10.0.0.0/8").unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert_eq!(
            lhs,
            Values::Ipv4(vec![
                Ipv4Net::host(Ipv4Addr::new(10, 0, 0, 1)),
                Ipv4Net::host(Ipv4Addr::new(10, 0, 0, 2)),
            ])
        );
        assert_eq!(
            rhs,
            Values::Ipv4(vec![Ipv4Net {
                addr: Ipv4Addr::new(10, 0, 0, 0),
                prefix: 8,
            }])
        );

        let ast = compiler.compile("ip.ttl ge 64").unwrap();
        assert_eq!(operands(&ast, &tree).0, Values::Unsigned(vec![64]));
    }

    #[test]
    fn test_missing_protocol() {
        let compiler = FilterCompiler::new(&*REGISTRY);
        let tree = packet();

        let ast = compiler.compile("udp.port eq 53").unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert!(lhs.is_empty());
        assert_eq!(rhs.len(), 1);
    }

    #[test]
    fn test_byte_windows() {
        let compiler = FilterCompiler::new(&*REGISTRY);
        let tree = packet();

        let ast = compiler.compile("eth.src[2:3] eq 02:03:04:05").unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert_eq!(lhs, Values::Bytes(vec![&[2, 3, 4][..]]));
        assert_eq!(rhs, Values::Bytes(vec![&[2, 3, 4][..]]));

        // the window runs past the end of the field
        let ast = compiler.compile("eth.src[4:4] eq 04:05:06:07").unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert!(lhs.is_empty());
        assert_eq!(rhs.len(), 1);

        // a literal shorter than the slice narrows the window
        let ast = compiler.compile("eth.src[0:4] eq 00:01").unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert_eq!(lhs, Values::Bytes(vec![&[0, 1][..]]));
        assert_eq!(rhs, Values::Bytes(vec![&[0, 1][..]]));

        // both fields are cut to the intersection of their slices
        let ast = compiler.compile(r#"ip.addr[0:4] eq ip.ttl[0:1]"#).unwrap();
        let (lhs, rhs) = operands(&ast, &tree);
        assert_eq!(
            lhs,
            Values::Bytes(vec![&[10][..], &[10][..], &[10][..]])
        );
        assert_eq!(rhs, Values::Bytes(vec![&[64][..]]));
    }
}
