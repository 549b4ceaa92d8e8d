mod parse;

pub use self::parse::{CompileError, CompilerSettings, FilterCompiler};

use crate::{
    registry::FieldId,
    rhs_types::LiteralValue,
    types::{FieldType, RelOp},
};
use serde::{Serialize, Serializer};
use std::fmt::{self, Debug};

/// Index of a node inside the [`Ast`] that created it.
#[derive(PartialEq, Eq, Clone, Copy, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Range of bytes a comparison looks at.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub struct ByteWindow {
    pub offset: usize,
    pub length: usize,
}

impl ByteWindow {
    /// Component-wise minimum of two declared windows.
    pub fn intersect(self, other: ByteWindow) -> ByteWindow {
        ByteWindow {
            offset: self.offset.min(other.offset),
            length: self.length.min(other.length),
        }
    }
}

/// Operator of a [`AstNode::Logical`] node.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum LogicalOp {
    /// `and` / `&&`
    And,
    /// `or` / `||`
    Or,
    /// `xor` / `^^`
    Xor,
    /// `not` / `!`, the only unary operator.
    Not,
}

impl LogicalOp {
    /// Binding strength of binary operators, higher binds tighter.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            LogicalOp::Or | LogicalOp::Xor => 1,
            LogicalOp::And => 2,
            LogicalOp::Not => 3,
        }
    }
}

/// A node of a compiled filter.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AstNode {
    /// A constant typed for the relation it appears in.
    Literal { ty: FieldType, value: LiteralValue },

    /// A reference to every instance of a field in the packet.
    FieldRef {
        field: FieldId,
        ty: FieldType,
        /// Protocol subtree the instances are collected from.
        protocol: Option<FieldId>,
        /// The `[offset:length]` the operand declared, if any.
        slice: Option<ByteWindow>,
    },

    /// An existential comparison between two operands.
    Relation {
        op: RelOp,
        lhs: NodeId,
        rhs: NodeId,
        /// Type both operands are compared as.
        ty: FieldType,
        /// Intersection of the operands' slices, `None` when neither is sliced.
        window: Option<ByteWindow>,
    },

    Logical {
        op: LogicalOp,
        lhs: NodeId,
        /// Always `None` for [`LogicalOp::Not`] and `Some` otherwise.
        rhs: Option<NodeId>,
    },

    /// True iff the field or protocol occurs in the packet.
    Existence { field: FieldId },

    /// Existence test of a name the registry does not know, never true.
    Unregistered { abbrev: String },
}

/// A compiled filter.
///
/// Nodes live in a flat arena owned by the `Ast`; a compiled filter is
/// immutable and can be applied to any number of packets.
#[derive(PartialEq, Eq, Clone)]
pub struct Ast {
    nodes: Vec<AstNode>,
    root: NodeId,
}

impl Ast {
    pub(crate) fn new(nodes: Vec<AstNode>, root: NodeId) -> Self {
        Ast { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns a node of this tree.
    ///
    /// Panics if `id` was produced by another compile.
    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the filter refers to `field`, either in a relation or in an
    /// existence test.
    pub fn uses(&self, field: FieldId) -> bool {
        self.nodes.iter().any(|node| match node {
            AstNode::FieldRef { field: f, .. } | AstNode::Existence { field: f } => *f == field,
            _ => false,
        })
    }

    fn view(&self, id: NodeId) -> NodeView<'_> {
        let child = |id| NodeRef { ast: self, id };
        match self.node(id) {
            AstNode::Literal { ty, value } => NodeView::Literal { ty: *ty, value },
            AstNode::FieldRef {
                field,
                ty,
                protocol,
                slice,
            } => NodeView::Field {
                field: *field,
                ty: *ty,
                protocol: *protocol,
                slice: *slice,
            },
            AstNode::Relation {
                op,
                lhs,
                rhs,
                ty,
                window,
            } => NodeView::Relation {
                op: *op,
                ty: *ty,
                window: *window,
                lhs: child(*lhs),
                rhs: child(*rhs),
            },
            AstNode::Logical {
                op,
                lhs,
                rhs: Some(rhs),
            } => NodeView::Combining {
                op: *op,
                items: [child(*lhs), child(*rhs)],
            },
            AstNode::Logical { op, lhs, rhs: None } => NodeView::Unary {
                op: *op,
                arg: child(*lhs),
            },
            AstNode::Existence { field } => NodeView::Existence { exists: *field },
            AstNode::Unregistered { abbrev } => NodeView::Unregistered {
                unregistered: abbrev,
            },
        }
    }
}

impl Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        NodeRef {
            ast: self,
            id: self.root,
        }
        .fmt(f)
    }
}

impl Serialize for Ast {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.view(self.root).serialize(serializer)
    }
}

#[derive(Clone, Copy)]
struct NodeRef<'a> {
    ast: &'a Ast,
    id: NodeId,
}

impl Serialize for NodeRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ast.view(self.id).serialize(serializer)
    }
}

impl Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ast.view(self.id).fmt(f)
    }
}

/// Nested rendering of the arena.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum NodeView<'a> {
    Literal {
        #[serde(rename = "type")]
        ty: FieldType,
        value: &'a LiteralValue,
    },
    Field {
        field: FieldId,
        #[serde(rename = "type")]
        ty: FieldType,
        protocol: Option<FieldId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        slice: Option<ByteWindow>,
    },
    Relation {
        op: RelOp,
        #[serde(rename = "type")]
        ty: FieldType,
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<ByteWindow>,
        lhs: NodeRef<'a>,
        rhs: NodeRef<'a>,
    },
    Combining {
        op: LogicalOp,
        items: [NodeRef<'a>; 2],
    },
    Unary {
        op: LogicalOp,
        arg: NodeRef<'a>,
    },
    Existence {
        exists: FieldId,
    },
    Unregistered {
        unregistered: &'a str,
    },
}

#[test]
fn test_intersect() {
    let a = ByteWindow {
        offset: 2,
        length: 4,
    };
    let b = ByteWindow {
        offset: 0,
        length: 6,
    };
    assert_eq!(
        a.intersect(b),
        ByteWindow {
            offset: 0,
            length: 4,
        }
    );
}
