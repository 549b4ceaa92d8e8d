//! A display filter engine for decoded packets.
//!
//! Filters such as `tcp.port eq 80 and not ip.addr eq 10.0.0.0/8` are
//! compiled once against a [`FieldRegistry`] into an [`Ast`], which can then
//! be applied to any number of packets exposed through [`PacketTree`].
//!
//! ```
//! use dfilter::{FieldRegistry, FilterCompiler, ProtoTree};
//!
//! let registry = dfilter::Registry! {
//!     tcp {
//!         tcp.port: Uint16,
//!     },
//! };
//! let ast = FilterCompiler::new(&registry).compile("tcp.port eq 80").unwrap();
//!
//! let tcp = registry.get_field_id("tcp").unwrap();
//! let port = registry.get_field_id("tcp.port").unwrap();
//! let mut packet = ProtoTree::new(vec![0x00, 0x50]);
//! let root = packet.root_item();
//! let item = packet.add_protocol(root, tcp, 0, 2).unwrap();
//! packet.add_item(item, port, 0, 2, 80u16).unwrap();
//!
//! assert!(ast.apply(&packet));
//! # let _ = registry.field_count();
//! ```
#![warn(rust_2018_idioms)]

#[macro_use]
mod lex;

#[macro_use]
mod registry;

mod ast;
mod compare;
mod filter;
mod materialize;
mod rhs_types;
mod scanner;
mod tree;
mod types;

pub use self::{
    ast::{Ast, AstNode, ByteWindow, CompileError, CompilerSettings, FilterCompiler, LogicalOp, NodeId},
    lex::LexErrorKind,
    registry::{FieldId, FieldRegistry, Registry, RegistryError, RegistryType},
    rhs_types::{Bytes, EtherAddr, Ipv4Net, LiteralValue},
    tree::{FieldInstance, FieldValue, ItemId, PacketTree, ProtoTree, TreeError},
    types::{FieldType, RelOp, TypeMismatchError},
};

/// Compiles `text` against `registry` with default settings.
///
/// Prefer a long-lived [`FilterCompiler`] when compiling many filters for
/// the same registry.
pub fn compile<'i, R: FieldRegistry + ?Sized>(
    registry: &R,
    text: &'i str,
) -> Result<Ast, CompileError<'i>> {
    FilterCompiler::new(registry).compile(text)
}

/// Applies a compiled filter to one packet.
pub fn apply<T: PacketTree>(ast: &Ast, tree: &T) -> bool {
    ast.apply(tree)
}
