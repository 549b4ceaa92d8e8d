use crate::registry::RegistryType;
use serde::Serialize;
use std::{cmp::Ordering, convert::TryFrom};
use thiserror::Error;

/// Enumeration of scalar types a filter can compare.
///
/// This is the closed set the engine understands; registries describe their
/// fields with the richer [`RegistryType`] which is narrowed to a `FieldType`
/// while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    /// 8-bit unsigned integer.
    Unsigned8,
    /// 16-bit unsigned integer.
    Unsigned16,
    /// 32-bit unsigned integer.
    Unsigned32,
    /// IPv4 address.
    Ipv4,
    /// 6-byte hardware address.
    Ether,
    /// Boolean flag.
    Boolean,
    /// Opaque byte string.
    Bytes,
    /// Absolute timestamp.
    AbsTime,
    /// Field without a value, e.g. a protocol.
    NoValue,
}

/// How values of a [`FieldType`] are compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    /// Unsigned 32-bit ordering, narrower widths are promoted.
    Numeric,
    /// Numeric ordering of network addresses under the shorter prefix.
    Address,
    /// Exact equality only.
    Exact,
    /// `memcmp`-style ordering.
    Lexicographic,
    /// Only usable in existence tests.
    Incomparable,
}

impl FieldType {
    pub(crate) fn comparison(self) -> Comparison {
        match self {
            FieldType::Unsigned8 | FieldType::Unsigned16 | FieldType::Unsigned32 => {
                Comparison::Numeric
            }
            FieldType::Ipv4 => Comparison::Address,
            FieldType::Ether | FieldType::Boolean => Comparison::Exact,
            FieldType::Bytes => Comparison::Lexicographic,
            FieldType::AbsTime | FieldType::NoValue => Comparison::Incomparable,
        }
    }

    /// Width in bits of unsigned types.
    pub fn bits(self) -> Option<u32> {
        match self {
            FieldType::Unsigned8 => Some(8),
            FieldType::Unsigned16 => Some(16),
            FieldType::Unsigned32 => Some(32),
            _ => None,
        }
    }

    /// Returns whether relational operator `op` is defined for this type.
    pub fn supports(self, op: RelOp) -> bool {
        match self.comparison() {
            Comparison::Numeric | Comparison::Address => true,
            Comparison::Exact => matches!(op, RelOp::Equal | RelOp::NotEqual),
            Comparison::Lexicographic => matches!(
                op,
                RelOp::Equal | RelOp::NotEqual | RelOp::GreaterThan | RelOp::LessThan
            ),
            Comparison::Incomparable => false,
        }
    }

    /// Type both operands are compared as, if they are compatible.
    ///
    /// Unsigned integers of different widths are promoted to 32 bits.
    pub(crate) fn unify(self, other: FieldType) -> Result<FieldType, TypeMismatchError> {
        if self == other {
            Ok(self)
        } else if self.bits().is_some() && other.bits().is_some() {
            Ok(FieldType::Unsigned32)
        } else {
            Err(TypeMismatchError {
                expected: self,
                actual: other,
            })
        }
    }
}

impl TryFrom<RegistryType> for FieldType {
    type Error = RegistryType;

    fn try_from(ty: RegistryType) -> Result<Self, RegistryType> {
        Ok(match ty {
            RegistryType::Uint8 | RegistryType::ValsUint8 => FieldType::Unsigned8,
            RegistryType::Uint16 | RegistryType::ValsUint16 => FieldType::Unsigned16,
            RegistryType::Uint32 | RegistryType::ValsUint32 => FieldType::Unsigned32,
            RegistryType::Ether => FieldType::Ether,
            RegistryType::Ipv4 => FieldType::Ipv4,
            RegistryType::None => FieldType::NoValue,
            RegistryType::Bytes => FieldType::Bytes,
            RegistryType::Boolean => FieldType::Boolean,
            other => return Err(other),
        })
    }
}

/// An error that occurs on a type mismatch.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("expected value of type {expected:?}, but got {actual:?}")]
pub struct TypeMismatchError {
    /// Expected value type.
    pub expected: FieldType,
    /// Provided value type.
    pub actual: FieldType,
}

const LESS: u8 = 0b001;
const GREATER: u8 = 0b010;
const EQUAL: u8 = 0b100;

/// Relational operator of a comparison.
///
/// Each variant is a mask of the orderings it accepts.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
#[repr(u8)]
pub enum RelOp {
    /// `eq` / `==`
    Equal = EQUAL,
    /// `ne` / `!=`
    NotEqual = LESS | GREATER,
    /// `ge` / `>=`
    GreaterThanEqual = GREATER | EQUAL,
    /// `le` / `<=`
    LessThanEqual = LESS | EQUAL,
    /// `gt` / `>`
    GreaterThan = GREATER,
    /// `lt` / `<`
    LessThan = LESS,
}

impl RelOp {
    pub fn matches(self, ordering: Ordering) -> bool {
        let mask = self as u8;
        let flag = match ordering {
            Ordering::Less => LESS,
            Ordering::Greater => GREATER,
            Ordering::Equal => EQUAL,
        };
        mask & flag != 0
    }
}

#[test]
fn test_rel_op_matches() {
    use Ordering::*;

    let table = [
        (RelOp::Equal, [false, true, false]),
        (RelOp::NotEqual, [true, false, true]),
        (RelOp::GreaterThanEqual, [false, true, true]),
        (RelOp::LessThanEqual, [true, true, false]),
        (RelOp::GreaterThan, [false, false, true]),
        (RelOp::LessThan, [true, false, false]),
    ];

    for (op, expected) in table.iter() {
        for (ordering, expected) in [Less, Equal, Greater].iter().zip(expected.iter()) {
            assert_eq!(op.matches(*ordering), *expected, "{:?} {:?}", op, ordering);
        }
    }
}

#[test]
fn test_supports() {
    assert!(FieldType::Unsigned8.supports(RelOp::GreaterThanEqual));
    assert!(FieldType::Ipv4.supports(RelOp::LessThan));
    assert!(FieldType::Ether.supports(RelOp::NotEqual));
    assert!(!FieldType::Ether.supports(RelOp::GreaterThan));
    assert!(!FieldType::Boolean.supports(RelOp::LessThan));
    assert!(FieldType::Bytes.supports(RelOp::LessThan));
    assert!(!FieldType::Bytes.supports(RelOp::GreaterThanEqual));
    assert!(!FieldType::NoValue.supports(RelOp::Equal));
    assert!(!FieldType::AbsTime.supports(RelOp::Equal));
}

#[test]
fn test_unify() {
    assert_eq!(
        FieldType::Unsigned8.unify(FieldType::Unsigned16),
        Ok(FieldType::Unsigned32)
    );
    assert_eq!(FieldType::Ether.unify(FieldType::Ether), Ok(FieldType::Ether));
    assert_eq!(
        FieldType::Ipv4.unify(FieldType::Unsigned32),
        Err(TypeMismatchError {
            expected: FieldType::Ipv4,
            actual: FieldType::Unsigned32,
        })
    );
}

#[test]
fn test_registry_mapping() {
    assert_eq!(
        FieldType::try_from(RegistryType::ValsUint16),
        Ok(FieldType::Unsigned16)
    );
    assert_eq!(FieldType::try_from(RegistryType::None), Ok(FieldType::NoValue));
    assert_eq!(
        FieldType::try_from(RegistryType::Ipv6),
        Err(RegistryType::Ipv6)
    );
    assert_eq!(
        FieldType::try_from(RegistryType::AbsoluteTime),
        Err(RegistryType::AbsoluteTime)
    );
}
