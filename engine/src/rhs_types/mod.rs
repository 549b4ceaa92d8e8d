mod bytes;
mod ether;
mod int;
mod ipv4;

pub use self::{bytes::Bytes, ether::EtherAddr, ipv4::Ipv4Net};
pub(crate) use self::int::lex_unsigned;

use crate::{
    lex::{complete, Lex, LexError, LexErrorKind},
    types::FieldType,
};
use serde::Serialize;

/// A constant operand of a relation.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    /// Unsigned integer, range-checked against the width it is compared at.
    Unsigned(u32),
    Ipv4(Ipv4Net),
    Ether(EtherAddr),
    Boolean(bool),
    Bytes(Bytes),
}

impl LiteralValue {
    /// Interprets a bare word as a literal of type `ty`.
    ///
    /// The scanner cannot tell `10.0.0.1`, `00:1b:2c:3d:4e:5f` or `80` apart
    /// from field names, so words are only resolved once the relation type is
    /// known.
    pub(crate) fn lex_word(word: &str, ty: FieldType) -> Result<Self, LexError<'_>> {
        Ok(match ty {
            FieldType::Unsigned8 | FieldType::Unsigned16 | FieldType::Unsigned32 => {
                LiteralValue::Unsigned(lex_unsigned(word, ty.bits().unwrap_or(32))?)
            }
            FieldType::Ipv4 => LiteralValue::Ipv4(complete(Ipv4Net::lex(word))?),
            FieldType::Ether => LiteralValue::Ether(complete(EtherAddr::lex(word))?),
            FieldType::Boolean => LiteralValue::Boolean(lex_unsigned(word, 32)? != 0),
            FieldType::Bytes => LiteralValue::Bytes(complete(Bytes::lex(word))?),
            FieldType::AbsTime | FieldType::NoValue => {
                return Err((LexErrorKind::UnsupportedOp { lhs_type: ty }, word))
            }
        })
    }
}

#[test]
fn test_lex_word() {
    use std::net::Ipv4Addr;

    assert_eq!(
        LiteralValue::lex_word("80", FieldType::Unsigned16),
        Ok(LiteralValue::Unsigned(80))
    );
    assert_eq!(
        LiteralValue::lex_word("300", FieldType::Unsigned8),
        Err((LexErrorKind::IntegerOutOfRange { bits: 8 }, "300"))
    );
    assert_eq!(
        LiteralValue::lex_word("1.2.3.4", FieldType::Ipv4),
        Ok(LiteralValue::Ipv4(Ipv4Net::host(Ipv4Addr::new(1, 2, 3, 4))))
    );
    assert_eq!(
        LiteralValue::lex_word("1.2.3.4", FieldType::Unsigned32),
        Err((LexErrorKind::NonIntegralNumber, "1.2.3.4"))
    );
    assert_eq!(
        LiteralValue::lex_word("00:01:02:03:04:05", FieldType::Ether),
        Ok(LiteralValue::Ether(EtherAddr([0, 1, 2, 3, 4, 5])))
    );
    assert_eq!(
        LiteralValue::lex_word("00:01:02", FieldType::Bytes),
        Ok(LiteralValue::Bytes(Bytes::from(vec![0, 1, 2])))
    );
    assert_eq!(
        LiteralValue::lex_word("2", FieldType::Boolean),
        Ok(LiteralValue::Boolean(true))
    );
    assert_eq!(
        LiteralValue::lex_word("1", FieldType::NoValue),
        Err((
            LexErrorKind::UnsupportedOp {
                lhs_type: FieldType::NoValue
            },
            "1"
        ))
    );
}

#[test]
fn test_serialize() {
    assert_json!(LiteralValue::Unsigned(80), 80);
    assert_json!(LiteralValue::Boolean(false), false);
    assert_json!(LiteralValue::Bytes(Bytes::from("ab")), [97, 98]);
    assert_json!(
        LiteralValue::Ether(EtherAddr([0, 1, 2, 3, 4, 5])),
        "00:01:02:03:04:05"
    );
}
