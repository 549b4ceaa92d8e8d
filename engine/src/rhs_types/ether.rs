use super::bytes::{hex_byte, ByteSeparator};
use crate::lex::{Lex, LexResult};
use serde::{Serialize, Serializer};
use std::fmt;

/// A 6-byte hardware address.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct EtherAddr(pub [u8; 6]);

impl<'i> Lex<'i> for EtherAddr {
    fn lex(mut input: &str) -> LexResult<'_, Self> {
        let mut res = [0; 6];
        for (i, b) in res.iter_mut().enumerate() {
            if i != 0 {
                if let Ok((_, rest)) = ByteSeparator::lex(input) {
                    input = rest;
                }
            }
            let (value, rest) = hex_byte(input)?;
            *b = value;
            input = rest;
        }
        Ok((EtherAddr(res), input))
    }
}

impl fmt::Display for EtherAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EtherAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for EtherAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[test]
fn test() {
    use crate::lex::LexErrorKind;

    let addr = EtherAddr([0x00, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);

    assert_ok!(EtherAddr::lex("00:1b:2c:3d:4e:5f"), addr);
    assert_ok!(EtherAddr::lex("00-1B-2C-3D-4E-5F "), addr, " ");
    assert_ok!(EtherAddr::lex("001b.2c3d.4e5f"), addr);
    assert_ok!(EtherAddr::lex("001b2c3d4e5f"), addr);
    assert_err!(
        EtherAddr::lex("00:1b:2c"),
        LexErrorKind::CountMismatch {
            name: "character",
            actual: 0,
            expected: 2,
        },
        ""
    );
    assert_json!(addr, "00:1b:2c:3d:4e:5f");
}
