use crate::lex::{expect, take, Lex, LexErrorKind, LexResult};
use serde::Serialize;
use std::{
    fmt::{self, Debug, Formatter},
    ops::Deref,
};

/// An owned byte string literal.
#[derive(PartialEq, Eq, Clone, PartialOrd, Ord, Hash, Serialize)]
pub struct Bytes(Box<[u8]>);

impl From<Vec<u8>> for Bytes {
    fn from(src: Vec<u8>) -> Self {
        Bytes(src.into_boxed_slice())
    }
}

impl From<&[u8]> for Bytes {
    fn from(src: &[u8]) -> Self {
        Bytes(src.into())
    }
}

impl From<&str> for Bytes {
    fn from(src: &str) -> Self {
        src.as_bytes().into()
    }
}

impl Debug for Bytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for &b in self.iter() {
            match b {
                b'"' => write!(f, r#"\""#),
                b'\\' => write!(f, r#"\\"#),
                0x20..=0x7E => write!(f, "{}", b as char),
                _ => write!(f, r#"\x{:02X}"#, b),
            }?;
        }
        write!(f, "\"")
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

fn fixed_byte(input: &str, digits: usize, radix: u32) -> LexResult<'_, u8> {
    let (digits, rest) = take(input, digits)?;
    match u8::from_str_radix(digits, radix) {
        Ok(b) => Ok((b, rest)),
        Err(err) => Err((LexErrorKind::ParseInt { err, radix }, digits)),
    }
}

pub(crate) fn hex_byte(input: &str) -> LexResult<'_, u8> {
    fixed_byte(input, 2, 16)
}

fn oct_byte(input: &str) -> LexResult<'_, u8> {
    fixed_byte(input, 3, 8)
}

lex_enum!(ByteSeparator {
    ":" => Colon,
    "-" => Dash,
    "." => Dot,
});

fn lex_quoted(input: &str) -> LexResult<'_, Bytes> {
    let mut res = Vec::new();
    let mut iter = input.chars();
    loop {
        let before = iter.as_str();
        match iter
            .next()
            .ok_or((LexErrorKind::MissingEndingQuote, input))?
        {
            '\\' => {
                let escape = iter.as_str();
                match iter.next() {
                    Some(c @ '"') | Some(c @ '\\') => res.push(c as u8),
                    Some('x') => {
                        let (b, rest) = hex_byte(iter.as_str())?;
                        res.push(b);
                        iter = rest.chars();
                    }
                    Some('0'..='7') => {
                        let (b, rest) = oct_byte(escape)?;
                        res.push(b);
                        iter = rest.chars();
                    }
                    Some(c) => {
                        return Err((
                            LexErrorKind::InvalidCharacterEscape,
                            &escape[..c.len_utf8()],
                        ));
                    }
                    None => return Err((LexErrorKind::MissingEndingQuote, input)),
                }
            }
            '"' => return Ok((res.into(), iter.as_str())),
            c => res.extend_from_slice(before[..c.len_utf8()].as_bytes()),
        }
    }
}

impl<'i> Lex<'i> for Bytes {
    /// Lexes either a quoted string or hex bytes joined by separators.
    fn lex(mut input: &str) -> LexResult<'_, Self> {
        if let Ok(input) = expect(input, "\"") {
            lex_quoted(input)
        } else {
            let mut res = Vec::new();
            loop {
                let (b, rest) = hex_byte(input)?;
                res.push(b);
                input = rest;
                match ByteSeparator::lex(input) {
                    Ok((_, rest)) => input = rest,
                    Err(_) => return Ok((res.into(), input)),
                }
            }
        }
    }
}

#[test]
fn test() {
    assert_ok!(
        Bytes::lex("01:2e:f3-77.12;"),
        Bytes::from(vec![0x01, 0x2E, 0xF3, 0x77, 0x12]),
        ";"
    );

    assert_ok!(
        Bytes::lex(r#""s\\t\"r\x0A\000t""#),
        Bytes::from("s\\t\"r\n\0t")
    );

    assert_ok!(
        Bytes::lex(r#""\xff\200" and"#),
        Bytes::from(vec![0xFF, 0x80]),
        " and"
    );

    assert_ok!(Bytes::lex("\"é\""), Bytes::from("é"));

    assert_err!(
        Bytes::lex("01:4x;"),
        LexErrorKind::ParseInt {
            err: u8::from_str_radix("4x", 16).unwrap_err(),
            radix: 16,
        },
        "4x"
    );

    assert_ok!(Bytes::lex("01;"), Bytes::from(vec![0x01]), ";");

    assert_ok!(Bytes::lex("01:2f-34"), Bytes::from(vec![0x01, 0x2F, 0x34]));

    assert_err!(Bytes::lex("\"1"), LexErrorKind::MissingEndingQuote, "1");

    assert_err!(Bytes::lex("\"1\\"), LexErrorKind::MissingEndingQuote, "1\\");

    assert_err!(
        Bytes::lex(r#""\n""#),
        LexErrorKind::InvalidCharacterEscape,
        "n"
    );
}

#[test]
fn test_debug() {
    assert_eq!(
        format!("{:?}", Bytes::from(vec![b'a', b'"', 0x01])),
        r#""a\"\x01""#
    );
}
