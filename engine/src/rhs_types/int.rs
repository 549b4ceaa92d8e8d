use crate::lex::{complete, expect, take_while, Lex, LexError, LexErrorKind, LexResult};
use std::str::FromStr;

fn number(input: &str, radix: u32) -> LexResult<'_, u32> {
    let (digits, input) = take_while(input, "digit", |c| c.is_digit(radix))?;
    match u32::from_str_radix(digits, radix) {
        Ok(res) => Ok((res, input)),
        Err(err) => Err((LexErrorKind::ParseInt { err, radix }, digits)),
    }
}

impl<'i> Lex<'i> for u32 {
    fn lex(input: &str) -> LexResult<'_, Self> {
        if let Ok(input) = expect(input, "0") {
            match input.chars().next() {
                Some(c) if c.is_digit(8) => number(input, 8),
                Some('x') | Some('X') => number(&input[1..], 16),
                Some('b') | Some('B') => number(&input[1..], 2),
                _ => Ok((0, input)),
            }
        } else {
            number(input, 10)
        }
    }
}

fn looks_like_float(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_digit())
        && !word.starts_with("0x")
        && !word.starts_with("0X")
        && word.contains(|c| matches!(c, '.' | 'e' | 'E'))
}

fn integral_float(word: &str) -> Result<u32, LexError<'_>> {
    match f64::from_str(word) {
        Ok(value)
            if value.is_finite()
                && value.fract() == 0.0
                && value >= 0.0
                && value <= f64::from(u32::MAX) =>
        {
            Ok(value as u32)
        }
        _ => Err((LexErrorKind::NonIntegralNumber, word)),
    }
}

/// Lexes a whole word as an unsigned integer that must fit into `bits`.
///
/// Float spellings are accepted as long as they denote an integer.
pub(crate) fn lex_unsigned(word: &str, bits: u32) -> Result<u32, LexError<'_>> {
    let value = match complete(u32::lex(word)) {
        Ok(value) => value,
        Err(_) if looks_like_float(word) => integral_float(word)?,
        Err(err) => return Err(err),
    };
    if bits < 32 && value >> bits != 0 {
        return Err((LexErrorKind::IntegerOutOfRange { bits }, word));
    }
    Ok(value)
}

#[test]
fn test() {
    assert_ok!(u32::lex("0"), 0u32, "");
    assert_ok!(u32::lex("0-"), 0u32, "-");
    assert_ok!(u32::lex("0x1f5+"), 501u32, "+");
    assert_ok!(u32::lex("0123;"), 83u32, ";");
    assert_ok!(u32::lex("0b101]"), 5u32, "]");
    assert_ok!(u32::lex("78!"), 78u32, "!");
    assert_ok!(u32::lex("0xefg"), 239u32, "g");
    assert_err!(
        u32::lex("4294967296"),
        LexErrorKind::ParseInt {
            err: u32::from_str_radix("4294967296", 10).unwrap_err(),
            radix: 10,
        },
        "4294967296"
    );
}

#[test]
fn test_lex_unsigned() {
    assert_eq!(lex_unsigned("80", 16), Ok(80));
    assert_eq!(lex_unsigned("0x50", 16), Ok(80));
    assert_eq!(lex_unsigned("80.0", 16), Ok(80));
    assert_eq!(lex_unsigned("1e3", 16), Ok(1000));
    assert_eq!(lex_unsigned("255", 8), Ok(255));
    assert_eq!(
        lex_unsigned("256", 8),
        Err((LexErrorKind::IntegerOutOfRange { bits: 8 }, "256"))
    );
    assert_eq!(
        lex_unsigned("1.5", 32),
        Err((LexErrorKind::NonIntegralNumber, "1.5"))
    );
    assert_eq!(
        lex_unsigned("80x", 16),
        Err((LexErrorKind::EOF, "x"))
    );
    assert_eq!(
        lex_unsigned("tcp", 16),
        Err((LexErrorKind::ExpectedName("digit"), "tcp"))
    );
}
