use crate::{
    registry::RegistryType,
    types::{FieldType, TypeMismatchError},
};
use cidr::errors::NetworkParseError;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
/// LexErrorKind occurs when there is an invalid or unexpected token.
pub enum LexErrorKind {
    /// Expected the next token to be of a given kind
    #[error("expected {0}")]
    ExpectedName(&'static str),

    /// Expected the next token to be a literal
    #[error("expected literal {0:?}")]
    ExpectedLiteral(&'static str),

    /// Expected the next token to be an integer
    #[error("{err} while parsing with radix {radix}")]
    ParseInt {
        /// The error that occurred parsing the token as an integer
        #[source]
        err: ParseIntError,
        /// The base of the number
        radix: u32,
    },

    /// A numeric literal does not fit into the field it is compared with
    #[error("value does not fit into a {bits}-bit unsigned field")]
    IntegerOutOfRange {
        /// Width of the field
        bits: u32,
    },

    /// A float literal was compared with an unsigned field but is not integral
    #[error("expected an integral number")]
    NonIntegralNumber,

    /// Expected the next token to be an IPv4 address or network
    #[error("{0}")]
    ParseNetwork(#[source] NetworkParseError),

    /// Expected the next token to be an escape character
    #[error("expected \", xHH or OOO after \\")]
    InvalidCharacterEscape,

    /// Expected the next token to be an ending quote
    #[error("could not find an ending quote")]
    MissingEndingQuote,

    /// Expected to take some number of characters from the input but the
    /// input was too short
    #[error("expected {expected} {name}s, but found {actual}")]
    CountMismatch {
        /// This is set to "character" for all occurences of this error
        name: &'static str,
        /// The actual number of characters
        actual: usize,
        /// The expected number of characters
        expected: usize,
    },

    /// The word is neither a keyword nor a registered field abbreviation
    #[error("unknown identifier")]
    UnknownIdentifier,

    /// The field is registered with a type the filter engine cannot compare
    #[error("field has unsupported type {0:?}")]
    UnsupportedFieldType(RegistryType),

    /// The operation cannot be performed on this type
    #[error("cannot perform this operation on type {lhs_type:?}")]
    UnsupportedOp {
        /// The type the comparison resolved to
        lhs_type: FieldType,
    },

    /// Both sides of a relation resolved to incompatible types
    #[error("{0}")]
    TypeMismatch(#[source] TypeMismatchError),

    /// Neither side of a relation carries a type
    #[error("cannot infer the type of a comparison between two untyped literals")]
    UntypedComparison,

    /// A byte slice is empty or overflows
    #[error("invalid byte slice")]
    InvalidSlice,

    /// Parentheses or negations are nested deeper than the configured limit
    #[error("expression is nested deeper than {limit} levels")]
    TooDeep {
        /// Configured limit
        limit: usize,
    },

    /// End Of File
    #[error("unrecognised input")]
    EOF,
}

pub type LexError<'i> = (LexErrorKind, &'i str);

pub type LexResult<'i, T> = Result<(T, &'i str), LexError<'i>>;

pub trait Lex<'i>: Sized {
    fn lex(input: &'i str) -> LexResult<'i, Self>;
}

pub trait LexWith<'i, E>: Sized {
    fn lex_with(input: &'i str, extra: E) -> LexResult<'i, Self>;
}

impl<'i, T: Lex<'i>, E> LexWith<'i, E> for T {
    fn lex_with(input: &'i str, _extra: E) -> LexResult<'i, Self> {
        Self::lex(input)
    }
}

pub fn expect<'i>(input: &'i str, s: &'static str) -> Result<&'i str, LexError<'i>> {
    if let Some(rest) = input.strip_prefix(s) {
        Ok(rest)
    } else {
        Err((LexErrorKind::ExpectedLiteral(s), input))
    }
}

// Tabs are harder to format as part of the error message because they have
// a different printable width than other characters, and so become a common
// source of issues in different compilers.
const SPACE_CHARS: &[char] = &[' ', '\r', '\n'];

/// Skips whitespace and `#` comments running to the end of the line.
pub fn skip_space(mut input: &str) -> &str {
    loop {
        input = input.trim_start_matches(SPACE_CHARS);
        match input.strip_prefix('#') {
            Some(comment) => input = comment.find('\n').map_or("", |end| &comment[end..]),
            None => return input,
        }
    }
}

/// This macro generates enum declaration + lexer implementation.
///
/// It works by recursively processing variants one by one, while passing
/// around intermediate state (partial declaration and lexer bodies).
macro_rules! lex_enum {
    // Branch for handling `"some_string" | "other_string" => VariantName`.
    //
    // Creates a unit variant `VariantName`.
    //
    // On the parser side, tries to parse either of the given string values,
    // and returns the variant if any of them succeeded.
    (@decl $preamble:tt $name:ident $input:ident { $($decl:tt)* } { $($expr:tt)* } {
        $(#[$meta:meta])* $($s:literal)|+ => $item:ident,
        $($rest:tt)*
    }) => {
        lex_enum!(@decl $preamble $name $input {
            $($decl)*
            $(#[$meta])*
            $item,
        } {
            $($expr)*
            $(if let Ok($input) = $crate::lex::expect($input, $s) {
                return Ok(($name::$item, $input));
            })+
        } { $($rest)* });
    };

    // Internal finish point for declaration + lexer generation.
    (@decl { $($preamble:tt)* } $name:ident $input:ident $decl:tt { $($expr:stmt)* } {}) => {
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        $($preamble)*
        pub enum $name $decl

        impl<'i> $crate::lex::Lex<'i> for $name {
            fn lex($input: &'i str) -> $crate::lex::LexResult<'i, Self> {
                $($expr)*
                Err((
                    $crate::lex::LexErrorKind::ExpectedName(stringify!($name)),
                    $input
                ))
            }
        }
    };

    // The public entry point to the macro.
    ($(#[$meta:meta])* $name:ident $items:tt) => {
        lex_enum!(@decl {
            $(#[$meta])*
        } $name input {} {} $items);
    };
}

pub fn span<'i>(input: &'i str, rest: &'i str) -> &'i str {
    &input[..input.len() - rest.len()]
}

pub fn take_while<'i, F: Fn(char) -> bool>(
    input: &'i str,
    name: &'static str,
    f: F,
) -> LexResult<'i, &'i str> {
    let mut iter = input.chars();
    loop {
        let rest = iter.as_str();
        match iter.next() {
            Some(c) if f(c) => {}
            _ => {
                return if rest.len() != input.len() {
                    Ok((span(input, rest), rest))
                } else {
                    Err((LexErrorKind::ExpectedName(name), input))
                };
            }
        }
    }
}

pub fn take(input: &str, expected: usize) -> LexResult<'_, &str> {
    let mut chars = input.chars();
    for i in 0..expected {
        chars.next().ok_or((
            LexErrorKind::CountMismatch {
                name: "character",
                actual: i,
                expected,
            },
            input,
        ))?;
    }
    let rest = chars.as_str();
    Ok((span(input, rest), rest))
}

pub fn complete<T>(res: LexResult<'_, T>) -> Result<T, LexError<'_>> {
    let (res, input) = res?;
    if input.is_empty() {
        Ok(res)
    } else {
        Err((LexErrorKind::EOF, input))
    }
}

#[cfg(test)]
macro_rules! assert_ok {
    ($s:expr, $res:expr, $rest:expr) => {{
        let expr = $s.unwrap();
        assert_eq!(expr, ($res, $rest));
        expr.0
    }};

    ($s:expr, $res:expr) => {
        assert_ok!($s, $res, "")
    };
}

#[cfg(test)]
macro_rules! assert_err {
    ($s:expr, $kind:expr, $span:expr) => {
        assert_eq!($s, Err(($kind, $span)))
    };
}

#[cfg(test)]
macro_rules! assert_json {
    ($expr:expr, $json:tt) => {{
        let json = ::serde_json::to_value(&$expr).unwrap();
        assert_eq!(json, ::serde_json::json!($json));
        json
    }};
}

#[test]
fn test_skip_space() {
    assert_eq!(skip_space("  \r\n x"), "x");
    assert_eq!(skip_space("# comment\n  tcp"), "tcp");
    assert_eq!(skip_space("# only a comment"), "");
    assert_eq!(skip_space(" # one\n# two\nip # three"), "ip # three");
}

#[test]
fn test_take() {
    assert_ok!(take("abc", 2), "ab", "c");
    assert_err!(
        take("a", 2),
        LexErrorKind::CountMismatch {
            name: "character",
            actual: 1,
            expected: 2,
        },
        "a"
    );
}
