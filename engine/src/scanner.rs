use crate::{
    lex::{skip_space, take_while, Lex, LexErrorKind, LexResult, LexWith},
    registry::{FieldId, FieldRegistry, RegistryType},
    rhs_types::Bytes,
    types::{FieldType, RelOp},
};
use fnv::FnvBuildHasher;
use indexmap::map::{Entry, IndexMap};
use log::warn;
use std::convert::TryFrom;

/// Reserved words of the filter language.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Keyword {
    And,
    Or,
    Xor,
    Not,
    Rel(RelOp),
    Exists,
    True,
    False,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("and", Keyword::And),
    ("or", Keyword::Or),
    ("xor", Keyword::Xor),
    ("not", Keyword::Not),
    ("eq", Keyword::Rel(RelOp::Equal)),
    ("ne", Keyword::Rel(RelOp::NotEqual)),
    ("gt", Keyword::Rel(RelOp::GreaterThan)),
    ("ge", Keyword::Rel(RelOp::GreaterThanEqual)),
    ("lt", Keyword::Rel(RelOp::LessThan)),
    ("le", Keyword::Rel(RelOp::LessThanEqual)),
    ("exist", Keyword::Exists),
    ("exists", Keyword::Exists),
    ("true", Keyword::True),
    ("false", Keyword::False),
];

// Longer spellings come first so that `>=` is not read as `>`.
lex_enum!(Punct {
    "==" => Equal,
    "!=" => NotEqual,
    ">=" => GreaterThanEqual,
    "<=" => LessThanEqual,
    "&&" => And,
    "||" => Or,
    "^^" => Xor,
    ">" => GreaterThan,
    "<" => LessThan,
    "!" => Not,
    "(" => LParen,
    ")" => RParen,
});

/// A field abbreviation resolved against the registry.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FieldToken {
    pub id: FieldId,
    pub ty: FieldType,
    /// Protocol whose subtree holds the field's instances; the field itself
    /// for protocols, `None` to search the whole packet.
    pub protocol: Option<FieldId>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Symbol {
    Keyword(Keyword),
    Field(FieldToken),
    Unsupported(RegistryType),
}

/// Case-insensitive lookup of keywords and field abbreviations, built once
/// from a registry snapshot.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol, FnvBuildHasher>,
}

impl SymbolTable {
    pub fn new<R: FieldRegistry + ?Sized>(registry: &R) -> Self {
        let mut symbols = IndexMap::with_capacity_and_hasher(
            KEYWORDS.len() + registry.field_count(),
            FnvBuildHasher::default(),
        );

        for &(name, keyword) in KEYWORDS {
            symbols.insert(name.to_owned(), Symbol::Keyword(keyword));
        }

        for index in 0..registry.field_count() {
            let id = FieldId::new(index as u32);
            let name = match registry.abbrev(id) {
                Some(name) => name.to_ascii_lowercase(),
                None => continue,
            };

            let registry_type = registry.field_type(id);
            let symbol = match FieldType::try_from(registry_type) {
                Ok(ty) => Symbol::Field(FieldToken {
                    id,
                    ty,
                    protocol: if registry.is_protocol(id) {
                        Some(id)
                    } else {
                        registry.parent_protocol(id)
                    },
                }),
                Err(ty) => Symbol::Unsupported(ty),
            };

            match symbols.entry(name) {
                Entry::Occupied(entry) => {
                    warn!(
                        "field {:?} shadowed by existing symbol {:?}",
                        entry.key(),
                        entry.get()
                    );
                }
                Entry::Vacant(entry) => {
                    entry.insert(symbol);
                }
            }
        }

        SymbolTable { symbols }
    }

    fn get(&self, word: &str) -> Option<Symbol> {
        if word.bytes().any(|b| b.is_ascii_uppercase()) {
            self.symbols.get(&word.to_ascii_lowercase()).copied()
        } else {
            self.symbols.get(word).copied()
        }
    }

    /// Number of field abbreviations that made it into the table.
    pub fn field_count(&self) -> usize {
        self.symbols.len() - KEYWORDS.len()
    }
}

/// One token of filter text.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'i> {
    Keyword(Keyword),
    Field(FieldToken),
    /// A bare word that is neither a keyword nor a field; only a literal
    /// can give it meaning.
    Word(&'i str),
    Quoted(Bytes),
    LParen,
    RParen,
    Eof,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-' | '/')
}

impl<'i, 't> LexWith<'i, &'t SymbolTable> for Token<'i> {
    /// Skips leading whitespace and comments, then lexes one token.
    fn lex_with(input: &'i str, symbols: &'t SymbolTable) -> LexResult<'i, Self> {
        let input = skip_space(input);

        if input.is_empty() {
            return Ok((Token::Eof, input));
        }

        if input.starts_with('"') {
            let (bytes, rest) = Bytes::lex(input)?;
            return Ok((Token::Quoted(bytes), rest));
        }

        if let Ok((punct, rest)) = Punct::lex(input) {
            let token = match punct {
                Punct::Equal => Token::Keyword(Keyword::Rel(RelOp::Equal)),
                Punct::NotEqual => Token::Keyword(Keyword::Rel(RelOp::NotEqual)),
                Punct::GreaterThanEqual => Token::Keyword(Keyword::Rel(RelOp::GreaterThanEqual)),
                Punct::LessThanEqual => Token::Keyword(Keyword::Rel(RelOp::LessThanEqual)),
                Punct::GreaterThan => Token::Keyword(Keyword::Rel(RelOp::GreaterThan)),
                Punct::LessThan => Token::Keyword(Keyword::Rel(RelOp::LessThan)),
                Punct::And => Token::Keyword(Keyword::And),
                Punct::Or => Token::Keyword(Keyword::Or),
                Punct::Xor => Token::Keyword(Keyword::Xor),
                Punct::Not => Token::Keyword(Keyword::Not),
                Punct::LParen => Token::LParen,
                Punct::RParen => Token::RParen,
            };
            return Ok((token, rest));
        }

        let (word, rest) = take_while(input, "token", is_word_char)?;
        let token = match symbols.get(word) {
            Some(Symbol::Keyword(keyword)) => Token::Keyword(keyword),
            Some(Symbol::Field(field)) => Token::Field(field),
            Some(Symbol::Unsupported(ty)) => {
                return Err((LexErrorKind::UnsupportedFieldType(ty), word));
            }
            None => Token::Word(word),
        };
        Ok((token, rest))
    }
}
