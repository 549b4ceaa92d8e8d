use super::{Ast, AstNode, ByteWindow, LogicalOp, NodeId};
use crate::{
    lex::{complete, expect, skip_space, span, Lex, LexErrorKind, LexResult, LexWith},
    registry::FieldRegistry,
    rhs_types::{Bytes, LiteralValue},
    scanner::{FieldToken, Keyword, SymbolTable, Token},
    types::{FieldType, RelOp, TypeMismatchError},
};
use log::debug;
use std::{
    cmp::{max, min},
    error::Error,
    fmt::{self, Display, Formatter},
};

/// An opaque filter compilation error associated with the original input.
///
/// Only the first error is reported; no partial [`Ast`] survives it.
#[derive(Debug, PartialEq)]
pub struct CompileError<'i> {
    kind: LexErrorKind,
    /// The line of input that contains the error.
    input: &'i str,
    line_number: usize,
    span_start: usize,
    span_len: usize,
}

impl Error for CompileError<'_> {}

impl<'i> CompileError<'i> {
    /// Creates an error for the span `span`, which must point into `input`.
    pub fn new(mut input: &'i str, (kind, span): (LexErrorKind, &'i str)) -> Self {
        let input_range = input.as_ptr() as usize..=input.as_ptr() as usize + input.len();
        assert!(
            input_range.contains(&(span.as_ptr() as usize))
                && input_range.contains(&(span.as_ptr() as usize + span.len()))
        );
        let mut span_start = span.as_ptr() as usize - input.as_ptr() as usize;

        let (line_number, line_start) = input[..span_start]
            .match_indices('\n')
            .map(|(pos, _)| pos + 1)
            .scan(0, |line_number, line_start| {
                *line_number += 1;
                Some((*line_number, line_start))
            })
            .last()
            .unwrap_or_default();

        input = &input[line_start..];

        span_start -= line_start;
        let mut span_len = span.len();

        if let Some(line_end) = input.find('\n') {
            input = &input[..line_end];
            span_len = min(span_len, line_end - span_start);
        }

        CompileError {
            kind,
            input,
            line_number,
            span_start,
            span_len,
        }
    }

    pub fn kind(&self) -> &LexErrorKind {
        &self.kind
    }

    /// Zero-based line of the error.
    pub fn line(&self) -> usize {
        self.line_number
    }

    /// Zero-based byte column of the error within its line.
    pub fn column(&self) -> usize {
        self.span_start
    }
}

impl Display for CompileError<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Filter compile error ({}:{}):",
            self.line_number + 1,
            self.span_start + 1
        )?;

        writeln!(f, "{}", self.input)?;

        for _ in 0..self.span_start {
            write!(f, " ")?;
        }

        for _ in 0..max(1, self.span_len) {
            write!(f, "^")?;
        }

        writeln!(f, " {}", self.kind)?;

        Ok(())
    }
}

/// Compiler settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerSettings {
    /// Maximum number of nested parentheses and negations.
    /// Default: 64
    pub max_nesting_depth: usize,
    /// Compile `xor` as `or`, as older filter engines did.
    /// Default: false
    pub legacy_xor: bool,
}

impl Default for CompilerSettings {
    #[inline]
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            legacy_xor: false,
        }
    }
}

/// Turns filter text into [`Ast`]s for one registry snapshot.
#[derive(Debug)]
pub struct FilterCompiler {
    symbols: SymbolTable,
    settings: CompilerSettings,
}

impl FilterCompiler {
    /// Creates a new compiler with default settings.
    #[inline]
    pub fn new<R: FieldRegistry + ?Sized>(registry: &R) -> Self {
        Self::with_settings(registry, CompilerSettings::default())
    }

    /// Creates a new compiler with the specified settings.
    pub fn with_settings<R: FieldRegistry + ?Sized>(
        registry: &R,
        settings: CompilerSettings,
    ) -> Self {
        let symbols = SymbolTable::new(registry);
        debug!(
            "compiler ready with {} of {} registered fields",
            symbols.field_count(),
            registry.field_count()
        );
        Self { symbols, settings }
    }

    #[inline]
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Compiles a filter expression.
    pub fn compile<'i>(&self, input: &'i str) -> Result<Ast, CompileError<'i>> {
        let mut ctx = CompileContext::new(self);
        match complete(ctx.lex_filter(input)) {
            Ok(root) => {
                let ast = ctx.finish(root);
                debug!("compiled {:?} into {} nodes", input, ast.len());
                Ok(ast)
            }
            Err(err) => {
                let err = CompileError::new(input, err);
                debug!("failed to compile {:?}: {}", input, err.kind);
                Err(err)
            }
        }
    }
}

/// A relation operand before the relation type is known.
enum Operand<'i> {
    Field {
        token: FieldToken,
        slice: Option<ByteWindow>,
    },
    Word(&'i str),
    Quoted(Bytes, &'i str),
    Boolean(bool, &'i str),
}

impl Operand<'_> {
    /// Type the operand forces on the relation, if any.
    fn hint(&self) -> Option<FieldType> {
        match self {
            Operand::Field { token, .. } => Some(token.ty),
            Operand::Word(_) => None,
            Operand::Quoted(..) => Some(FieldType::Bytes),
            Operand::Boolean(..) => Some(FieldType::Boolean),
        }
    }
}

/// State of a single `compile()` call.
struct CompileContext<'c> {
    compiler: &'c FilterCompiler,
    nodes: Vec<AstNode>,
    depth: usize,
}

impl<'c> CompileContext<'c> {
    fn new(compiler: &'c FilterCompiler) -> Self {
        CompileContext {
            compiler,
            nodes: Vec::new(),
            depth: 0,
        }
    }

    fn finish(self, root: NodeId) -> Ast {
        Ast::new(self.nodes, root)
    }

    fn push(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn token<'i>(&self, input: &'i str) -> LexResult<'i, Token<'i>> {
        Token::lex_with(input, &self.compiler.symbols)
    }

    fn enter<'i>(&mut self, input: &'i str) -> Result<(), (LexErrorKind, &'i str)> {
        let limit = self.compiler.settings.max_nesting_depth;
        if self.depth >= limit {
            return Err((LexErrorKind::TooDeep { limit }, skip_space(input)));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn lex_filter<'i>(&mut self, input: &'i str) -> LexResult<'i, NodeId> {
        let (root, input) = self.lex_expr(input)?;
        Ok((root, skip_space(input)))
    }

    fn lex_expr<'i>(&mut self, input: &'i str) -> LexResult<'i, NodeId> {
        let (lhs, input) = self.lex_unary(input)?;
        let lookahead = self.lex_logical_op(input);
        self.lex_more_with_precedence(lhs, None, lookahead)
    }

    /// Peeks a binary logical operator; the input is left untouched if there
    /// is none.
    fn lex_logical_op<'i>(&self, input: &'i str) -> (Option<LogicalOp>, &'i str) {
        match self.token(input) {
            Ok((Token::Keyword(Keyword::And), rest)) => (Some(LogicalOp::And), rest),
            Ok((Token::Keyword(Keyword::Or), rest)) => (Some(LogicalOp::Or), rest),
            Ok((Token::Keyword(Keyword::Xor), rest)) => (Some(LogicalOp::Xor), rest),
            _ => (None, input),
        }
    }

    fn lex_more_with_precedence<'i>(
        &mut self,
        mut lhs: NodeId,
        min_prec: Option<u8>,
        mut lookahead: (Option<LogicalOp>, &'i str),
    ) -> LexResult<'i, NodeId> {
        while let Some(op) = lookahead.0 {
            let (mut rhs, mut rest) = self.lex_unary(lookahead.1)?;

            loop {
                lookahead = self.lex_logical_op(rest);
                match lookahead.0 {
                    Some(next) if next.precedence() > op.precedence() => {
                        let (node, input) = self.lex_more_with_precedence(
                            rhs,
                            Some(next.precedence()),
                            lookahead,
                        )?;
                        rhs = node;
                        rest = input;
                    }
                    _ => break,
                }
            }

            let op = match op {
                LogicalOp::Xor if self.compiler.settings.legacy_xor => LogicalOp::Or,
                op => op,
            };
            lhs = self.push(AstNode::Logical {
                op,
                lhs,
                rhs: Some(rhs),
            });

            if lookahead.0.map(LogicalOp::precedence) < min_prec {
                // leave the weaker operator to the caller
                lookahead = (None, rest);
            }
        }

        Ok((lhs, lookahead.1))
    }

    fn lex_unary<'i>(&mut self, input: &'i str) -> LexResult<'i, NodeId> {
        let (token, rest) = self.token(input)?;
        match token {
            Token::LParen => {
                self.enter(input)?;
                let (node, rest) = self.lex_expr(rest)?;
                let rest = skip_space(rest);
                let rest = expect(rest, ")")?;
                self.leave();
                Ok((node, rest))
            }
            Token::Keyword(Keyword::Not) => {
                self.enter(input)?;
                let (arg, rest) = self.lex_unary(rest)?;
                self.leave();
                let node = self.push(AstNode::Logical {
                    op: LogicalOp::Not,
                    lhs: arg,
                    rhs: None,
                });
                Ok((node, rest))
            }
            Token::Keyword(Keyword::Exists) => match self.token(rest)? {
                (Token::Field(field), rest) => {
                    let node = self.push(AstNode::Existence { field: field.id });
                    Ok((node, rest))
                }
                (Token::Word(word), rest) if word.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                    debug!("{:?} is not registered, its existence test is always false", word);
                    let node = self.push(AstNode::Unregistered {
                        abbrev: word.to_owned(),
                    });
                    Ok((node, rest))
                }
                (_, after) => Err((
                    LexErrorKind::ExpectedName("field"),
                    span(skip_space(rest), after),
                )),
            },
            _ => self.lex_relation(input),
        }
    }

    fn lex_slice<'i>(&self, input: &'i str) -> LexResult<'i, ByteWindow> {
        let start = input;
        let input = skip_space(expect(input, "[")?);
        let (offset, input) = u32::lex(input)?;
        let input = skip_space(input);
        let (length, input) = match expect(input, ":") {
            Ok(input) => u32::lex(skip_space(input))?,
            Err(_) => (1, input),
        };
        let input = expect(skip_space(input), "]")?;

        if length == 0 || offset.checked_add(length).is_none() {
            return Err((LexErrorKind::InvalidSlice, span(start, input)));
        }

        Ok((
            ByteWindow {
                offset: offset as usize,
                length: length as usize,
            },
            input,
        ))
    }

    fn lex_operand<'i>(&self, input: &'i str) -> LexResult<'i, Operand<'i>> {
        let input = skip_space(input);
        let (token, rest) = self.token(input)?;
        Ok(match token {
            Token::Field(token) => {
                let after = skip_space(rest);
                let (slice, rest) = if after.starts_with('[') {
                    let (slice, rest) = self.lex_slice(after)?;
                    (Some(slice), rest)
                } else {
                    (None, rest)
                };
                (Operand::Field { token, slice }, rest)
            }
            Token::Word(word) => (Operand::Word(word), rest),
            Token::Quoted(bytes) => (Operand::Quoted(bytes, span(input, rest)), rest),
            Token::Keyword(Keyword::True) => (Operand::Boolean(true, span(input, rest)), rest),
            Token::Keyword(Keyword::False) => (Operand::Boolean(false, span(input, rest)), rest),
            _ => return Err((LexErrorKind::ExpectedName("operand"), span(input, rest))),
        })
    }

    fn lex_relation<'i>(&mut self, input: &'i str) -> LexResult<'i, NodeId> {
        let input = skip_space(input);
        let (lhs, rest) = self.lex_operand(input)?;

        if let Ok((Token::Keyword(Keyword::Rel(op)), rest)) = self.token(rest) {
            let (rhs, rest) = self.lex_operand(rest)?;
            let node = self.build_relation(op, lhs, rhs, span(input, rest))?;
            return Ok((node, rest));
        }

        let node = match lhs {
            Operand::Field {
                token,
                slice: None,
                ..
            } => AstNode::Existence { field: token.id },
            Operand::Field { .. } => {
                return Err((
                    LexErrorKind::ExpectedName("relational operator"),
                    skip_space(rest),
                ))
            }
            Operand::Word(word) => return Err((LexErrorKind::UnknownIdentifier, word)),
            Operand::Quoted(bytes, _) => AstNode::Literal {
                ty: FieldType::Bytes,
                value: LiteralValue::Bytes(bytes),
            },
            Operand::Boolean(value, _) => AstNode::Literal {
                ty: FieldType::Boolean,
                value: LiteralValue::Boolean(value),
            },
        };
        Ok((self.push(node), rest))
    }

    fn relation_type<'i>(
        lhs: &Operand<'i>,
        rhs: &Operand<'i>,
        sliced: bool,
        relation: &'i str,
    ) -> Result<FieldType, (LexErrorKind, &'i str)> {
        if sliced {
            return Ok(FieldType::Bytes);
        }
        let field_type = |operand: &Operand<'_>| match operand {
            Operand::Field { token, .. } => Some(token.ty),
            _ => None,
        };
        let mismatch = |err: TypeMismatchError| (LexErrorKind::TypeMismatch(err), relation);

        match (field_type(lhs), field_type(rhs)) {
            (Some(a), Some(b)) => a.unify(b).map_err(mismatch),
            (Some(ty), None) | (None, Some(ty)) => Ok(ty),
            (None, None) => match (lhs.hint(), rhs.hint()) {
                (Some(a), Some(b)) => a.unify(b).map_err(mismatch),
                (Some(ty), None) | (None, Some(ty)) => Ok(ty),
                (None, None) => Err((LexErrorKind::UntypedComparison, relation)),
            },
        }
    }

    fn build_relation<'i>(
        &mut self,
        op: RelOp,
        lhs: Operand<'i>,
        rhs: Operand<'i>,
        relation: &'i str,
    ) -> Result<NodeId, (LexErrorKind, &'i str)> {
        let slices = [&lhs, &rhs]
            .iter()
            .filter_map(|operand| match operand {
                Operand::Field { slice, .. } => *slice,
                _ => None,
            })
            .reduce(ByteWindow::intersect);

        let ty = Self::relation_type(&lhs, &rhs, slices.is_some(), relation)?;

        if !ty.supports(op) {
            return Err((LexErrorKind::UnsupportedOp { lhs_type: ty }, relation));
        }

        let lhs = self.operand_node(lhs, ty)?;
        let rhs = self.operand_node(rhs, ty)?;

        // an unsliced byte literal spans its whole value
        let window = slices.map(|window| {
            [lhs, rhs]
                .iter()
                .fold(window, |window, &id| match &self.nodes[id.index()] {
                    AstNode::Literal {
                        value: LiteralValue::Bytes(bytes),
                        ..
                    } => window.intersect(ByteWindow {
                        offset: window.offset,
                        length: bytes.len(),
                    }),
                    _ => window,
                })
        });

        Ok(self.push(AstNode::Relation {
            op,
            lhs,
            rhs,
            ty,
            window,
        }))
    }

    fn operand_node<'i>(
        &mut self,
        operand: Operand<'i>,
        ty: FieldType,
    ) -> Result<NodeId, (LexErrorKind, &'i str)> {
        let literal = |actual, span| {
            (
                LexErrorKind::TypeMismatch(TypeMismatchError {
                    expected: ty,
                    actual,
                }),
                span,
            )
        };

        let node = match operand {
            Operand::Field { token, slice, .. } => AstNode::FieldRef {
                field: token.id,
                ty: token.ty,
                protocol: token.protocol,
                slice,
            },
            Operand::Word(word) => AstNode::Literal {
                ty,
                value: LiteralValue::lex_word(word, ty)?,
            },
            Operand::Quoted(bytes, _) if ty == FieldType::Bytes => AstNode::Literal {
                ty,
                value: LiteralValue::Bytes(bytes),
            },
            Operand::Quoted(_, span) => return Err(literal(FieldType::Bytes, span)),
            Operand::Boolean(value, _) if ty == FieldType::Boolean => AstNode::Literal {
                ty,
                value: LiteralValue::Boolean(value),
            },
            Operand::Boolean(_, span) => return Err(literal(FieldType::Boolean, span)),
        };
        Ok(self.push(node))
    }
}
