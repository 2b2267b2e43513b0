use std::fmt::{self, Display};

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::{
    lex::{NumberDisplay, Token, TokenKind},
    stack::ensure_sufficient_stack,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    Literal(Literal<'de>),
    Grouping(Box<Expr<'de>>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr<'de>>,
    },
    Binary {
        left: Box<Expr<'de>>,
        op: BinaryOp,
        right: Box<Expr<'de>>,
    },
}

impl<'de> Expr<'de> {
    pub fn unary(op: UnaryOp, operand: Expr<'de>) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(left: Expr<'de>, op: BinaryOp, right: Expr<'de>) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn grouping(inner: Expr<'de>) -> Self {
        Expr::Grouping(Box::new(inner))
    }

    /// Moves the children out, leaving cheap leaves in their place.
    fn take_children(&mut self, into: &mut Vec<Box<Expr<'de>>>) {
        let mut take = |child: &mut Box<Expr<'de>>| {
            into.push(std::mem::replace(child, Box::new(Expr::Literal(Literal::Nil))));
        };
        match self {
            Expr::Literal(_) => {}
            Expr::Grouping(inner) => take(inner),
            Expr::Unary { operand, .. } => take(operand),
            Expr::Binary { left, right, .. } => {
                take(left);
                take(right);
            }
        }
    }
}

// Dropping a deep tree through the derived glue recurses once per level;
// unlink it iteratively instead.
impl Drop for Expr<'_> {
    fn drop(&mut self) {
        if matches!(self, Expr::Literal(_)) {
            return;
        }
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut child) = pending.pop() {
            child.take_children(&mut pending);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'de> {
    Number(f64),
    String(&'de str),
    True,
    False,
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ParseError {
    #[error("[line {line}] Error at end: reached end of input")]
    #[diagnostic(
        code(lox::parse::end_of_input),
        help("the expression is incomplete; an operand is missing")
    )]
    EndOfInput {
        line: usize,
        #[label("input ends here")]
        span: SourceSpan,
    },

    #[error("[line {line}] Error at '{lexeme}': unexpected token in primary position")]
    #[diagnostic(
        code(lox::parse::unexpected_token),
        help("expected a number, string, `true`, `false`, `nil` or `(`")
    )]
    UnexpectedToken {
        lexeme: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("[line {line}] Error at '{lexeme}': expected closing parenthesis after expression")]
    #[diagnostic(code(lox::parse::missing_paren), help("add a `)` to close the group"))]
    MissingClosingParen {
        lexeme: String,
        line: usize,
        #[label("expected `)` here")]
        span: SourceSpan,
        #[label("group opened here")]
        open: SourceSpan,
    },

    #[error("[line {line}] Error at '{lexeme}': unexpected token after expression")]
    #[diagnostic(
        code(lox::parse::trailing_input),
        help("only a single expression is allowed")
    )]
    TrailingInput {
        lexeme: String,
        line: usize,
        #[label("the expression ended before this")]
        span: SourceSpan,
    },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::EndOfInput { line, .. }
            | ParseError::UnexpectedToken { line, .. }
            | ParseError::MissingClosingParen { line, .. }
            | ParseError::TrailingInput { line, .. } => *line,
        }
    }
}

type ParseResult<'de> = Result<Expr<'de>, ParseError>;

pub struct Parser<'t, 'de> {
    tokens: &'t [Token<'de>],
    /// Index of the end-of-input marker; nothing at or past it is parsed.
    end: usize,
    pos: usize,
    eof: Token<'de>,
}

impl<'t, 'de> Parser<'t, 'de> {
    pub fn new(tokens: &'t [Token<'de>]) -> Self {
        let end = tokens
            .iter()
            .position(|token| token.kind == TokenKind::EndOfInput)
            .unwrap_or(tokens.len());
        let eof = match tokens.get(end) {
            Some(token) => *token,
            None => {
                let (line, offset) = tokens
                    .last()
                    .map_or((1, 0), |last| (last.line, last.span.offset() + last.span.len()));
                Token {
                    kind: TokenKind::EndOfInput,
                    literal: "",
                    line,
                    span: (offset..offset).into(),
                }
            }
        };

        Parser {
            tokens,
            end,
            pos: 0,
            eof,
        }
    }

    /// Parses one expression and requires it to span the whole input.
    pub fn parse(mut self) -> ParseResult<'de> {
        let expr = self.expression()?;
        if let Some(token) = self.peek() {
            return Err(ParseError::TrailingInput {
                lexeme: describe(token),
                line: token.line,
                span: token.span,
            });
        }
        tracing::debug!(tokens = self.end, "parsing complete");
        Ok(expr)
    }

    /// Parses the longest expression at the current position and leaves
    /// anything after it unconsumed.
    pub fn expression(&mut self) -> ParseResult<'de> {
        self.bounded(Self::equality)
    }

    /// Tokens not yet consumed, excluding the end-of-input marker.
    pub fn remaining(&self) -> &'t [Token<'de>] {
        &self.tokens[self.pos.min(self.end)..self.end]
    }

    fn peek(&self) -> Option<&'t Token<'de>> {
        self.tokens[..self.end].get(self.pos)
    }

    fn current(&self) -> &Token<'de> {
        self.peek().unwrap_or(&self.eof)
    }

    fn end_of_input(&self) -> ParseError {
        ParseError::EndOfInput {
            line: self.eof.line,
            span: self.eof.span,
        }
    }

    fn bounded(&mut self, rule: fn(&mut Self) -> ParseResult<'de>) -> ParseResult<'de> {
        if self.pos >= self.end {
            return Err(self.end_of_input());
        }
        ensure_sufficient_stack(|| rule(self))
    }

    /// One left-associative precedence level: `next (op next)*`.
    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<'de>,
        operator: fn(TokenKind) -> Option<BinaryOp>,
    ) -> ParseResult<'de> {
        let mut expr = self.bounded(next)?;
        while let Some(op) = self.peek().and_then(|token| operator(token.kind)) {
            self.pos += 1;
            let right = self.bounded(next)?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<'de> {
        self.binary_level(Self::comparison, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOp::Equal),
            TokenKind::BangEqual => Some(BinaryOp::NotEqual),
            _ => None,
        })
    }

    fn comparison(&mut self) -> ParseResult<'de> {
        self.binary_level(Self::term, |kind| match kind {
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEq),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEq),
            _ => None,
        })
    }

    fn term(&mut self) -> ParseResult<'de> {
        self.binary_level(Self::factor, |kind| match kind {
            TokenKind::Minus => Some(BinaryOp::Subtract),
            TokenKind::Plus => Some(BinaryOp::Add),
            _ => None,
        })
    }

    fn factor(&mut self) -> ParseResult<'de> {
        self.binary_level(Self::unary, |kind| match kind {
            TokenKind::Slash => Some(BinaryOp::Divide),
            TokenKind::Star => Some(BinaryOp::Multiply),
            _ => None,
        })
    }

    fn unary(&mut self) -> ParseResult<'de> {
        let op = match self.peek().map(|token| token.kind) {
            Some(TokenKind::Minus) => UnaryOp::Negate,
            Some(TokenKind::Bang) => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.bounded(Self::unary)?;
        Ok(Expr::unary(op, operand))
    }

    fn primary(&mut self) -> ParseResult<'de> {
        let Some(token) = self.peek() else {
            return Err(self.end_of_input());
        };

        let literal = match token.kind {
            TokenKind::Number(n) => Literal::Number(n),
            TokenKind::String => Literal::String(token.literal),
            TokenKind::True => Literal::True,
            TokenKind::False => Literal::False,
            TokenKind::Nil => Literal::Nil,
            TokenKind::LeftParen => {
                self.pos += 1;
                let inner = self.expression()?;
                let close = self.current();
                if close.kind != TokenKind::RightParen {
                    return Err(ParseError::MissingClosingParen {
                        lexeme: describe(close),
                        line: close.line,
                        span: close.span,
                        open: token.span,
                    });
                }
                self.pos += 1;
                return Ok(Expr::grouping(inner));
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    lexeme: describe(token),
                    line: token.line,
                    span: token.span,
                });
            }
        };

        self.pos += 1;
        Ok(Expr::Literal(literal))
    }
}

pub fn parse<'de>(tokens: &[Token<'de>]) -> ParseResult<'de> {
    Parser::new(tokens).parse()
}

fn describe(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::EndOfInput => "end".to_string(),
        TokenKind::String => format!("\"{}\"", token.literal),
        _ => token.literal.to_string(),
    }
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Grouping(inner) => write!(f, "(group {inner})"),
            Expr::Unary { op, operand } => write!(f, "({op} {operand})"),
            Expr::Binary { left, op, right } => write!(f, "({op} {left} {right})"),
        })
    }
}

impl Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", NumberDisplay(*n)),
            Literal::String(s) => write!(f, "{s}"),
            Literal::True => write!(f, "true"),
            Literal::False => write!(f, "false"),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        })
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        })
    }
}
