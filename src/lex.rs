use std::fmt::Display;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum LexError {
    #[error("[line {line}] Error: Unexpected character: {token}")]
    #[diagnostic(
        code(lox::lex::unexpected_character),
        help("remove or correct the character: `{token}`")
    )]
    UnexpectedCharacter {
        token: char,
        line: usize,
        #[label("this character")]
        span: SourceSpan,
    },

    #[error("[line {line}] Error: Unterminated string.")]
    #[diagnostic(
        code(lox::lex::unterminated_string),
        help("add a closing `\"` to terminate the string literal")
    )]
    UnterminatedString {
        line: usize,
        #[label("string literal starts here")]
        span: SourceSpan,
    },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnexpectedCharacter { line, .. } | LexError::UnterminatedString { line, .. } => {
                *line
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    /// Source text of the token. For string literals this is the content
    /// between the quotes.
    pub literal: &'de str,
    pub line: usize,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Star,
    BangEqual,
    EqualEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    Slash,
    Bang,
    Equal,
    String,
    Ident,
    Number(f64),
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    Print,
    EndOfInput,
}

/// Every fixed-spelling token, longest lexeme first so that the first hit is
/// the longest match.
const FIXED_LEXEMES: &[(&str, TokenKind)] = &[
    ("return", TokenKind::Return),
    ("class", TokenKind::Class),
    ("false", TokenKind::False),
    ("print", TokenKind::Print),
    ("super", TokenKind::Super),
    ("while", TokenKind::While),
    ("else", TokenKind::Else),
    ("this", TokenKind::This),
    ("true", TokenKind::True),
    ("and", TokenKind::And),
    ("for", TokenKind::For),
    ("fun", TokenKind::Fun),
    ("nil", TokenKind::Nil),
    ("var", TokenKind::Var),
    ("!=", TokenKind::BangEqual),
    ("==", TokenKind::EqualEqual),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    ("if", TokenKind::If),
    ("or", TokenKind::Or),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
    (",", TokenKind::Comma),
    (".", TokenKind::Dot),
    ("-", TokenKind::Minus),
    ("+", TokenKind::Plus),
    (";", TokenKind::Semicolon),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("!", TokenKind::Bang),
    ("=", TokenKind::Equal),
    ("<", TokenKind::Less),
    (">", TokenKind::Greater),
];

/// Renders a number the way every printer in the crate does: integral values
/// keep a trailing `.0`.
pub(crate) struct NumberDisplay(pub f64);

impl Display for NumberDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.0;
        if n.is_finite() && n.fract() == 0.0 {
            write!(f, "{n}.0")
        } else {
            write!(f, "{n}")
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::LeftParen => write!(f, "LEFT_PAREN {lit} null"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN {lit} null"),
            TokenKind::LeftBrace => write!(f, "LEFT_BRACE {lit} null"),
            TokenKind::RightBrace => write!(f, "RIGHT_BRACE {lit} null"),
            TokenKind::Comma => write!(f, "COMMA {lit} null"),
            TokenKind::Dot => write!(f, "DOT {lit} null"),
            TokenKind::Minus => write!(f, "MINUS {lit} null"),
            TokenKind::Plus => write!(f, "PLUS {lit} null"),
            TokenKind::Semicolon => write!(f, "SEMICOLON {lit} null"),
            TokenKind::Star => write!(f, "STAR {lit} null"),
            TokenKind::BangEqual => write!(f, "BANG_EQUAL {lit} null"),
            TokenKind::EqualEqual => write!(f, "EQUAL_EQUAL {lit} null"),
            TokenKind::GreaterEqual => write!(f, "GREATER_EQUAL {lit} null"),
            TokenKind::LessEqual => write!(f, "LESS_EQUAL {lit} null"),
            TokenKind::Greater => write!(f, "GREATER {lit} null"),
            TokenKind::Less => write!(f, "LESS {lit} null"),
            TokenKind::Slash => write!(f, "SLASH {lit} null"),
            TokenKind::Bang => write!(f, "BANG {lit} null"),
            TokenKind::Equal => write!(f, "EQUAL {lit} null"),
            TokenKind::String => write!(f, "STRING \"{lit}\" {lit}"),
            TokenKind::Ident => write!(f, "IDENTIFIER {lit} null"),
            TokenKind::Number(n) => write!(f, "NUMBER {lit} {}", NumberDisplay(n)),
            TokenKind::And => write!(f, "AND {lit} null"),
            TokenKind::Class => write!(f, "CLASS {lit} null"),
            TokenKind::Else => write!(f, "ELSE {lit} null"),
            TokenKind::False => write!(f, "FALSE {lit} null"),
            TokenKind::For => write!(f, "FOR {lit} null"),
            TokenKind::Fun => write!(f, "FUN {lit} null"),
            TokenKind::If => write!(f, "IF {lit} null"),
            TokenKind::Nil => write!(f, "NIL {lit} null"),
            TokenKind::Or => write!(f, "OR {lit} null"),
            TokenKind::Return => write!(f, "RETURN {lit} null"),
            TokenKind::Super => write!(f, "SUPER {lit} null"),
            TokenKind::This => write!(f, "THIS {lit} null"),
            TokenKind::True => write!(f, "TRUE {lit} null"),
            TokenKind::Var => write!(f, "VAR {lit} null"),
            TokenKind::While => write!(f, "WHILE {lit} null"),
            TokenKind::Print => write!(f, "PRINT {lit} null"),
            TokenKind::EndOfInput => write!(f, "EOF  null"),
        }
    }
}

/// Per-call lexer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LexerConfig {
    /// Characters skipped between tokens. Newlines are always skipped and
    /// counted, whatever this set holds.
    pub ignored: Vec<char>,
    /// Emit a `trace` event for every character examined.
    pub trace: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        LexerConfig {
            ignored: vec![' ', '\t', '\r'],
            trace: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Accumulator {
    Idle,
    Ident { start: usize },
    Number { start: usize, fractional: bool },
    String { start: usize, line: usize },
}

pub struct Lexer<'de> {
    whole: &'de str,
    byte: usize,
    line: usize,
    state: Accumulator,
    config: LexerConfig,
    finished: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Self::with_config(input, LexerConfig::default())
    }

    pub fn with_config(input: &'de str, config: LexerConfig) -> Self {
        Lexer {
            whole: input,
            byte: 0,
            line: 1,
            state: Accumulator::Idle,
            config,
            finished: false,
        }
    }

    fn rest(&self) -> &'de str {
        &self.whole[self.byte..]
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token<'de> {
        Token {
            kind,
            literal: &self.whole[start..self.byte],
            line: self.line,
            span: (start..self.byte).into(),
        }
    }

    fn number(&self, start: usize) -> Token<'de> {
        let literal = &self.whole[start..self.byte];
        self.token(TokenKind::Number(decode_number(literal)), start)
    }

    fn match_fixed(&self) -> Option<(&'static str, TokenKind)> {
        let rest = self.rest();
        FIXED_LEXEMES.iter().copied().find(|(lexeme, _)| {
            rest.starts_with(lexeme)
                && !(lexeme.ends_with(is_ident_continue)
                    && rest[lexeme.len()..].starts_with(is_ident_continue))
        })
    }

    fn finish(&mut self) -> Option<Result<Token<'de>, LexError>> {
        match std::mem::replace(&mut self.state, Accumulator::Idle) {
            Accumulator::String { start, .. } => {
                return Some(Err(LexError::UnterminatedString {
                    line: self.line,
                    span: (start..self.byte).into(),
                }));
            }
            Accumulator::Number { start, .. } => return Some(Ok(self.number(start))),
            Accumulator::Ident { start } => return Some(Ok(self.token(TokenKind::Ident, start))),
            Accumulator::Idle => {}
        }

        if self.finished {
            return None;
        }
        self.finished = true;
        Some(Ok(self.token(TokenKind::EndOfInput, self.byte)))
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut chars = self.rest().chars();
            let Some(c) = chars.next() else {
                return self.finish();
            };
            let lookahead = chars.next();

            if self.config.trace {
                tracing::trace!(line = self.line, byte = self.byte, ?c, state = ?self.state, "scanning");
            }

            // A finished identifier or number does not consume `c`; it is
            // re-tested on the next call with the accumulator idle.
            match self.state {
                Accumulator::Ident { start } => {
                    if is_ident_continue(c) {
                        self.byte += c.len_utf8();
                        continue;
                    }
                    self.state = Accumulator::Idle;
                    return Some(Ok(self.token(TokenKind::Ident, start)));
                }
                Accumulator::Number { start, fractional } => {
                    if c.is_ascii_digit() {
                        self.byte += 1;
                        continue;
                    }
                    if c == '.' && !fractional && lookahead.is_some_and(|n| n.is_ascii_digit()) {
                        self.state = Accumulator::Number {
                            start,
                            fractional: true,
                        };
                        self.byte += 1;
                        continue;
                    }
                    self.state = Accumulator::Idle;
                    return Some(Ok(self.number(start)));
                }
                Accumulator::Idle | Accumulator::String { .. } => {}
            }

            if c.is_ascii_digit() && self.state == Accumulator::Idle {
                self.state = Accumulator::Number {
                    start: self.byte,
                    fractional: false,
                };
                self.byte += 1;
                continue;
            }

            if c == '"' {
                self.byte += 1;
                if let Accumulator::String { start, line } = self.state {
                    self.state = Accumulator::Idle;
                    return Some(Ok(Token {
                        kind: TokenKind::String,
                        literal: &self.whole[start + 1..self.byte - 1],
                        line,
                        span: (start..self.byte).into(),
                    }));
                }
                self.state = Accumulator::String {
                    start: self.byte - 1,
                    line: self.line,
                };
                continue;
            }

            if let Accumulator::String { .. } = self.state {
                if c == '\n' {
                    self.line += 1;
                }
                self.byte += c.len_utf8();
                continue;
            }

            if c == '/' && lookahead == Some('/') {
                match self.rest().find('\n') {
                    Some(newline) => {
                        self.byte += newline + 1;
                        self.line += 1;
                    }
                    None => self.byte = self.whole.len(),
                }
                continue;
            }

            if let Some((lexeme, kind)) = self.match_fixed() {
                let start = self.byte;
                self.byte += lexeme.len();
                return Some(Ok(self.token(kind, start)));
            }

            let start = self.byte;
            self.byte += c.len_utf8();

            if c == '\n' {
                self.line += 1;
                continue;
            }
            if self.config.ignored.contains(&c) {
                continue;
            }
            if is_ident_start(c) {
                self.state = Accumulator::Ident { start };
                continue;
            }

            return Some(Err(LexError::UnexpectedCharacter {
                token: c,
                line: self.line,
                span: (start..self.byte).into(),
            }));
        }
    }
}

/// Everything the lexer produced for one source buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed<'de> {
    /// Tokens and errors in source order; the last entry is always the
    /// end-of-input token.
    pub entries: Vec<Result<Token<'de>, LexError>>,
    pub error_count: usize,
}

impl<'de> Lexed<'de> {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &LexError> {
        self.entries.iter().filter_map(|entry| entry.as_ref().err())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token<'de>> {
        self.entries.iter().filter_map(|entry| entry.as_ref().ok())
    }

    /// The token sequence, or every lexical error if there was at least one.
    pub fn into_tokens(self) -> Result<Vec<Token<'de>>, Vec<LexError>> {
        if self.has_errors() {
            return Err(self.entries.into_iter().filter_map(Result::err).collect());
        }
        Ok(self.entries.into_iter().filter_map(Result::ok).collect())
    }
}

pub fn lex(source: &str, config: LexerConfig) -> Lexed<'_> {
    let mut error_count = 0;
    let entries: Vec<_> = Lexer::with_config(source, config)
        .inspect(|entry| {
            if entry.is_err() {
                error_count += 1;
            }
        })
        .collect();

    tracing::debug!(entries = entries.len(), error_count, "lexing complete");
    Lexed {
        entries,
        error_count,
    }
}

/// Decodes the digits of a number literal by accumulation. Trailing zeros of
/// the fraction (and a then-bare point) are dropped first.
pub fn decode_number(literal: &str) -> f64 {
    let trimmed = if literal.contains('.') {
        literal.trim_end_matches('0').trim_end_matches('.')
    } else {
        literal
    };

    let mut value = 0.0;
    let mut fraction_digits = 0;
    let mut seen_point = false;
    for c in trimmed.chars() {
        match c.to_digit(10) {
            Some(digit) => {
                value = value * 10.0 + f64::from(digit);
                if seen_point {
                    fraction_digits += 1;
                }
            }
            None => seen_point = true,
        }
    }

    if fraction_digits > 0 {
        value /= 10f64.powi(fraction_digits);
    }
    value
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
