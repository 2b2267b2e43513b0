pub mod eval;
pub mod lex;
pub mod parse;
mod stack;

pub use eval::{RuntimeError, Value, evaluate};
pub use lex::{LexError, Lexed, Lexer, LexerConfig, Token, TokenKind, lex};
pub use parse::{Expr, ParseError, Parser, parse};

/// Pipeline stage a failure came from, as seen by the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
    Runtime,
}

impl Phase {
    pub const fn exit_code(self) -> i32 {
        match self {
            Phase::Lex | Phase::Parse => 65,
            Phase::Runtime => 70,
        }
    }
}
