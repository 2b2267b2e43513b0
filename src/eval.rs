use std::{borrow::Cow, fmt::Display};

use miette::Diagnostic;
use thiserror::Error;

use crate::{
    lex::NumberDisplay,
    parse::{BinaryOp, Expr, Literal, UnaryOp},
    stack::ensure_sufficient_stack,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'de> {
    Number(f64),
    Bool(bool),
    Str(Cow<'de, str>),
    Nil,
}

impl Value<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Nil => "nil",
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("input tree is empty")]
    #[diagnostic(code(lox::runtime::empty_tree))]
    EmptyTree,

    #[error("operand must be a number")]
    #[diagnostic(
        code(lox::runtime::operand_not_number),
        help("`{op}` cannot be applied to a {found}")
    )]
    OperandMustBeNumber { op: UnaryOp, found: &'static str },

    #[error("operand must be a boolean, nil, or number")]
    #[diagnostic(
        code(lox::runtime::operand_no_truthiness),
        help("`{op}` cannot be applied to a {found}")
    )]
    OperandMustHaveTruthiness { op: UnaryOp, found: &'static str },

    #[error("operands must be numbers")]
    #[diagnostic(
        code(lox::runtime::operands_not_numbers),
        help("`{op}` cannot be applied to a {left} and a {right}")
    )]
    OperandsMustBeNumbers {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },

    #[error("operands must be two numbers or two strings")]
    #[diagnostic(
        code(lox::runtime::operands_not_addable),
        help("`+` cannot be applied to a {left} and a {right}")
    )]
    OperandsMustBeNumbersOrStrings {
        left: &'static str,
        right: &'static str,
    },
}

/// Evaluates a parsed tree. `None` stands for a pipeline that produced no
/// tree and is reported rather than ignored.
pub fn evaluate<'de>(tree: Option<&Expr<'de>>) -> Result<Value<'de>, RuntimeError> {
    let tree = tree.ok_or(RuntimeError::EmptyTree)?;
    let value = eval_expr(tree)?;
    tracing::debug!(%value, "evaluation complete");
    Ok(value)
}

pub fn eval_expr<'de>(expr: &Expr<'de>) -> Result<Value<'de>, RuntimeError> {
    ensure_sufficient_stack(|| match expr {
        Expr::Literal(literal) => Ok(match *literal {
            Literal::Number(n) => Value::Number(n),
            Literal::String(s) => Value::Str(Cow::Borrowed(s)),
            Literal::True => Value::Bool(true),
            Literal::False => Value::Bool(false),
            Literal::Nil => Value::Nil,
        }),
        Expr::Grouping(inner) => eval_expr(inner),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand)?;
            eval_unary(*op, value)
        }
        Expr::Binary { left, op, right } => {
            let lhs = eval_expr(left)?;
            let rhs = eval_expr(right)?;
            eval_binary(*op, lhs, rhs)
        }
    })
}

fn eval_unary(op: UnaryOp, value: Value<'_>) -> Result<Value<'_>, RuntimeError> {
    match (op, value) {
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Negate, other) => Err(RuntimeError::OperandMustBeNumber {
            op,
            found: other.kind(),
        }),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, Value::Nil) => Ok(Value::Bool(true)),
        // numbers are truthy, zero included
        (UnaryOp::Not, Value::Number(_)) => Ok(Value::Bool(false)),
        (UnaryOp::Not, other @ Value::Str(_)) => Err(RuntimeError::OperandMustHaveTruthiness {
            op,
            found: other.kind(),
        }),
    }
}

fn eval_binary<'de>(
    op: BinaryOp,
    lhs: Value<'de>,
    rhs: Value<'de>,
) -> Result<Value<'de>, RuntimeError> {
    let numbers = |lhs: &Value<'_>, rhs: &Value<'_>| match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => Ok((*l, *r)),
        _ => Err(RuntimeError::OperandsMustBeNumbers {
            op,
            left: lhs.kind(),
            right: rhs.kind(),
        }),
    };

    Ok(match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Number(l), Value::Number(r)) => Value::Number(l + r),
            (Value::Str(l), Value::Str(r)) => Value::Str(Cow::Owned(format!("{l}{r}"))),
            (lhs, rhs) => {
                return Err(RuntimeError::OperandsMustBeNumbersOrStrings {
                    left: lhs.kind(),
                    right: rhs.kind(),
                });
            }
        },
        BinaryOp::Subtract => {
            let (l, r) = numbers(&lhs, &rhs)?;
            Value::Number(l - r)
        }
        BinaryOp::Multiply => {
            let (l, r) = numbers(&lhs, &rhs)?;
            Value::Number(l * r)
        }
        BinaryOp::Divide => {
            let (l, r) = numbers(&lhs, &rhs)?;
            Value::Number(l / r)
        }
        BinaryOp::Equal => Value::Bool(values_equal(&lhs, &rhs)),
        BinaryOp::NotEqual => Value::Bool(!values_equal(&lhs, &rhs)),
        BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
            let ordinal = |value: &Value<'_>| match value {
                Value::Number(n) => Ok(*n),
                Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
                Value::Nil => Ok(0.0),
                Value::Str(_) => Err(RuntimeError::OperandsMustBeNumbers {
                    op,
                    left: lhs.kind(),
                    right: rhs.kind(),
                }),
            };
            let (l, r) = (ordinal(&lhs)?, ordinal(&rhs)?);
            Value::Bool(match op {
                BinaryOp::Less => l < r,
                BinaryOp::LessEq => l <= r,
                BinaryOp::Greater => l > r,
                _ => l >= r,
            })
        }
    })
}

/// Values of different kinds are never equal; there is no coercion.
fn values_equal(lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (lhs, rhs) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => l == r,
        (Value::Str(l), Value::Str(r)) => l == r,
        _ => false,
    }
}

impl Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", NumberDisplay(*n)),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Nil => write!(f, "nil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        lex::{LexerConfig, lex},
        parse::parse,
    };

    fn run(source: &str) -> Result<Value<'_>, RuntimeError> {
        let tokens = lex(source, LexerConfig::default())
            .into_tokens()
            .expect("source should lex cleanly");
        let expr = parse(&tokens).expect("source should parse");
        evaluate(Some(&expr))
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run("\"a\" + \"b\""), Ok(Value::Str("ab".into())));
    }

    #[test]
    fn mixed_addition_fails() {
        assert_eq!(
            run("1 + \"a\""),
            Err(RuntimeError::OperandsMustBeNumbersOrStrings {
                left: "number",
                right: "string"
            })
        );
        assert_eq!(
            run("1 + \"a\"").unwrap_err().to_string(),
            "operands must be two numbers or two strings"
        );
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run("1 + 2 * 3"), Ok(Value::Number(7.0)));
        assert_eq!(run("(1 + 2) * 3"), Ok(Value::Number(9.0)));
        assert_eq!(run("10 / 4 - 1"), Ok(Value::Number(1.5)));
        assert_eq!(run("--3"), Ok(Value::Number(3.0)));
    }

    #[test]
    fn division_by_zero_follows_ieee() {
        assert_eq!(run("1 / 0"), Ok(Value::Number(f64::INFINITY)));
        assert_eq!(run("-1 / 0"), Ok(Value::Number(f64::NEG_INFINITY)));
        assert!(matches!(run("0 / 0"), Ok(Value::Number(n)) if n.is_nan()));
    }

    #[test]
    fn arithmetic_requires_numbers() {
        for source in ["true - 1", "\"a\" * 2", "nil / 1", "\"a\" - \"b\""] {
            let err = run(source).unwrap_err();
            assert!(
                matches!(err, RuntimeError::OperandsMustBeNumbers { .. }),
                "{source}: {err:?}"
            );
        }
    }

    #[test]
    fn negation_requires_a_number() {
        assert_eq!(
            run("-\"muffin\""),
            Err(RuntimeError::OperandMustBeNumber {
                op: UnaryOp::Negate,
                found: "string"
            })
        );
        assert!(run("-true").is_err());
        assert!(run("-nil").is_err());
    }

    #[test]
    fn truthiness() {
        assert_eq!(run("!nil"), Ok(Value::Bool(true)));
        assert_eq!(run("!0"), Ok(Value::Bool(false)));
        assert_eq!(run("!12.5"), Ok(Value::Bool(false)));
        assert_eq!(run("!true"), Ok(Value::Bool(false)));
        assert_eq!(run("!!false"), Ok(Value::Bool(false)));
    }

    #[test]
    fn not_on_a_string_is_a_typed_error() {
        assert_eq!(
            run("!\"\""),
            Err(RuntimeError::OperandMustHaveTruthiness {
                op: UnaryOp::Not,
                found: "string"
            })
        );
    }

    #[test]
    fn equality_never_coerces() {
        assert_eq!(run("1 == \"1\""), Ok(Value::Bool(false)));
        assert_eq!(run("\"1\" == 1"), Ok(Value::Bool(false)));
        assert_eq!(run("1 != \"1\""), Ok(Value::Bool(true)));
        assert_eq!(run("nil == false"), Ok(Value::Bool(false)));
        assert_eq!(run("0 == false"), Ok(Value::Bool(false)));
    }

    #[test]
    fn equality_within_a_kind() {
        assert_eq!(run("nil == nil"), Ok(Value::Bool(true)));
        assert_eq!(run("true == true"), Ok(Value::Bool(true)));
        assert_eq!(run("true != false"), Ok(Value::Bool(true)));
        assert_eq!(run("\"ab\" == \"a\" + \"b\""), Ok(Value::Bool(true)));
        assert_eq!(run("1.5 == 1.50"), Ok(Value::Bool(true)));
        assert_eq!(run("0 / 0 == 0 / 0"), Ok(Value::Bool(false)));
    }

    #[test]
    fn relational_operators() {
        assert_eq!(run("1 < 2"), Ok(Value::Bool(true)));
        assert_eq!(run("2 <= 2"), Ok(Value::Bool(true)));
        assert_eq!(run("3 > 4"), Ok(Value::Bool(false)));
        assert_eq!(run("4 >= 4.5"), Ok(Value::Bool(false)));
    }

    #[test]
    fn relational_coercion_of_bool_and_nil() {
        assert_eq!(run("true > false"), Ok(Value::Bool(true)));
        assert_eq!(run("nil < 1"), Ok(Value::Bool(true)));
        assert_eq!(run("nil >= false"), Ok(Value::Bool(true)));
        assert_eq!(run("true <= 0.5"), Ok(Value::Bool(false)));
    }

    #[test]
    fn relational_rejects_strings() {
        assert_eq!(
            run("\"a\" < \"b\""),
            Err(RuntimeError::OperandsMustBeNumbers {
                op: BinaryOp::Less,
                left: "string",
                right: "string"
            })
        );
        assert!(run("1 >= \"b\"").is_err());
    }

    #[test]
    fn left_operand_error_wins() {
        assert_eq!(
            run("-\"a\" + !\"b\""),
            Err(RuntimeError::OperandMustBeNumber {
                op: UnaryOp::Negate,
                found: "string"
            })
        );
    }

    #[test]
    fn operand_errors_come_before_type_checks() {
        // The right operand fails while the pair would also be ill-typed.
        assert_eq!(
            run("\"a\" * -nil"),
            Err(RuntimeError::OperandMustBeNumber {
                op: UnaryOp::Negate,
                found: "nil"
            })
        );
    }

    #[test]
    fn deep_nesting_evaluates_without_overflow() {
        let depth = 50_000;
        let source = format!("{}1 + 2{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(run(&source), Ok(Value::Number(3.0)));

        let source = format!("{}nil", "!".repeat(200_000));
        assert_eq!(run(&source), Ok(Value::Bool(true)));

        let source = format!("{}1", "-".repeat(200_001));
        assert_eq!(run(&source), Ok(Value::Number(-1.0)));
    }

    #[test]
    fn empty_tree() {
        assert_eq!(evaluate(None), Err(RuntimeError::EmptyTree));
        assert_eq!(RuntimeError::EmptyTree.to_string(), "input tree is empty");
    }

    #[test]
    fn value_rendering() {
        assert_eq!(Value::Number(3.0).to_string(), "3.0");
        assert_eq!(Value::Number(-0.25).to_string(), "-0.25");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Str("raw text".into()).to_string(), "raw text");
        assert_eq!(Value::Nil.to_string(), "nil");
    }
}
