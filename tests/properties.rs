use lox_expr::{LexerConfig, TokenKind, Value, evaluate, lex, parse};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Arith {
    Num(u32),
    Op(Box<Arith>, char, Box<Arith>),
    Paren(Box<Arith>),
}

impl Arith {
    fn value(&self) -> f64 {
        match self {
            Arith::Num(n) => f64::from(*n),
            Arith::Paren(inner) => inner.value(),
            Arith::Op(l, op, r) => {
                let (l, r) = (l.value(), r.value());
                match op {
                    '+' => l + r,
                    '-' => l - r,
                    '*' => l * r,
                    _ => l / r,
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Arith::Op(_, '+' | '-', _) => 1,
            Arith::Op(..) => 2,
            Arith::Num(_) | Arith::Paren(_) => 3,
        }
    }

    /// Renders with only the parentheses precedence and left associativity
    /// require, plus the explicit `Paren` groups.
    fn render(&self) -> String {
        match self {
            Arith::Num(n) => n.to_string(),
            Arith::Paren(inner) => format!("({})", inner.render()),
            Arith::Op(l, op, r) => {
                let p = self.precedence();
                let left = if l.precedence() < p {
                    format!("({})", l.render())
                } else {
                    l.render()
                };
                let right = if r.precedence() <= p {
                    format!("({})", r.render())
                } else {
                    r.render()
                };
                format!("{left} {op} {right}")
            }
        }
    }
}

fn arith() -> impl Strategy<Value = Arith> {
    let leaf = (0u32..1000).prop_map(Arith::Num);
    leaf.prop_recursive(5, 48, 2, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop::sample::select(vec!['+', '-', '*', '/']),
                inner.clone()
            )
                .prop_map(|(l, op, r)| Arith::Op(Box::new(l), op, Box::new(r))),
            inner.prop_map(|e| Arith::Paren(Box::new(e))),
        ]
    })
}

proptest! {
    #[test]
    fn arithmetic_matches_direct_evaluation(expr in arith()) {
        let source = expr.render();
        let tokens = lex(&source, LexerConfig::default()).into_tokens();
        prop_assert!(tokens.is_ok(), "lexing failed for {}", source);
        let tokens = tokens.unwrap();
        let tree = parse(&tokens);
        prop_assert!(tree.is_ok(), "parsing failed for {}: {:?}", source, tree);
        let tree = tree.unwrap();

        let expected = expr.value();
        match evaluate(Some(&tree)) {
            Ok(Value::Number(actual)) => prop_assert!(
                actual == expected || (actual.is_nan() && expected.is_nan()),
                "{} evaluated to {} instead of {}", source, actual, expected
            ),
            other => prop_assert!(false, "{} evaluated to {:?}", source, other),
        }
    }

    #[test]
    fn lexing_never_aborts(source in "\\PC*") {
        let lexed = lex(&source, LexerConfig::default());
        let last = lexed.entries.last().and_then(|entry| entry.as_ref().ok()).map(|t| t.kind);
        prop_assert_eq!(last, Some(TokenKind::EndOfInput));
        let ends = lexed
            .tokens()
            .filter(|token| token.kind == TokenKind::EndOfInput)
            .count();
        prop_assert_eq!(ends, 1);
        prop_assert_eq!(lexed.errors().count(), lexed.error_count);
    }

    #[test]
    fn decimal_literals_decode_like_the_standard_parser(
        whole in 0u64..1_000_000,
        fraction in 0u32..100_000,
        zeros in 0usize..3,
    ) {
        let literal = format!("{whole}.{fraction:05}{}", "0".repeat(zeros));
        let expected: f64 = literal.parse().unwrap();
        let decoded = lox_expr::lex::decode_number(&literal);
        prop_assert_eq!(decoded, expected, "literal {}", literal);
    }
}
