//! Condition Parser
//!
//! Recursive descent over the token stream:
//!
//! ```text
//! condition   := conjunction ( "||" conjunction )*
//! conjunction := primary ( "&&" primary )*
//! primary     := "(" condition ")" | comparison
//! comparison  := operand ( ("==" | "!=") operand | "=~" REGEX )?
//! ```
//!
//! `&&` and `||` chains become flat n-ary nodes. Parentheses may nest at
//! most [`MAX_NESTING`] levels deep.

use super::ast::{Condition, Operand, Pattern};
use super::lexer::{tokenize, LexError, Token, TokenKind};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("unexpected token at {pos}: expected {expected}, got {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: usize,
    },
    #[error("empty condition")]
    Empty,
    #[error("parentheses nested deeper than {limit} levels at {pos}")]
    TooDeep { limit: usize, pos: usize },
}

/// Maximum parenthesis nesting accepted in a condition.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

pub fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    let tokens = tokenize(input)?;
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Condition, ParseError> {
        if self.check(&TokenKind::Eof) {
            return Err(ParseError::Empty);
        }
        let condition = self.parse_or()?;
        self.expect(TokenKind::Eof)?;
        Ok(condition)
    }

    fn parse_or(&mut self) -> Result<Condition, ParseError> {
        let mut operands = vec![self.parse_and()?];
        while self.match_kind(&TokenKind::OrOr) {
            operands.push(self.parse_and()?);
        }
        Ok(collapse(operands, Condition::Or))
    }

    fn parse_and(&mut self) -> Result<Condition, ParseError> {
        let mut operands = vec![self.parse_primary()?];
        while self.match_kind(&TokenKind::AndAnd) {
            operands.push(self.parse_primary()?);
        }
        Ok(collapse(operands, Condition::And))
    }

    fn parse_primary(&mut self) -> Result<Condition, ParseError> {
        if self.check(&TokenKind::LParen) {
            if self.depth >= MAX_NESTING {
                return Err(ParseError::TooDeep {
                    limit: MAX_NESTING,
                    pos: self.peek().pos,
                });
            }
            self.advance();
            self.depth += 1;
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen)?;
            self.depth -= 1;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Condition, ParseError> {
        let left = self.parse_operand()?;

        if self.match_kind(&TokenKind::EqEq) {
            let right = self.parse_operand()?;
            return Ok(Condition::Equals {
                left,
                right,
                negated: false,
            });
        }

        if self.match_kind(&TokenKind::NotEq) {
            let right = self.parse_operand()?;
            return Ok(Condition::Equals {
                left,
                right,
                negated: true,
            });
        }

        if self.match_kind(&TokenKind::Match) {
            let token = self.advance();
            return match token.kind {
                TokenKind::Regex { pattern, flags } => Ok(Condition::Matches {
                    subject: left,
                    pattern: Pattern {
                        source: pattern,
                        flags,
                    },
                }),
                _ => Err(unexpected("regex literal", &token)),
            };
        }

        Ok(Condition::Present(left))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Variable(name) => Ok(Operand::Variable(name)),
            TokenKind::String(text) => Ok(Operand::Literal(text)),
            TokenKind::Bare(word) if word == "null" => Ok(Operand::Null),
            TokenKind::Bare(word) => Ok(Operand::Literal(word)),
            _ => Err(unexpected("operand", &token)),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(unexpected(&format!("{:?}", kind), &token))
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }
}

/// A single operand stands for itself.
fn collapse(mut operands: Vec<Condition>, build: fn(Vec<Condition>) -> Condition) -> Condition {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        build(operands)
    }
}

fn unexpected(expected: &str, token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        expected: expected.to_string(),
        found: format!("{:?}", token.kind),
        pos: token.pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Operand {
        Operand::Variable(name.to_string())
    }

    fn lit(text: &str) -> Operand {
        Operand::Literal(text.to_string())
    }

    fn eq(name: &str, value: &str) -> Condition {
        Condition::Equals {
            left: var(name),
            right: lit(value),
            negated: false,
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let parsed = parse_condition(r#"$A == "1" || $B == "2" && $C == "3""#).unwrap();
        let expected = Condition::Or(vec![eq("A", "1"), Condition::And(vec![eq("B", "2"), eq("C", "3")])]);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let parsed = parse_condition(r#"($A == "1" || $B == "2") && $C == "3""#).unwrap();
        let expected = Condition::And(vec![Condition::Or(vec![eq("A", "1"), eq("B", "2")]), eq("C", "3")]);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_chains_are_flat() {
        let parsed = parse_condition("$A && $B && $C").unwrap();
        let expected = Condition::And(vec![
            Condition::Present(var("A")),
            Condition::Present(var("B")),
            Condition::Present(var("C")),
        ]);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_long_chain_stays_flat() {
        let input = vec!["$A"; 200_000].join(" && ");
        match parse_condition(&input).unwrap() {
            Condition::And(operands) => assert_eq!(operands.len(), 200_000),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_redundant_parentheses_collapse() {
        assert_eq!(parse_condition("(($A))").unwrap(), Condition::Present(var("A")));
    }

    #[test]
    fn test_nesting_limit() {
        let within = format!("{}$A{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse_condition(&within).unwrap(), Condition::Present(var("A")));

        let deep = format!("{}$A{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(
            parse_condition(&deep),
            Err(ParseError::TooDeep {
                limit: MAX_NESTING,
                pos: MAX_NESTING,
            })
        );
    }

    #[test]
    fn test_not_equal_and_null() {
        let parsed = parse_condition("$CI_COMMIT_TAG != null").unwrap();
        assert_eq!(
            parsed,
            Condition::Equals {
                left: var("CI_COMMIT_TAG"),
                right: Operand::Null,
                negated: true,
            }
        );
    }

    #[test]
    fn test_regex_match() {
        let parsed = parse_condition("$CI_COMMIT_BRANCH =~ /^release-/m").unwrap();
        assert_eq!(
            parsed,
            Condition::Matches {
                subject: var("CI_COMMIT_BRANCH"),
                pattern: Pattern {
                    source: "^release-".to_string(),
                    flags: "m".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_literal_on_left() {
        let parsed = parse_condition(r#""push" == $SOURCE"#).unwrap();
        assert_eq!(
            parsed,
            Condition::Equals {
                left: lit("push"),
                right: var("SOURCE"),
                negated: false,
            }
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_condition(""), Err(ParseError::Empty));
        assert_eq!(parse_condition("   "), Err(ParseError::Empty));
        assert!(matches!(parse_condition("$A =="), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("($A == x"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("$A == x)"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("$A =~ $PATTERN"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("$A $B"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("$A &&"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse_condition("'open"), Err(ParseError::Lex(_))));
    }
}
