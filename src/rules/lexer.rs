//! Condition Lexer
//!
//! Splits a rule condition such as
//! `$CI_PIPELINE_SOURCE == "push" && $CI_COMMIT_TITLE =~ /^Draft:/i`
//! into tokens. A `/` starts a regex literal only directly after `=~`;
//! elsewhere it is part of a bare token (`refs/heads/main`).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `$NAME` or `${NAME}`
    Variable(String),
    /// Quoted string, escapes decoded
    String(String),
    /// `/pattern/flags`
    Regex { pattern: String, flags: String },
    /// Unquoted word such as `null` or `main`
    Bare(String),
    EqEq,
    NotEq,
    Match,
    AndAnd,
    OrOr,
    LParen,
    RParen,
    Eof,
}

/// Regex flags the evaluator knows how to apply.
pub const SUPPORTED_FLAGS: &str = "ims";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },
    #[error("unterminated string at {pos}")]
    UnterminatedString { pos: usize },
    #[error("unterminated regex at {pos}")]
    UnterminatedRegex { pos: usize },
    #[error("unsupported regex flag '{flag}' at {pos}")]
    UnsupportedFlag { flag: char, pos: usize },
    #[error("invalid variable name at {pos}")]
    InvalidVariable { pos: usize },
    #[error("unsupported operator '{op}' at {pos}")]
    UnsupportedOperator { op: String, pos: usize },
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = input.chars().collect();
    let mut index = 0usize;
    let mut tokens: Vec<Token> = Vec::new();

    while index < chars.len() {
        let ch = chars[index];
        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        let after_match = matches!(tokens.last(), Some(Token { kind: TokenKind::Match, .. }));
        let token = match ch {
            '$' => consume_variable(&chars, &mut index)?,
            '\'' | '"' => consume_string(&chars, &mut index)?,
            '/' if after_match => consume_regex(&chars, &mut index)?,
            '=' | '!' | '&' | '|' => consume_operator(&chars, &mut index)?,
            '(' => single(TokenKind::LParen, &mut index),
            ')' => single(TokenKind::RParen, &mut index),
            _ => consume_bare(&chars, &mut index),
        };
        tokens.push(token);
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: chars.len(),
    });

    Ok(tokens)
}

fn single(kind: TokenKind, index: &mut usize) -> Token {
    let pos = *index;
    *index += 1;
    Token { kind, pos }
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn consume_variable(chars: &[char], index: &mut usize) -> Result<Token, LexError> {
    let start = *index;
    *index += 1;

    let braced = chars.get(*index) == Some(&'{');
    if braced {
        *index += 1;
    }

    let name_start = *index;
    if !chars.get(*index).copied().is_some_and(is_name_start) {
        return Err(LexError::InvalidVariable { pos: start });
    }
    while *index < chars.len() && is_name_char(chars[*index]) {
        *index += 1;
    }
    let name: String = chars[name_start..*index].iter().collect();

    if braced {
        if chars.get(*index) != Some(&'}') {
            return Err(LexError::InvalidVariable { pos: start });
        }
        *index += 1;
    }

    Ok(Token {
        kind: TokenKind::Variable(name),
        pos: start,
    })
}

fn consume_string(chars: &[char], index: &mut usize) -> Result<Token, LexError> {
    let quote = chars[*index];
    let start = *index;
    *index += 1;
    let mut out = String::new();

    while *index < chars.len() {
        let current = chars[*index];
        if current == quote {
            *index += 1;
            return Ok(Token {
                kind: TokenKind::String(out),
                pos: start,
            });
        }
        if current == '\\' && *index + 1 < chars.len() {
            let escaped = chars[*index + 1];
            if escaped == quote || escaped == '\\' {
                out.push(escaped);
                *index += 2;
                continue;
            }
        }
        out.push(current);
        *index += 1;
    }

    Err(LexError::UnterminatedString { pos: start })
}

/// Reads `/pattern/flags`. `\/` stands for a literal slash; other escapes
/// are handed to the regex engine untouched.
fn consume_regex(chars: &[char], index: &mut usize) -> Result<Token, LexError> {
    let start = *index;
    *index += 1;
    let mut pattern = String::new();
    let mut terminated = false;

    while *index < chars.len() {
        let current = chars[*index];
        if current == '/' {
            *index += 1;
            terminated = true;
            break;
        }
        if current == '\\' && *index + 1 < chars.len() {
            let escaped = chars[*index + 1];
            if escaped != '/' {
                pattern.push('\\');
            }
            pattern.push(escaped);
            *index += 2;
            continue;
        }
        pattern.push(current);
        *index += 1;
    }

    if !terminated {
        return Err(LexError::UnterminatedRegex { pos: start });
    }

    let mut flags = String::new();
    while *index < chars.len() && chars[*index].is_ascii_alphabetic() {
        let flag = chars[*index];
        if !SUPPORTED_FLAGS.contains(flag) {
            return Err(LexError::UnsupportedFlag { flag, pos: *index });
        }
        if !flags.contains(flag) {
            flags.push(flag);
        }
        *index += 1;
    }

    Ok(Token {
        kind: TokenKind::Regex { pattern, flags },
        pos: start,
    })
}

fn consume_operator(chars: &[char], index: &mut usize) -> Result<Token, LexError> {
    let pos = *index;
    let ch = chars[pos];
    let next = chars.get(pos + 1).copied();

    let kind = match (ch, next) {
        ('=', Some('=')) => TokenKind::EqEq,
        ('=', Some('~')) => TokenKind::Match,
        ('!', Some('=')) => TokenKind::NotEq,
        ('&', Some('&')) => TokenKind::AndAnd,
        ('|', Some('|')) => TokenKind::OrOr,
        ('!', Some('~')) => {
            return Err(LexError::UnsupportedOperator {
                op: "!~".to_string(),
                pos,
            })
        }
        _ => return Err(LexError::UnexpectedCharacter { ch, pos }),
    };

    *index += 2;
    Ok(Token { kind, pos })
}

fn consume_bare(chars: &[char], index: &mut usize) -> Token {
    let start = *index;
    while *index < chars.len() {
        let ch = chars[*index];
        if ch.is_whitespace() || "()=!&|'\"$".contains(ch) {
            break;
        }
        *index += 1;
    }
    Token {
        kind: TokenKind::Bare(chars[start..*index].iter().collect()),
        pos: start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds(r#"$CI_PIPELINE_SOURCE == "push" && ${BRANCH} != 'main'"#),
            vec![
                TokenKind::Variable("CI_PIPELINE_SOURCE".to_string()),
                TokenKind::EqEq,
                TokenKind::String("push".to_string()),
                TokenKind::AndAnd,
                TokenKind::Variable("BRANCH".to_string()),
                TokenKind::NotEq,
                TokenKind::String("main".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_literal_with_flags() {
        assert_eq!(
            kinds(r"$TITLE =~ /^(\[Draft\]|Draft:)/i"),
            vec![
                TokenKind::Variable("TITLE".to_string()),
                TokenKind::Match,
                TokenKind::Regex {
                    pattern: r"^(\[Draft\]|Draft:)".to_string(),
                    flags: "i".to_string(),
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_escaped_slash() {
        let tokens = kinds(r"$REF =~ /^refs\/heads\//");
        assert_eq!(
            tokens[2],
            TokenKind::Regex {
                pattern: "^refs/heads/".to_string(),
                flags: String::new(),
            }
        );
    }

    #[test]
    fn test_slash_outside_regex_is_bare() {
        assert_eq!(
            kinds("$REF == refs/heads/main"),
            vec![
                TokenKind::Variable("REF".to_string()),
                TokenKind::EqEq,
                TokenKind::Bare("refs/heads/main".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_parentheses_and_or() {
        assert_eq!(
            kinds("($A||$B)"),
            vec![
                TokenKind::LParen,
                TokenKind::Variable("A".to_string()),
                TokenKind::OrOr,
                TokenKind::Variable("B".to_string()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r#""say \"hi\"""#)[0], TokenKind::String(r#"say "hi""#.to_string()));
        assert_eq!(kinds(r"'a\nb'")[0], TokenKind::String(r"a\nb".to_string()));
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("\"open"), Err(LexError::UnterminatedString { pos: 0 }));
        assert_eq!(tokenize("$A =~ /open"), Err(LexError::UnterminatedRegex { pos: 6 }));
        assert_eq!(tokenize("$A =~ /x/g"), Err(LexError::UnsupportedFlag { flag: 'g', pos: 9 }));
        assert_eq!(tokenize("$1 == x"), Err(LexError::InvalidVariable { pos: 0 }));
        assert_eq!(tokenize("${A == x"), Err(LexError::InvalidVariable { pos: 0 }));
        assert_eq!(tokenize("$A = x"), Err(LexError::UnexpectedCharacter { ch: '=', pos: 3 }));
        assert!(matches!(tokenize("$A !~ /x/"), Err(LexError::UnsupportedOperator { .. })));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("$A == 'x'").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.pos).collect();
        assert_eq!(positions, vec![0, 3, 6, 9]);
    }
}
