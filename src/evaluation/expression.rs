use crate::evolution::grammar::find_marker;
use std::collections::HashMap;
use thiserror::Error;

/// Truth values for the variables of a run.
pub type Assignment = HashMap<String, bool>;

/// Words the lexer reads as operators or literals; they can never name a variable.
pub const RESERVED_WORDS: [&str; 6] = ["AND", "OR", "XOR", "NOT", "0", "1"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpanded non-terminal '{0}' in expression")]
    UnexpandedNonTerminal(String),
    #[error("Invalid character '{character}' at byte {position}")]
    InvalidCharacter { character: char, position: usize },
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value(bool),
    And,
    Or,
    Xor,
    Not,
    LeftParen,
    RightParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Value(v) => (*v as u8).to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Xor => "XOR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::LeftParen => "(".to_string(),
            Token::RightParen => ")".to_string(),
        }
    }
}

/// Splits an expression into tokens, substituting variables by whole-word lookup.
///
/// Words are maximal runs of alphanumerics and `_`, so a variable `A` never matches inside
/// `AND` or `AB`. The literals `0` and `1` are accepted as-is.
fn tokenize(expression: &str, assignment: &Assignment) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LeftParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RightParen);
                chars.next();
            }
            '<' => {
                let rest = &expression[position..];
                return match find_marker(rest) {
                    Some((0, end)) => Err(ExpressionError::UnexpandedNonTerminal(
                        rest[..end].to_string(),
                    )),
                    _ => Err(ExpressionError::InvalidCharacter {
                        character: '<',
                        position,
                    }),
                };
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                let token = match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "XOR" => Token::Xor,
                    "NOT" => Token::Not,
                    "0" => Token::Value(false),
                    "1" => Token::Value(true),
                    name => match assignment.get(name) {
                        Some(value) => Token::Value(*value),
                        None => return Err(ExpressionError::UnknownVariable(name.to_string())),
                    },
                };
                tokens.push(token);
            }
            character => {
                return Err(ExpressionError::InvalidCharacter {
                    character,
                    position,
                })
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over the token stream.
///
/// ```text
/// or   := xor ( OR xor )*
/// xor  := and ( XOR and )*
/// and  := not ( AND not )*
/// not  := NOT not | atom
/// atom := 0 | 1 | ( or )
/// ```
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<bool, ExpressionError> {
        let value = self.or_expr()?;
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                token: token.describe(),
                position: self.pos,
            }),
        }
    }

    #[inline]
    fn eat(&mut self, expected: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<bool, ExpressionError> {
        let mut value = self.xor_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.xor_expr()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn xor_expr(&mut self) -> Result<bool, ExpressionError> {
        let mut value = self.and_expr()?;
        while self.eat(&Token::Xor) {
            let rhs = self.and_expr()?;
            value = value != rhs;
        }
        Ok(value)
    }

    fn and_expr(&mut self) -> Result<bool, ExpressionError> {
        let mut value = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not_expr(&mut self) -> Result<bool, ExpressionError> {
        if self.eat(&Token::Not) {
            return Ok(!self.not_expr()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<bool, ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            Token::Value(v) => Ok(v),
            Token::LeftParen => {
                let value = self.or_expr()?;
                if self.eat(&Token::RightParen) {
                    Ok(value)
                } else {
                    match self.tokens.get(self.pos) {
                        Some(other) => Err(ExpressionError::UnexpectedToken {
                            token: other.describe(),
                            position: self.pos,
                        }),
                        None => Err(ExpressionError::UnexpectedEnd),
                    }
                }
            }
            other => Err(ExpressionError::UnexpectedToken {
                token: other.describe(),
                position: self.pos - 1,
            }),
        }
    }
}

/// Evaluates a Boolean expression over `AND`, `OR`, `XOR`, `NOT`, parentheses, `0`/`1`
/// literals and the variables in `assignment`.
///
/// Precedence from tightest to loosest: `NOT`, `AND`, `XOR`, `OR`. Binary operators are
/// left-associative.
pub fn evaluate_expression(expression: &str, assignment: &Assignment) -> Result<bool, ExpressionError> {
    let tokens = tokenize(expression, assignment)?;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(pairs: &[(&str, bool)]) -> Assignment {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_basic_operators() {
        let vars = assignment(&[("A", true), ("B", false)]);
        assert!(evaluate_expression("A", &vars).unwrap());
        assert!(!evaluate_expression("B", &vars).unwrap());
        assert!(!evaluate_expression("A AND B", &vars).unwrap());
        assert!(evaluate_expression("A OR B", &vars).unwrap());
        assert!(evaluate_expression("A XOR B", &vars).unwrap());
        assert!(!evaluate_expression("A XOR A", &vars).unwrap());
        assert!(evaluate_expression("NOT B", &vars).unwrap());
        assert!(evaluate_expression("NOT NOT A", &vars).unwrap());
    }

    #[test]
    fn test_literals() {
        let vars = Assignment::new();
        assert!(evaluate_expression("1", &vars).unwrap());
        assert!(!evaluate_expression("0", &vars).unwrap());
        assert!(evaluate_expression("0 OR 1", &vars).unwrap());
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let vars = assignment(&[("A", false), ("B", false)]);
        // (NOT A) AND B, not NOT (A AND B)
        assert!(!evaluate_expression("NOT A AND B", &vars).unwrap());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let vars = assignment(&[("A", true), ("B", false), ("C", false)]);
        // A OR (B AND C)
        assert!(evaluate_expression("A OR B AND C", &vars).unwrap());
        // (B AND C) OR A
        assert!(evaluate_expression("B AND C OR A", &vars).unwrap());
    }

    #[test]
    fn test_xor_sits_between_and_and_or() {
        let vars = assignment(&[("A", true), ("B", true), ("C", false)]);
        // A XOR (B AND C) = 1 XOR 0
        assert!(evaluate_expression("A XOR B AND C", &vars).unwrap());
        // A OR (B XOR B) = 1
        assert!(evaluate_expression("A OR B XOR B", &vars).unwrap());
        // (C XOR C) OR C = 0
        assert!(!evaluate_expression("C XOR C OR C", &vars).unwrap());
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let vars = assignment(&[("A", true), ("B", false), ("C", false)]);
        assert!(!evaluate_expression("( A OR B ) AND C", &vars).unwrap());
        assert!(evaluate_expression("NOT ( A AND C )", &vars).unwrap());
        assert!(evaluate_expression("(A OR B)", &vars).unwrap());
    }

    #[test]
    fn test_variables_match_whole_words_only() {
        let vars = assignment(&[("A", false), ("AB", true), ("N", true)]);
        assert!(evaluate_expression("AB", &vars).unwrap());
        // "N" must not be found inside "AND" / "NOT"
        assert!(!evaluate_expression("NOT N", &vars).unwrap());
        assert!(!evaluate_expression("N AND A", &vars).unwrap());
    }

    #[test]
    fn test_unknown_variable() {
        let vars = assignment(&[("A", true)]);
        assert_eq!(
            evaluate_expression("A AND Z", &vars),
            Err(ExpressionError::UnknownVariable("Z".to_string()))
        );
    }

    #[test]
    fn test_unexpanded_marker_is_reported() {
        let vars = assignment(&[("A", true)]);
        assert_eq!(
            evaluate_expression("A AND <expr>", &vars),
            Err(ExpressionError::UnexpandedNonTerminal("<expr>".to_string()))
        );
    }

    #[test]
    fn test_stray_angle_bracket_is_invalid_character() {
        let vars = assignment(&[("A", true), ("B", false)]);
        assert_eq!(
            evaluate_expression("A <> A", &vars),
            Err(ExpressionError::InvalidCharacter {
                character: '<',
                position: 2
            })
        );
        assert!(matches!(
            evaluate_expression("A < B", &vars),
            Err(ExpressionError::InvalidCharacter { character: '<', .. })
        ));
        assert_eq!(
            evaluate_expression("(<term>)", &vars),
            Err(ExpressionError::UnexpandedNonTerminal("<term>".to_string()))
        );
    }

    #[test]
    fn test_malformed_expressions() {
        let vars = assignment(&[("A", true), ("B", true)]);
        assert_eq!(
            evaluate_expression("A AND", &vars),
            Err(ExpressionError::UnexpectedEnd)
        );
        assert_eq!(evaluate_expression("", &vars), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            evaluate_expression("A B", &vars),
            Err(ExpressionError::UnexpectedToken { position: 1, .. })
        ));
        assert!(matches!(
            evaluate_expression("( A", &vars),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            evaluate_expression("A )", &vars),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            evaluate_expression("AND A", &vars),
            Err(ExpressionError::UnexpectedToken { position: 0, .. })
        ));
    }

    #[test]
    fn test_host_language_syntax_is_rejected() {
        let vars = assignment(&[("A", true)]);
        assert!(matches!(
            evaluate_expression("A; rm", &vars),
            Err(ExpressionError::InvalidCharacter { character: ';', .. })
        ));
        assert!(matches!(
            evaluate_expression("A != A", &vars),
            Err(ExpressionError::InvalidCharacter { character: '!', .. })
        ));
    }
}
