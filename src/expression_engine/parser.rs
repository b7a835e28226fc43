//! Implementation of the expression parser.

use crate::datamodel::Data;
use crate::expression_engine::expressions::{Expr, ExpressionResult};
use crate::expression_engine::lexer::{ExpressionLexer, NumericToken, Operator, Token};
use crate::fsm::GlobalData;

/// Static tool struct to process expressions.
pub struct ExpressionParser {}

impl ExpressionParser {
    /// Parse an expression, returning a re-usable expression tree.
    pub fn parse(text: String) -> Result<Expr, String> {
        let mut lexer = ExpressionLexer::new(text);
        let expression = Self::parse_sequence(&mut lexer)?;
        match lexer.next_token() {
            Token::EOE => Ok(expression),
            t => Err(format!("Unexpected '{}'", t)),
        }
    }

    /// Parses and executes an expression.\
    /// If possible, please use "parse" and re-use the parsed expressions.
    pub fn execute(source: String, global: &mut GlobalData) -> ExpressionResult {
        Self::parse(source)?.execute(global)
    }

    /// Parses and executes an expression.\
    /// If possible, please use "parse" and re-use the parsed expressions.
    pub fn execute_str(source: &str, global: &mut GlobalData) -> ExpressionResult {
        Self::execute(source.to_string(), global)
    }

    fn parse_sequence(lexer: &mut ExpressionLexer) -> Result<Expr, String> {
        let mut expressions = vec![Self::parse_expression(lexer)?];
        while lexer.peek_token() == Token::ExpressionSeparator() {
            lexer.next_token();
            if lexer.peek_token() == Token::EOE {
                break;
            }
            expressions.push(Self::parse_expression(lexer)?);
        }
        if expressions.len() == 1 {
            Ok(expressions.pop().unwrap())
        } else {
            Ok(Expr::Sequence(expressions))
        }
    }

    fn parse_expression(lexer: &mut ExpressionLexer) -> Result<Expr, String> {
        let left = Self::parse_binary(lexer, 1)?;
        match lexer.peek_token() {
            Token::Operator(op @ (Operator::Assign | Operator::AssignUndefined)) => {
                lexer.next_token();
                if !left.is_assignable() {
                    return Err("Can't assign to that".to_string());
                }
                // Right-associative.
                let right = Self::parse_expression(lexer)?;
                Ok(match op {
                    Operator::Assign => Expr::Assign(Box::new(left), Box::new(right)),
                    _ => Expr::AssignUndefined(Box::new(left), Box::new(right)),
                })
            }
            _ => Ok(left),
        }
    }

    fn binary_priority(op: &Operator) -> Option<u8> {
        match op {
            Operator::Or => Some(1),
            Operator::And => Some(2),
            Operator::Equal | Operator::NotEqual => Some(3),
            Operator::Less
            | Operator::LessEqual
            | Operator::Greater
            | Operator::GreaterEqual => Some(4),
            Operator::Plus | Operator::Minus => Some(5),
            Operator::Multiply | Operator::Divide | Operator::Modulus => Some(6),
            Operator::Not | Operator::Assign | Operator::AssignUndefined => None,
        }
    }

    fn parse_binary(lexer: &mut ExpressionLexer, min_priority: u8) -> Result<Expr, String> {
        let mut left = Self::parse_unary(lexer)?;
        loop {
            let op = match lexer.peek_token() {
                Token::Operator(op) => op,
                _ => break,
            };
            let priority = match Self::binary_priority(&op) {
                Some(p) if p >= min_priority => p,
                _ => break,
            };
            lexer.next_token();
            let right = Self::parse_binary(lexer, priority + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(lexer: &mut ExpressionLexer) -> Result<Expr, String> {
        match lexer.peek_token() {
            Token::Operator(Operator::Not) => {
                lexer.next_token();
                Ok(Expr::Not(Box::new(Self::parse_unary(lexer)?)))
            }
            Token::Operator(Operator::Minus) => {
                lexer.next_token();
                Ok(Expr::Negate(Box::new(Self::parse_unary(lexer)?)))
            }
            _ => Self::parse_postfix(lexer),
        }
    }

    fn parse_postfix(lexer: &mut ExpressionLexer) -> Result<Expr, String> {
        let mut expression = Self::parse_primary(lexer)?;
        loop {
            match lexer.peek_token() {
                Token::Separator('.') => {
                    lexer.next_token();
                    let name = match lexer.next_token() {
                        Token::Identifier(name) => name,
                        t => return Err(format!("No field/method on right side of '.': {}", t)),
                    };
                    if lexer.peek_token() == Token::Bracket('(') {
                        lexer.next_token();
                        // Member call sugar: a.f(x) == f(a, x)
                        let mut arguments = vec![expression];
                        arguments.extend(Self::parse_argument_list(lexer, ')')?);
                        expression = Expr::Call(name, arguments);
                    } else {
                        expression = Expr::Member(Box::new(expression), name);
                    }
                }
                Token::Bracket('[') => {
                    lexer.next_token();
                    let index = Self::parse_expression(lexer)?;
                    Self::expect_bracket(lexer, ']')?;
                    expression = Expr::Index(Box::new(expression), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expression)
    }

    fn parse_primary(lexer: &mut ExpressionLexer) -> Result<Expr, String> {
        match lexer.next_token() {
            Token::Number(NumericToken::Integer(i)) => Ok(Expr::Constant(Data::Integer(i))),
            Token::Number(NumericToken::Double(d)) => Ok(Expr::Constant(Data::Double(d))),
            Token::TString(s) => Ok(Expr::Constant(Data::String(s))),
            Token::Boolean(b) => Ok(Expr::Constant(Data::Boolean(b))),
            Token::Null() => Ok(Expr::Constant(Data::Null())),
            Token::Undefined() => Ok(Expr::Constant(Data::None())),
            Token::Identifier(id) => {
                if lexer.peek_token() == Token::Bracket('(') {
                    lexer.next_token();
                    Ok(Expr::Call(id, Self::parse_argument_list(lexer, ')')?))
                } else {
                    Ok(Expr::Variable(id))
                }
            }
            Token::Bracket('(') => {
                let inner = Self::parse_expression(lexer)?;
                Self::expect_bracket(lexer, ')')?;
                Ok(inner)
            }
            Token::Bracket('[') => Ok(Expr::Array(Self::parse_argument_list(lexer, ']')?)),
            Token::Bracket('{') => Ok(Expr::Map(Self::parse_member_list(lexer)?)),
            Token::Error(err) => Err(err),
            Token::EOE => Err("Unexpected end of expression".to_string()),
            t => Err(format!("Unexpected '{}'", t)),
        }
    }

    /// Parse an argument list, stops at the matching stop char.
    fn parse_argument_list(lexer: &mut ExpressionLexer, stop: char) -> Result<Vec<Expr>, String> {
        let mut arguments = Vec::new();
        if lexer.peek_token() == Token::Bracket(stop) {
            lexer.next_token();
            return Ok(arguments);
        }
        loop {
            arguments.push(Self::parse_expression(lexer)?);
            match lexer.next_token() {
                Token::Separator(',') => {}
                Token::Bracket(c) if c == stop => break,
                t => return Err(format!("Missing '{}', found '{}'", stop, t)),
            }
        }
        Ok(arguments)
    }

    /// Parse a member list, stops at the closing brace.
    #[allow(clippy::type_complexity)]
    fn parse_member_list(lexer: &mut ExpressionLexer) -> Result<Vec<(Expr, Expr)>, String> {
        let mut members = Vec::new();
        if lexer.peek_token() == Token::Bracket('}') {
            lexer.next_token();
            return Ok(members);
        }
        loop {
            let key = Self::parse_expression(lexer)?;
            match lexer.next_token() {
                Token::Separator(':') => {}
                t => return Err(format!("Missing ':' in member list, found '{}'", t)),
            }
            let value = Self::parse_expression(lexer)?;
            members.push((key, value));
            match lexer.next_token() {
                Token::Separator(',') => {}
                Token::Bracket('}') => break,
                t => return Err(format!("Missing '}}', found '{}'", t)),
            }
        }
        Ok(members)
    }

    fn expect_bracket(lexer: &mut ExpressionLexer, expected: char) -> Result<(), String> {
        match lexer.next_token() {
            Token::Bracket(c) if c == expected => Ok(()),
            t => Err(format!("Missing '{}', found '{}'", expected, t)),
        }
    }
}
