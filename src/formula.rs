//! Restricted arithmetic formulas over named component values.
//!
//! The grammar is `+ - * / ( )`, numeric literals, and identifiers naming
//! components. No function calls, no assignment, no comparisons. Unsupported
//! input is rejected by the validation pass with an editor-facing message;
//! evaluation only ever fails on unknown references or division by zero.

use std::collections::HashMap;
use std::fmt;

use crate::error::GradeError;
use crate::model::FormulaExpression;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if seen_dot {
                            return Err(format!(
                                "malformed number at position {}",
                                start + 1
                            ));
                        }
                        seen_dot = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| format!("malformed number '{}'", text))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(format!("unsupported character '{}' at position {}", other, i + 1));
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Ref(String),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(_) | Expr::Ref(_) => 3,
            Expr::Neg(_) => 2,
            Expr::Bin(op, _, _) => op.precedence(),
        }
    }
}

/// Renders the expression back to text, parenthesizing only where needed, so
/// error messages can name the exact offending sub-expression.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Ref(name) => write!(f, "{}", name),
            Expr::Neg(inner) => {
                if inner.precedence() < self.precedence() {
                    write!(f, "-({})", inner)
                } else {
                    write!(f, "-{}", inner)
                }
            }
            Expr::Bin(op, lhs, rhs) => {
                if lhs.precedence() < op.precedence() {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                // Right side needs parens at equal precedence too: a - (b - c).
                if rhs.precedence() <= op.precedence() {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => Ok(Expr::Ref(name)),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::RParen) => Err("unexpected ')'".to_string()),
            Some(t) => Err(format!("unexpected token {:?}", t)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn parse(text: &str) -> Result<Expr, String> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected trailing token {:?}",
            parser.tokens[parser.pos]
        ));
    }
    Ok(expr)
}

fn collect_references(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Num(_) => {}
        Expr::Ref(name) => {
            if !out.iter().any(|n| n == name) {
                out.push(name.clone());
            }
        }
        Expr::Neg(inner) => collect_references(inner, out),
        Expr::Bin(_, lhs, rhs) => {
            collect_references(lhs, out);
            collect_references(rhs, out);
        }
    }
}

/// Validation pass, run when the administrator saves a formula and again
/// whenever referenced components change. Unsupported tokens, syntax errors
/// and unknown names all surface here as a message, never as an evaluation
/// fault.
pub fn validate<'a, I>(expression: &str, known_names: I) -> FormulaExpression
where
    I: IntoIterator<Item = &'a str>,
{
    let expr = match parse(expression) {
        Ok(e) => e,
        Err(message) => {
            return FormulaExpression {
                expression: expression.to_string(),
                references: Vec::new(),
                valid: false,
                message: Some(message),
            };
        }
    };
    let mut references = Vec::new();
    collect_references(&expr, &mut references);

    let known: Vec<&str> = known_names.into_iter().collect();
    let unknown: Vec<&String> = references
        .iter()
        .filter(|name| !known.iter().any(|k| *k == name.as_str()))
        .collect();
    if let Some(first) = unknown.first() {
        return FormulaExpression {
            expression: expression.to_string(),
            references: references.clone(),
            valid: false,
            message: Some(format!("unknown component '{}'", first)),
        };
    }

    FormulaExpression {
        expression: expression.to_string(),
        references,
        valid: true,
        message: None,
    }
}

fn eval(expr: &Expr, values: &HashMap<String, f64>) -> Result<f64, GradeError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Ref(name) => values
            .get(name)
            .copied()
            .ok_or_else(|| GradeError::UnknownComponent { name: name.clone() }),
        Expr::Neg(inner) => Ok(-eval(inner, values)?),
        Expr::Bin(op, lhs, rhs) => {
            let a = eval(lhs, values)?;
            let b = eval(rhs, values)?;
            match op {
                BinOp::Add => Ok(a + b),
                BinOp::Sub => Ok(a - b),
                BinOp::Mul => Ok(a * b),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(GradeError::DivisionByZero {
                            expression: expr.to_string(),
                        })
                    } else {
                        Ok(a / b)
                    }
                }
            }
        }
    }
}

/// Evaluates a formula against resolved component values. Pure and
/// deterministic: identical inputs always produce identical output, with
/// standard IEEE-754 double semantics and no mid-expression rounding.
///
/// A formula that never passed validation surfaces here as a fatal
/// `InvalidFormula` for the owning component; validated formulas only ever
/// fail on unknown references or division by zero.
pub fn evaluate(
    component_id: &str,
    expression: &str,
    values: &HashMap<String, f64>,
) -> Result<f64, GradeError> {
    let expr = parse(expression).map_err(|message| GradeError::InvalidFormula {
        component_id: component_id.to_string(),
        message,
    })?;
    eval(&expr, values)
}
