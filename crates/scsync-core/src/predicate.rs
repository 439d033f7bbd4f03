use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{Error, Result};
use crate::types::{RowMap, Value};

/// A parsed row filter, e.g. `complete = false AND bidCount > 0`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always true.
    True,
    /// Always false.
    False,
    /// Column compared against a literal.
    Compare(String, CompareOp, Literal),
    /// Column is null.
    IsNull(String),
    /// Column is not null.
    IsNotNull(String),
    /// Logical AND of predicates.
    And(Box<Predicate>, Box<Predicate>),
    /// Logical OR of predicates.
    Or(Box<Predicate>, Box<Predicate>),
    /// Logical NOT of a predicate.
    Not(Box<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A literal value in a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

impl Literal {
    /// Order a cell value against this literal. `None` when the two are not
    /// comparable (different types, or NULL on either side).
    fn compare(&self, value: &Value) -> Option<Ordering> {
        match (value, self) {
            (Value::Int(v), Literal::Int(l)) => Some(v.cmp(l)),
            // booleans are stored as 0/1
            (Value::Int(v), Literal::Bool(b)) => Some(v.cmp(&i64::from(*b))),
            (Value::Text(v), Literal::String(l)) => Some(v.as_str().cmp(l.as_str())),
            _ => None,
        }
    }
}

impl CompareOp {
    fn holds(self, value: &Value, literal: &Literal) -> bool {
        if let Literal::Null = literal {
            return match self {
                CompareOp::Eq => value.is_null(),
                CompareOp::NotEq => !value.is_null(),
                _ => false,
            };
        }

        match (self, literal.compare(value)) {
            (CompareOp::NotEq, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::NotEq, Some(o)) => o != Ordering::Equal,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

impl Predicate {
    /// Evaluate the predicate against a row. Missing columns read as NULL.
    pub fn evaluate(&self, row: &RowMap) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Compare(col, op, lit) => op.holds(row.get(col).unwrap_or(&Value::Null), lit),
            Predicate::IsNull(col) => row.get(col).map(|v| v.is_null()).unwrap_or(true),
            Predicate::IsNotNull(col) => row.get(col).map(|v| !v.is_null()).unwrap_or(false),
            Predicate::And(a, b) => a.evaluate(row) && b.evaluate(row),
            Predicate::Or(a, b) => a.evaluate(row) || b.evaluate(row),
            Predicate::Not(p) => !p.evaluate(row),
        }
    }

    /// Parse a predicate from a DSL string.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
        };
        let predicate = parser.disjunction()?;
        match parser.peek() {
            Token::Eof => Ok(predicate),
            trailing => Err(Error::PredicateError(format!(
                "unexpected trailing token: {:?}",
                trailing
            ))),
        }
    }

    /// Column names referenced by the predicate.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::Compare(col, _, _) | Predicate::IsNull(col) | Predicate::IsNotNull(col) => {
                out.push(col)
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Predicate::Not(p) => p.collect_columns(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Int(i64),
    True,
    False,
    Null,
    Op(CompareOp),
    Is,
    Not,
    And,
    Or,
    LParen,
    RParen,
    Eof,
}

type Chars<'a> = Peekable<CharIndices<'a>>;

/// Consume characters while `accept` holds; returns the byte offset after them.
fn scan(chars: &mut Chars<'_>, input_len: usize, accept: impl Fn(char) -> bool) -> usize {
    while let Some(&(offset, c)) = chars.peek() {
        if !accept(c) {
            return offset;
        }
        chars.next();
    }
    input_len
}

/// Split a filter into tokens. The result always ends with `Token::Eof`.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' => Token::Op(CompareOp::Eq),
            '!' | '<' | '>' => {
                let next = chars.peek().map(|&(_, n)| n);
                let (token, two_chars) = match (c, next) {
                    ('!', Some('=')) | ('<', Some('>')) => (Token::Op(CompareOp::NotEq), true),
                    ('!', _) => (Token::Not, false),
                    ('<', Some('=')) => (Token::Op(CompareOp::Le), true),
                    ('<', _) => (Token::Op(CompareOp::Lt), false),
                    (_, Some('=')) => (Token::Op(CompareOp::Ge), true),
                    _ => (Token::Op(CompareOp::Gt), false),
                };
                if two_chars {
                    chars.next();
                }
                token
            }
            '\'' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => break Token::String(text),
                        Some((_, ch)) => text.push(ch),
                        None => {
                            return Err(Error::PredicateError(format!(
                                "unterminated string starting at offset {}",
                                start
                            )))
                        }
                    }
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let end = scan(&mut chars, input.len(), |ch| ch.is_ascii_digit());
                let digits = &input[start..end];
                let value = digits
                    .parse()
                    .map_err(|_| Error::PredicateError(format!("invalid number '{}'", digits)))?;
                Token::Int(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = scan(&mut chars, input.len(), |ch| ch.is_alphanumeric() || ch == '_');
                let word = &input[start..end];
                match word.to_ascii_uppercase().as_str() {
                    "TRUE" => Token::True,
                    "FALSE" => Token::False,
                    "NULL" => Token::Null,
                    "IS" => Token::Is,
                    "NOT" => Token::Not,
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    _ => Token::Ident(word.to_string()),
                }
            }
            other => {
                return Err(Error::PredicateError(format!(
                    "unexpected character '{}' at offset {}",
                    other, start
                )))
            }
        };
        tokens.push(token);
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Recursive descent over a token list. Precedence, loosest first:
/// OR, AND, NOT, then comparisons and parentheses.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    /// Take the current token. The parser never moves past `Eof`.
    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.bump();
            true
        } else {
            false
        }
    }

    /// `operand (sep operand)*`, folded to the left with `join`.
    fn chain(
        &mut self,
        sep: Token,
        operand: fn(&mut Self) -> Result<Predicate>,
        join: fn(Box<Predicate>, Box<Predicate>) -> Predicate,
    ) -> Result<Predicate> {
        let mut acc = operand(self)?;
        while self.eat(&sep) {
            let rhs = operand(self)?;
            acc = join(Box::new(acc), Box::new(rhs));
        }
        Ok(acc)
    }

    fn disjunction(&mut self) -> Result<Predicate> {
        self.chain(Token::Or, Self::conjunction, Predicate::Or)
    }

    fn conjunction(&mut self) -> Result<Predicate> {
        self.chain(Token::And, Self::negation, Predicate::And)
    }

    fn negation(&mut self) -> Result<Predicate> {
        if self.eat(&Token::Not) {
            Ok(Predicate::Not(Box::new(self.negation()?)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Predicate> {
        match self.bump() {
            Token::LParen => {
                let inner = self.disjunction()?;
                if !self.eat(&Token::RParen) {
                    return Err(Error::PredicateError("expected ')'".into()));
                }
                Ok(inner)
            }
            Token::True => Ok(Predicate::True),
            Token::False => Ok(Predicate::False),
            Token::Ident(column) => self.comparison(column),
            other => Err(Error::PredicateError(format!(
                "expected a column or '(', got {:?}",
                other
            ))),
        }
    }

    fn comparison(&mut self, column: String) -> Result<Predicate> {
        match self.bump() {
            Token::Op(op) => Ok(Predicate::Compare(column, op, self.literal()?)),
            Token::Is => {
                let negated = self.eat(&Token::Not);
                match (self.bump(), negated) {
                    (Token::Null, false) => Ok(Predicate::IsNull(column)),
                    (Token::Null, true) => Ok(Predicate::IsNotNull(column)),
                    (other, _) => Err(Error::PredicateError(format!(
                        "expected NULL after IS, got {:?}",
                        other
                    ))),
                }
            }
            other => Err(Error::PredicateError(format!(
                "expected comparison operator after '{}', got {:?}",
                column, other
            ))),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.bump() {
            Token::Null => Ok(Literal::Null),
            Token::True => Ok(Literal::Bool(true)),
            Token::False => Ok(Literal::Bool(false)),
            Token::Int(i) => Ok(Literal::Int(i)),
            Token::String(s) => Ok(Literal::String(s)),
            other => Err(Error::PredicateError(format!(
                "expected literal, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> RowMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_predicate_true_false() {
        let row = row(&[]);
        assert!(Predicate::True.evaluate(&row));
        assert!(!Predicate::False.evaluate(&row));
    }

    #[test]
    fn test_predicate_eq() {
        let row = row(&[
            ("seller", Value::Text("deto1abc".into())),
            ("bidCount", Value::Int(3)),
        ]);

        assert!(Predicate::parse("seller = 'deto1abc'").unwrap().evaluate(&row));
        assert!(!Predicate::parse("seller = 'other'").unwrap().evaluate(&row));
        assert!(Predicate::parse("bidCount = 3").unwrap().evaluate(&row));
        assert!(Predicate::parse("bidCount <> 4").unwrap().evaluate(&row));
    }

    #[test]
    fn test_predicate_ordering() {
        let row = row(&[("duration", Value::Int(60)), ("startAmount", Value::Int(-5))]);

        assert!(Predicate::parse("duration > 30").unwrap().evaluate(&row));
        assert!(Predicate::parse("duration >= 60").unwrap().evaluate(&row));
        assert!(!Predicate::parse("duration < 60").unwrap().evaluate(&row));
        assert!(Predicate::parse("duration <= 60").unwrap().evaluate(&row));
        assert!(Predicate::parse("startAmount < 0").unwrap().evaluate(&row));
    }

    #[test]
    fn test_predicate_is_null() {
        let row = row(&[
            ("seller", Value::Text("x".into())),
            ("buyer", Value::Null),
        ]);

        assert!(Predicate::parse("buyer IS NULL").unwrap().evaluate(&row));
        assert!(!Predicate::parse("seller IS NULL").unwrap().evaluate(&row));
        assert!(Predicate::parse("seller IS NOT NULL").unwrap().evaluate(&row));
        assert!(Predicate::parse("buyer = NULL").unwrap().evaluate(&row));
    }

    #[test]
    fn test_predicate_bool_matches_integer_storage() {
        let row = row(&[("complete", Value::Int(1))]);

        assert!(Predicate::parse("complete = true").unwrap().evaluate(&row));
        assert!(!Predicate::parse("complete = false").unwrap().evaluate(&row));
        assert!(Predicate::parse("NOT complete = false").unwrap().evaluate(&row));
    }

    #[test]
    fn test_predicate_parentheses() {
        let row = row(&[
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
            ("c", Value::Int(3)),
        ]);

        // Without parens: a=1 OR (b=2 AND c=4)
        let p = Predicate::parse("a = 1 OR b = 2 AND c = 4").unwrap();
        assert!(p.evaluate(&row));

        let p = Predicate::parse("(a = 1 OR b = 2) AND c = 4").unwrap();
        assert!(!p.evaluate(&row));
    }

    #[test]
    fn test_predicate_missing_column() {
        let row = row(&[("a", Value::Int(1))]);

        assert!(Predicate::parse("missing IS NULL").unwrap().evaluate(&row));
        assert!(!Predicate::parse("missing = 1").unwrap().evaluate(&row));
        assert!(Predicate::parse("missing != 1").unwrap().evaluate(&row));
        assert!(!Predicate::parse("missing > 0").unwrap().evaluate(&row));
    }

    #[test]
    fn test_predicate_parse_errors() {
        assert!(Predicate::parse("a =").is_err());
        assert!(Predicate::parse("a IS 5").is_err());
        assert!(Predicate::parse("(a = 1").is_err());
        assert!(Predicate::parse("a = 'open").is_err());
        assert!(Predicate::parse("a = 1 b = 2").is_err());
        assert!(Predicate::parse("a = 1.5").is_err());
        assert!(Predicate::parse("a = -").is_err());
        assert!(Predicate::parse("a IS NOT 3").is_err());
        assert!(Predicate::parse("").is_err());
    }

    #[test]
    fn test_predicate_operator_spellings() {
        let row = row(&[("n", Value::Int(2))]);

        for (input, expected) in [
            ("n != 2", false),
            ("n <> 3", true),
            ("! n = 2", false),
            ("n>=2 and n<=2", true),
            ("n<2 or n>2", false),
            ("not not n = 2", true),
        ] {
            assert_eq!(
                Predicate::parse(input).unwrap().evaluate(&row),
                expected,
                "{input}"
            );
        }
    }

    #[test]
    fn test_predicate_columns() {
        let p = Predicate::parse("a = 1 AND (b IS NULL OR NOT c > 2)").unwrap();
        assert_eq!(p.columns(), vec!["a", "b", "c"]);
    }
}
