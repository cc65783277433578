//! Boolean query grammar and evaluator.
//!
//! ```text
//! Or      := And ( 'OR' And )*
//! And     := Not ( 'AND' Not )*
//! Not     := 'NOT' Primary | Primary
//! Primary := '(' Or ')' | TERM
//! ```
//!
//! Keywords are case-insensitive; every other token is a lower-cased term.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Or,
    Not,
    LParen,
    RParen,
    Term(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    Empty,
    Term(String),
    And(Box<QueryExpr>, Box<QueryExpr>),
    Or(Box<QueryExpr>, Box<QueryExpr>),
    Not(Box<QueryExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("missing closing parenthesis")]
    MissingCloseParen,
    #[error("unexpected token {0:?} at position {1}")]
    UnexpectedToken(String, usize),
    #[error("trailing input starting at token {0}")]
    TrailingTokens(usize),
}

/// A parse that failed, with the raw whitespace split the caller should fall back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub error: ParseError,
    pub fallback_terms: Vec<String>,
}

pub fn tokenize(query: &str) -> Vec<Token> {
    let spaced = query.replace('(', " ( ").replace(')', " ) ");
    spaced
        .split_whitespace()
        .map(|raw| match raw.to_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "(" => Token::LParen,
            ")" => Token::RParen,
            _ => Token::Term(raw.to_lowercase()),
        })
        .collect()
}

pub fn parse(query: &str) -> Result<QueryExpr, ParseError> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Ok(QueryExpr::Empty);
    }
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos < tokens.len() {
        return Err(ParseError::TrailingTokens(parser.pos));
    }
    Ok(expr)
}

/// Parses `query`, or reports the error alongside the raw whitespace-split terms.
pub fn parse_or_fallback(query: &str) -> Result<QueryExpr, ParseFailure> {
    parse(query).map_err(|error| ParseFailure {
        error,
        fallback_terms: query.split_whitespace().map(str::to_string).collect(),
    })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn parse_or(&mut self) -> Result<QueryExpr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = QueryExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<QueryExpr, ParseError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = QueryExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<QueryExpr, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let operand = self.parse_primary()?;
            return Ok(QueryExpr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryExpr, ParseError> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(ParseError::MissingCloseParen);
                }
                self.pos += 1;
                Ok(expr)
            }
            Some(Token::Term(term)) => {
                self.pos += 1;
                Ok(QueryExpr::Term(term.clone()))
            }
            Some(other) => Err(ParseError::UnexpectedToken(format!("{other:?}"), self.pos)),
        }
    }
}

impl QueryExpr {
    /// Distinct terms appearing anywhere in the tree.
    pub fn terms(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            QueryExpr::Empty => {}
            QueryExpr::Term(t) => {
                out.insert(t.as_str());
            }
            QueryExpr::And(l, r) | QueryExpr::Or(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
            QueryExpr::Not(operand) => operand.collect_terms(out),
        }
    }
}

/// Evaluates `expr` against per-term match sets.
///
/// NOT is taken relative to the union of all sets in `term_matches`, not the
/// whole collection.
pub fn evaluate<T>(expr: &QueryExpr, term_matches: &HashMap<String, HashSet<T>>) -> HashSet<T>
where
    T: Eq + Hash + Clone,
{
    match expr {
        QueryExpr::Empty => HashSet::new(),
        QueryExpr::Term(term) => term_matches.get(term).cloned().unwrap_or_default(),
        QueryExpr::And(l, r) => {
            let left = evaluate(l, term_matches);
            let right = evaluate(r, term_matches);
            left.intersection(&right).cloned().collect()
        }
        QueryExpr::Or(l, r) => {
            let mut left = evaluate(l, term_matches);
            left.extend(evaluate(r, term_matches));
            left
        }
        QueryExpr::Not(operand) => {
            let excluded = evaluate(operand, term_matches);
            term_matches
                .values()
                .flatten()
                .filter(|id| !excluded.contains(*id))
                .cloned()
                .collect()
        }
    }
}
