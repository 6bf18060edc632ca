//! Recursive-descent parser for condition expressions.
//!
//! Precedence, lowest first:
//!
//! ```text
//! or          :=  and  (("||" | "or") and)*
//! and         :=  cmp  (("&&" | "and") cmp)*
//! cmp         :=  unary (op unary | "in" array | "not" "in" array)?
//! unary       :=  ("!" | "not") unary | primary
//! primary     :=  "(" or ")" | array | literal | path(ref) | exists(...)
//! ```
//!
//! Comparisons do not chain: `a < b < c` is a syntax error.
use crate::ast::{CompareOp, Expr};
use crate::error::ExprError;
use crate::lexer::{lex, Spanned, Token};
use crate::value::Value;

/// Maximum nesting of groups, arrays and unary operators.
pub const MAX_NESTING: usize = 64;

const OPERATOR_WORDS: &[&str] = &["eq", "gt", "gte", "lt", "lte", "in"];

/// Parse condition text into an [`Expr`].
pub fn parse_expression(src: &str) -> Result<Expr, ExprError> {
    let tokens = lex(src)?;
    let mut p = Parser::new(&tokens, src);
    if p.peek() == &Token::Eof {
        return Err(p.err("expression is empty"));
    }
    let expr = p.parse_or()?;
    if p.peek() != &Token::Eof {
        let found = p.peek().describe();
        return Err(p.err(format!("unexpected {found} after complete expression")));
    }
    Ok(expr)
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], src: &'a str) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            src,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn err(&self, msg: impl Into<String>) -> ExprError {
        let cur = self.cur();
        ExprError::new(msg, cur.offset, cur.len, self.src)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Token::Ident(x) if x == w)
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!(
                "expected {}, found {}",
                token.describe(),
                self.peek().describe()
            )))
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.err(format!(
                "expression nests too deeply (limit {MAX_NESTING})"
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // -- Logical ------------------------------------------------

    // Chains are collected into one flat node, so `a && b && ... && z`
    // costs no nesting depth however long it is.

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let first = self.parse_and()?;
        if !self.at_or() {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.at_or() {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(Expr::Or(terms))
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let first = self.parse_comparison()?;
        if !self.at_and() {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.at_and() {
            self.advance();
            terms.push(self.parse_comparison()?);
        }
        Ok(Expr::And(terms))
    }

    fn at_or(&self) -> bool {
        self.peek() == &Token::OrOr || self.is_word("or")
    }

    fn at_and(&self) -> bool {
        self.peek() == &Token::AndAnd || self.is_word("and")
    }

    // -- Comparison ---------------------------------------------

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_unary()?;

        if self.is_word("in") {
            self.advance();
            let haystack = self.parse_in_operand()?;
            return self.no_chain(Expr::In {
                needle: Box::new(left),
                haystack,
            });
        }
        if self.is_word("not") {
            match self.peek_at(1) {
                Token::Ident(w) if w == "eq" => {
                    self.advance();
                    self.advance();
                    let right = self.parse_unary()?;
                    return self.no_chain(compare(CompareOp::Neq, left, right));
                }
                Token::Ident(w) if w == "in" => {
                    self.advance();
                    self.advance();
                    let haystack = self.parse_in_operand()?;
                    return self.no_chain(Expr::Not(Box::new(Expr::In {
                        needle: Box::new(left),
                        haystack,
                    })));
                }
                _ => {}
            }
        }

        let op = match self.peek() {
            Token::EqEq => Some(CompareOp::Eq),
            Token::NotEq => Some(CompareOp::Neq),
            Token::Gt => Some(CompareOp::Gt),
            Token::Gte => Some(CompareOp::Gte),
            Token::Lt => Some(CompareOp::Lt),
            Token::Lte => Some(CompareOp::Lte),
            Token::Ident(w) => match w.as_str() {
                "eq" => Some(CompareOp::Eq),
                "gt" => Some(CompareOp::Gt),
                "gte" => Some(CompareOp::Gte),
                "lt" => Some(CompareOp::Lt),
                "lte" => Some(CompareOp::Lte),
                "and" | "or" => None,
                other => return Err(self.unknown_operator(other)),
            },
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_unary()?;
        self.no_chain(compare(op, left, right))
    }

    fn parse_in_operand(&mut self) -> Result<Vec<Expr>, ExprError> {
        if self.peek() != &Token::LBracket {
            return Err(self.err(format!(
                "right side of 'in' must be an array literal like ['a', 'b'], found {}",
                self.peek().describe()
            )));
        }
        match self.parse_primary()? {
            Expr::Array(items) => Ok(items),
            _ => Err(self.err("right side of 'in' must be an array literal")),
        }
    }

    fn no_chain(&self, expr: Expr) -> Result<Expr, ExprError> {
        let chained = matches!(
            self.peek(),
            Token::EqEq | Token::NotEq | Token::Gt | Token::Gte | Token::Lt | Token::Lte
        ) || matches!(self.peek(), Token::Ident(w) if OPERATOR_WORDS.contains(&w.as_str()));
        if chained {
            return Err(self.err(
                "comparisons cannot be chained; combine them with '&&' or 'and'",
            ));
        }
        Ok(expr)
    }

    fn unknown_operator(&self, word: &str) -> ExprError {
        let hint = match word {
            "is" | "equals" => Some("Did you mean 'eq' or '=='?".to_string()),
            "neq" => Some("Did you mean 'not eq' or '!='?".to_string()),
            _ => OPERATOR_WORDS
                .iter()
                .map(|op| (levenshtein(word, op), *op))
                .filter(|(d, _)| *d <= 2)
                .min_by_key(|(d, _)| *d)
                .map(|(_, op)| format!("Did you mean '{op}'?")),
        };
        match hint {
            Some(hint) => self.err(format!("unknown operator '{word}'. {hint}")),
            None => self.err(format!("unknown operator '{word}'")),
        }
    }

    // -- Unary / primary ----------------------------------------

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let is_not = self.peek() == &Token::Bang
            || (self.is_word("not") && !matches!(self.peek_at(1), Token::Ident(w) if w == "eq" || w == "in"));
        if is_not {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().clone() {
            Token::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                self.enter()?;
                let mut items = Vec::new();
                if self.peek() != &Token::RBracket {
                    loop {
                        items.push(self.parse_or()?);
                        if self.peek() == &Token::Comma {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.leave();
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Number(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Ident(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(true)))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(false)))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Null))
                }
                "path" if self.peek_at(1) == &Token::LParen => self.parse_path_call(),
                "exists" if self.peek_at(1) == &Token::LParen => self.parse_exists(),
                _ => Err(self.err(format!(
                    "unexpected identifier '{w}'; document references must be wrapped as path({w})"
                ))),
            },
            Token::Eof => Err(self.err("unexpected end of expression")),
            other => Err(self.err(format!("unexpected {}", other.describe()))),
        }
    }

    fn parse_path_call(&mut self) -> Result<Expr, ExprError> {
        self.advance(); // path
        self.advance(); // (
        let reference = match self.peek().clone() {
            Token::Ident(r) | Token::Str(r) => r,
            other => {
                return Err(self.err(format!(
                    "path(...) expects a document reference, found {}",
                    other.describe()
                )))
            }
        };
        if reference.trim().is_empty() {
            return Err(self.err("path(...) reference is empty"));
        }
        self.advance();
        self.expect(Token::RParen)?;
        Ok(Expr::Path(reference))
    }

    fn parse_exists(&mut self) -> Result<Expr, ExprError> {
        self.advance(); // exists
        self.advance(); // (
        self.enter()?;
        // exists(a.b) is shorthand for exists(path(a.b))
        let shorthand = match (self.peek(), self.peek_at(1)) {
            (Token::Ident(w), Token::RParen)
                if !matches!(w.as_str(), "true" | "false" | "null") =>
            {
                Some(w.clone())
            }
            _ => None,
        };
        let inner = match shorthand {
            Some(reference) => {
                self.advance();
                Expr::Path(reference)
            }
            None => self.parse_or()?,
        };
        self.leave();
        self.expect(Token::RParen)?;
        Ok(Expr::Exists(Box::new(inner)))
    }
}

fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
    Expr::Compare {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Edit distance between two short words.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Box<Expr> {
        Box::new(Expr::Path(p.into()))
    }

    fn lit(v: impl Into<Value>) -> Box<Expr> {
        Box::new(Expr::Literal(v.into()))
    }

    #[test]
    fn word_and_symbol_operators_are_equivalent() {
        let a = parse_expression("path(age) gte 18 and path(country) eq 'NL'").unwrap();
        let b = parse_expression("path(age) >= 18 && path(country) == 'NL'").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = parse_expression("path(a) || path(b) && path(c)").unwrap();
        assert_eq!(
            e,
            Expr::Or(vec![*path("a"), Expr::And(vec![*path("b"), *path("c")])])
        );
    }

    #[test]
    fn not_eq_and_not_in() {
        assert_eq!(
            parse_expression("path(a) not eq 1").unwrap(),
            Expr::Compare {
                op: CompareOp::Neq,
                left: path("a"),
                right: lit(1.0)
            }
        );
        assert_eq!(
            parse_expression("path(a) not in ['x']").unwrap(),
            Expr::Not(Box::new(Expr::In {
                needle: path("a"),
                haystack: vec![Expr::Literal("x".into())]
            }))
        );
    }

    #[test]
    fn unary_not_binds_to_primary() {
        let e = parse_expression("!exists(user.email)").unwrap();
        assert_eq!(e, Expr::Not(Box::new(Expr::Exists(path("user.email")))));
    }

    #[test]
    fn in_without_space_before_array() {
        assert_eq!(
            parse_expression("path(a) in['x']").unwrap(),
            parse_expression("path(a) in ['x']").unwrap()
        );
    }

    #[test]
    fn in_requires_array_literal() {
        let err = parse_expression("path(a) in path(b)").unwrap_err();
        assert!(err.message.contains("array literal"), "{}", err.message);
        assert_eq!(err.offset, 11);
    }

    #[test]
    fn equals_gets_canned_hint() {
        let err = parse_expression("path(name) equals 'Ada'").unwrap_err();
        assert!(err.to_string().contains("Did you mean 'eq' or '=='?"));
        assert_eq!(err.offset, 11);
        assert_eq!(err.length, 6);
    }

    #[test]
    fn neq_gets_canned_hint() {
        let err = parse_expression("path(a) neq 1").unwrap_err();
        assert!(err.message.contains("Did you mean 'not eq' or '!='?"));
    }

    #[test]
    fn typo_gets_levenshtein_suggestion() {
        let err = parse_expression("path(a) gtee 1").unwrap_err();
        assert!(err.message.contains("Did you mean 'gte'?"), "{}", err.message);
        let err = parse_expression("path(a) banana 1").unwrap_err();
        assert!(!err.message.contains("Did you mean"));
    }

    #[test]
    fn chained_comparison_is_rejected() {
        let err = parse_expression("1 < path(a) < 3").unwrap_err();
        assert!(err.message.contains("chained"));
    }

    #[test]
    fn bare_identifier_is_rejected() {
        let err = parse_expression("name == 'Ada'").unwrap_err();
        assert!(err.message.contains("path(name)"));
    }

    #[test]
    fn empty_and_trailing_input() {
        assert!(parse_expression("   ").is_err());
        assert!(parse_expression("true false").is_err());
        assert!(parse_expression("(true").is_err());
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}true{}", "(".repeat(70), ")".repeat(70));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.message.contains("nests too deeply"));
        let ok = format!("{}true{}", "(".repeat(10), ")".repeat(10));
        assert!(parse_expression(&ok).is_ok());
    }

    #[test]
    fn long_chains_stay_flat() {
        let chain = vec!["true"; 200_000].join(" && ");
        match parse_expression(&chain).unwrap() {
            Expr::And(terms) => assert_eq!(terms.len(), 200_000),
            other => panic!("expected a flat and-chain, got {other:?}"),
        }
        let mixed = parse_expression("path(a) or path(b) or path(c) and path(d)").unwrap();
        match mixed {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 3);
                assert!(matches!(&terms[2], Expr::And(inner) if inner.len() == 2));
            }
            other => panic!("expected a flat or-chain, got {other:?}"),
        }
    }

    #[test]
    fn deep_not_chain_is_rejected() {
        let err = parse_expression(&format!("{}true", "!".repeat(100_000))).unwrap_err();
        assert!(err.message.contains("nests too deeply"));
    }

    #[test]
    fn quoted_path_reference() {
        assert_eq!(
            parse_expression("path('a b')").unwrap(),
            Expr::Path("a b".into())
        );
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("eq", "eq"), 0);
        assert_eq!(levenshtein("gtee", "gte"), 1);
        assert_eq!(levenshtein("", "in"), 2);
    }
}
