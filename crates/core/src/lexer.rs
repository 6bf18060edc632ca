use crate::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifiers, keywords and unquoted path text -- distinguished in the parser
    Ident(String),
    /// Single-quoted string literal (content without quotes, escapes resolved)
    Str(String),
    Number(f64),
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    // Comparison operators
    EqEq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    // Logical operators
    AndAnd,
    OrOr,
    Bang,
    // End of input
    Eof,
}

impl Token {
    /// Text used when quoting the token back in a diagnostic.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{s}'"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Number(n) => format!("number {n}"),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Comma => "','".into(),
            Token::EqEq => "'=='".into(),
            Token::NotEq => "'!='".into(),
            Token::Gt => "'>'".into(),
            Token::Gte => "'>='".into(),
            Token::Lt => "'<'".into(),
            Token::Lte => "'<='".into(),
            Token::AndAnd => "'&&'".into(),
            Token::OrOr => "'||'".into(),
            Token::Bang => "'!'".into(),
            Token::Eof => "end of expression".into(),
        }
    }
}

/// A token with its character offset and length in the source text.
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
    pub len: usize,
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;

        // String literal
        if c == '\'' {
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(ExprError::new(
                        "unterminated string literal",
                        start,
                        pos - start,
                        src,
                    ));
                }
                let sc = chars[pos];
                if sc == '\'' {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(ExprError::new(
                            "unterminated escape in string",
                            start,
                            pos - start,
                            src,
                        ));
                    }
                    match chars[pos] {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        other => s.push(other),
                    }
                    pos += 1;
                    continue;
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset: start,
                len: pos - start,
            });
            continue;
        }

        // Number literal, optionally negative
        let negative = c == '-' && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit());
        if c.is_ascii_digit() || negative {
            if negative {
                pos += 1;
            }
            let mut seen_dot = false;
            while pos < chars.len() {
                let d = chars[pos];
                if d.is_ascii_digit() {
                    pos += 1;
                } else if d == '.'
                    && !seen_dot
                    && chars.get(pos + 1).is_some_and(|n| n.is_ascii_digit())
                {
                    seen_dot = true;
                    pos += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let n = text.parse::<f64>().map_err(|_| {
                ExprError::new(format!("invalid number '{text}'"), start, pos - start, src)
            })?;
            tokens.push(Spanned {
                token: Token::Number(n),
                offset: start,
                len: pos - start,
            });
            continue;
        }

        // Identifier / keyword / path text
        if c.is_alphabetic() || c == '_' || c == '$' {
            while pos < chars.len() {
                let d = chars[pos];
                // `in[...]` is the operator followed by its array literal.
                if d == '[' && chars[start..pos] == ['i', 'n'] {
                    break;
                }
                if d.is_alphanumeric() || matches!(d, '_' | '$' | '.' | '[' | ']') {
                    pos += 1;
                } else {
                    break;
                }
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Ident(word),
                offset: start,
                len: pos - start,
            });
            continue;
        }

        // Two-character operators first
        let next = chars.get(pos + 1).copied();
        let two = match (c, next) {
            ('=', Some('=')) => Some(Token::EqEq),
            ('!', Some('=')) => Some(Token::NotEq),
            ('>', Some('=')) => Some(Token::Gte),
            ('<', Some('=')) => Some(Token::Lte),
            ('&', Some('&')) => Some(Token::AndAnd),
            ('|', Some('|')) => Some(Token::OrOr),
            _ => None,
        };
        if let Some(token) = two {
            tokens.push(Spanned {
                token,
                offset: start,
                len: 2,
            });
            pos += 2;
            continue;
        }

        let single = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '>' => Token::Gt,
            '<' => Token::Lt,
            '!' => Token::Bang,
            '=' => {
                return Err(ExprError::new(
                    "unexpected '='. Use '==' or 'eq' for equality",
                    start,
                    1,
                    src,
                ))
            }
            '&' => {
                return Err(ExprError::new(
                    "unexpected '&'. Use '&&' or 'and'",
                    start,
                    1,
                    src,
                ))
            }
            '|' => {
                return Err(ExprError::new(
                    "unexpected '|'. Use '||' or 'or'",
                    start,
                    1,
                    src,
                ))
            }
            other => {
                return Err(ExprError::new(
                    format!("unexpected character '{other}'"),
                    start,
                    1,
                    src,
                ))
            }
        };
        tokens.push(Spanned {
            token: single,
            offset: start,
            len: 1,
        });
        pos += 1;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
        len: 1,
    });
    Ok(tokens)
}
