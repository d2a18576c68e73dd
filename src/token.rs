//! Lexer for the selection language.
//!
//! Word classification (keyword vs macro vs bare string) happens in the
//! parser against the assembled grammar; the lexer only distinguishes token
//! shapes so the same token stream works for any registry.

use crate::error::{ParseError, SelectError};

/// A token with its byte span in the input string.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: (usize, usize),
}

/// Token types for the selection language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Colon,
    // Arithmetic
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    // Comparison
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    RegexEq,
    // Logical (symbolic spellings; word spellings stay `Word`)
    AndOp,
    OrOp,
    NotOp,
    // Literals
    Int(i64),
    Float(f64),
    Word(String),
    Var(String),
    AtMacro(String),
    DoubleQuoted(String),
    SingleQuoted(String),
    Raw(String),
    Eof,
}

impl Token {
    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            Token::LParen => "`(`".into(),
            Token::RParen => "`)`".into(),
            Token::Colon => "`:`".into(),
            Token::Plus => "`+`".into(),
            Token::Minus => "`-`".into(),
            Token::Star => "`*`".into(),
            Token::StarStar => "`**`".into(),
            Token::Slash => "`/`".into(),
            Token::SlashSlash => "`//`".into(),
            Token::Percent => "`%`".into(),
            Token::Lt => "`<`".into(),
            Token::Le => "`<=`".into(),
            Token::Gt => "`>`".into(),
            Token::Ge => "`>=`".into(),
            Token::Eq => "`==`".into(),
            Token::Ne => "`!=`".into(),
            Token::RegexEq => "`=~`".into(),
            Token::AndOp => "`&&`".into(),
            Token::OrOp => "`||`".into(),
            Token::NotOp => "`!`".into(),
            Token::Int(v) => format!("`{v}`"),
            Token::Float(v) => format!("`{v}`"),
            Token::Word(w) => format!("`{w}`"),
            Token::Var(v) => format!("`${v}`"),
            Token::AtMacro(m) => format!("`@{m}`"),
            Token::DoubleQuoted(s) => format!("`\"{s}\"`"),
            Token::SingleQuoted(s) => format!("`'{s}'`"),
            Token::Raw(s) => format!("`` `{s}` ``"),
            Token::Eof => "end of query".into(),
        }
    }
}

/// Lexer that tokenizes a selection expression string.
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn err(&self, expected: impl Into<String>, got: impl Into<String>, start: usize) -> SelectError {
        ParseError::new(expected, got, (start, self.pos.max(start + 1)), self.input).into()
    }

    fn peek(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, SelectError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            if self.pos >= self.bytes.len() {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span: (start, start),
                });
                break;
            }
            let ch = self.bytes[self.pos];
            let token = match ch {
                b'(' => {
                    self.pos += 1;
                    Token::LParen
                }
                b')' => {
                    self.pos += 1;
                    Token::RParen
                }
                b':' => {
                    self.pos += 1;
                    Token::Colon
                }
                b'+' => {
                    self.pos += 1;
                    Token::Plus
                }
                b'-' => {
                    self.pos += 1;
                    Token::Minus
                }
                b'%' => {
                    self.pos += 1;
                    Token::Percent
                }
                b'*' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'*') {
                        self.pos += 1;
                        Token::StarStar
                    } else {
                        Token::Star
                    }
                }
                b'/' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'/') {
                        self.pos += 1;
                        Token::SlashSlash
                    } else {
                        Token::Slash
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'=') {
                        self.pos += 1;
                        Token::Le
                    } else {
                        Token::Lt
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'=') {
                        self.pos += 1;
                        Token::Ge
                    } else {
                        Token::Gt
                    }
                }
                b'=' => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some(b'~') => {
                            self.pos += 1;
                            Token::RegexEq
                        }
                        Some(b'=') => {
                            self.pos += 1;
                            Token::Eq
                        }
                        _ => Token::Eq,
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'=') {
                        self.pos += 1;
                        Token::Ne
                    } else {
                        Token::NotOp
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'&') {
                        self.pos += 1;
                    }
                    Token::AndOp
                }
                b'|' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'|') {
                        self.pos += 1;
                    }
                    Token::OrOp
                }
                b'$' => {
                    self.pos += 1;
                    let name = self.lex_word_text();
                    if name.is_empty() {
                        return Err(self.err("a variable name after `$`", "nothing", start));
                    }
                    Token::Var(name)
                }
                b'@' => {
                    self.pos += 1;
                    let name = self.lex_word_text();
                    if name.is_empty() {
                        return Err(self.err("a macro name after `@`", "nothing", start));
                    }
                    Token::AtMacro(name)
                }
                b'"' => Token::DoubleQuoted(self.lex_quoted(b'"', start)?),
                b'\'' => Token::SingleQuoted(self.lex_quoted(b'\'', start)?),
                b'`' => Token::Raw(self.lex_raw(start)?),
                b'0'..=b'9' => self.lex_number(start)?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => Token::Word(self.lex_word_text()),
                _ => {
                    self.pos += 1;
                    return Err(self.err("a token", format!("`{}`", ch as char), start));
                }
            };
            tokens.push(SpannedToken {
                token,
                span: (start, self.pos),
            });
        }
        Ok(tokens)
    }

    /// Words start with a letter or underscore; primes are allowed inside so
    /// atom names like `O5'` stay one token.
    fn lex_word_text(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'\'' && self.pos > start {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, SelectError> {
        let mut is_float = false;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') {
            is_float = true;
            self.pos += 1;
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some(b'e') | Some(b'E')) {
            let mut ahead = 1;
            if matches!(self.peek(1), Some(b'+') | Some(b'-')) {
                ahead = 2;
            }
            if self.peek(ahead).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                self.pos += ahead;
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }
        let text = &self.input[start..self.pos];
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| self.err("a number", format!("`{text}`"), start))?;
            Ok(Token::Float(v))
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| self.err("an integer", format!("`{text}`"), start))?;
            Ok(Token::Int(v))
        }
    }

    /// Quoted string with `\"` and `\'` escapes; other backslashes pass
    /// through untouched so regex patterns keep their escapes.
    fn lex_quoted(&mut self, quote: u8, start: usize) -> Result<String, SelectError> {
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == quote {
                self.pos += 1;
                return Ok(out);
            }
            if b == b'\\' && matches!(self.peek(1), Some(b'"') | Some(b'\'')) {
                out.push(self.bytes[self.pos + 1] as char);
                self.pos += 2;
            } else {
                out.push(b as char);
                self.pos += 1;
            }
        }
        Err(self.err("a closing quote", "end of query", start))
    }

    fn lex_raw(&mut self, start: usize) -> Result<String, SelectError> {
        self.pos += 1;
        let from = self.pos;
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'`' {
                let text = self.input[from..self.pos].to_string();
                self.pos += 1;
                return Ok(text);
            }
            self.pos += 1;
        }
        Err(self.err("a closing backtick", "end of query", start))
    }
}

/// Tokenize a full query string.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, SelectError> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_basic_tokenize() {
        let toks = kinds("name CA");
        assert_eq!(toks[0], Token::Word("name".into()));
        assert_eq!(toks[1], Token::Word("CA".into()));
        assert_eq!(toks[2], Token::Eof);
    }

    #[test]
    fn test_comparison_ops() {
        let toks = kinds(">= <= == = != =~");
        assert_eq!(
            &toks[..6],
            &[Token::Ge, Token::Le, Token::Eq, Token::Eq, Token::Ne, Token::RegexEq]
        );
    }

    #[test]
    fn test_logical_symbols() {
        let toks = kinds("&& & || | !");
        assert_eq!(
            &toks[..5],
            &[Token::AndOp, Token::AndOp, Token::OrOp, Token::OrOp, Token::NotOp]
        );
    }

    #[test]
    fn test_math_ops() {
        let toks = kinds("+ - * ** / // %");
        assert_eq!(
            &toks[..7],
            &[
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::StarStar,
                Token::Slash,
                Token::SlashSlash,
                Token::Percent
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42")[0], Token::Int(42));
        assert_eq!(kinds("3.14")[0], Token::Float(3.14));
        assert_eq!(kinds("1e3")[0], Token::Float(1000.0));
        assert_eq!(kinds("2.5e-1")[0], Token::Float(0.25));
    }

    #[test]
    fn test_var_and_macro_tokens() {
        assert_eq!(kinds("$flex")[0], Token::Var("flex".into()));
        assert_eq!(kinds("@mysel")[0], Token::AtMacro("mysel".into()));
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(kinds("\"C.*\"")[0], Token::DoubleQuoted("C.*".into()));
        assert_eq!(kinds("'CA'")[0], Token::SingleQuoted("CA".into()));
        assert_eq!(kinds("`-5:10`")[0], Token::Raw("-5:10".into()));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(kinds(r#"'it\'s'"#)[0], Token::SingleQuoted("it's".into()));
        assert_eq!(kinds(r#""a\"b""#)[0], Token::DoubleQuoted("a\"b".into()));
        // Regex escapes survive.
        assert_eq!(kinds(r#""C\d+""#)[0], Token::DoubleQuoted(r"C\d+".into()));
    }

    #[test]
    fn test_prime_in_word() {
        assert_eq!(kinds("O5'")[0], Token::Word("O5'".into()));
    }

    #[test]
    fn test_spans() {
        let toks = tokenize("name CA").unwrap();
        assert_eq!(toks[0].span, (0, 4));
        assert_eq!(toks[1].span, (5, 7));
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(tokenize("name 'CA").is_err());
        assert!(tokenize("name `raw").is_err());
    }

    #[test]
    fn test_range_tokens() {
        let toks = kinds("resid 1:10:2");
        assert_eq!(toks[1], Token::Int(1));
        assert_eq!(toks[2], Token::Colon);
        assert_eq!(toks[3], Token::Int(10));
        assert_eq!(toks[4], Token::Colon);
        assert_eq!(toks[5], Token::Int(2));
    }
}
