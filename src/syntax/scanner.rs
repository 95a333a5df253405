//! The scanner for pocketjs.
//!
//! Scanning is lazy: the evaluator asks for one token at a time at a byte
//! position and gets back its kind and extent. Literal values are never
//! materialized here.

use std::ops::Range;

use crate::diagnostics::AsStr;
pub use crate::syntax::token::Token;

/// Represents the type of lexical errors that can occur during tokenization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    UnexpectedChar,
    UnterminatedString,
    UnterminatedComment,
    InvalidStringEscape,
}

impl AsStr for LexError {
    fn as_str(&self) -> &'static str {
        match self {
            LexError::UnexpectedChar => "unexpected character",
            LexError::UnterminatedString => "unterminated string",
            LexError::UnterminatedComment => "unterminated comment",
            LexError::InvalidStringEscape => "bad str literal",
        }
    }
}

/// Represents a token along with its location in the code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<u32>,
    /// Set when `token` is [`Token::Err`].
    pub error: Option<LexError>,
}

/// Scans one token starting at `pos`, skipping whitespace and comments first.
#[inline]
pub fn scan(code: &[u8], pos: u32) -> SpannedToken {
    Lexer::at(code, pos).next_token()
}

/// Byte-based scanner over a code region.
pub struct Lexer<'input> {
    pub src: &'input [u8],
    pub pos: usize,
    done: bool,
}

impl<'input> Lexer<'input> {
    #[inline(always)]
    pub fn new(src: &'input str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, done: false }
    }

    #[inline(always)]
    pub fn at(src: &'input [u8], pos: u32) -> Self {
        Lexer { src, pos: pos as usize, done: false }
    }

    /// Returns the next token and its span.
    ///
    /// Errors do not stop the scanner: an [`Token::Err`] comes back with the
    /// position of the offending input and the lexer can be asked again.
    pub fn next_token(&mut self) -> SpannedToken {
        if let Err(start) = self.skip_trivia() {
            self.pos = self.src.len();
            return self.spanned(Token::Err, start, Some(LexError::UnterminatedComment));
        }
        let start = self.pos;
        let b = self.peek();
        if start >= self.src.len() {
            return self.spanned(Token::Eof, start, None);
        }
        if b == b'"' || b == b'\'' {
            return match self.scan_string(b) {
                Ok(()) => self.spanned(Token::String, start, None),
                Err(e) => self.spanned(Token::Err, start, Some(e)),
            };
        }
        if b.is_ascii_digit() {
            self.scan_number();
            return self.spanned(Token::Number, start, None);
        }
        if Self::is_ident_start(b) {
            let token = self.scan_identifier_or_keyword();
            return self.spanned(token, start, None);
        }
        match self.scan_operator(b) {
            Some(token) => self.spanned(token, start, None),
            None => self.spanned(Token::Err, start, Some(LexError::UnexpectedChar)),
        }
    }

    #[inline(always)]
    fn spanned(&self, token: Token, start: usize, error: Option<LexError>) -> SpannedToken {
        SpannedToken { token, span: start as u32..self.pos as u32, error }
    }

    /// Looks `n` bytes ahead without advancing. Returns 0 past the end.
    #[inline(always)]
    fn peek_at(&self, n: usize) -> u8 {
        *self.src.get(self.pos + n).unwrap_or(&0)
    }

    #[inline(always)]
    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    #[inline(always)]
    const fn bump(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n);
    }

    /// Skips whitespace, `//` line comments and `/* */` block comments.
    /// On an unterminated block comment returns its start.
    fn skip_trivia(&mut self) -> Result<(), usize> {
        loop {
            while self.pos < self.src.len() && self.peek().is_ascii_whitespace() {
                self.bump(1);
            }
            match (self.peek(), self.peek_at(1)) {
                (b'/', b'/') => {
                    while self.pos < self.src.len() && self.peek() != b'\n' {
                        self.bump(1);
                    }
                }
                (b'/', b'*') => {
                    let start = self.pos;
                    let body = &self.src[self.pos + 2..];
                    match body.windows(2).position(|w| w == b"*/") {
                        Some(i) => self.bump(2 + i + 2),
                        None => return Err(start),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    #[inline(always)]
    const fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_' || b == b'$'
    }

    #[inline(always)]
    const fn is_ident_continue(b: u8) -> bool {
        Self::is_ident_start(b) || b.is_ascii_digit()
    }

    /// Finds the matching unescaped quote. `\x` escapes span four bytes.
    fn scan_string(&mut self, quote: u8) -> Result<(), LexError> {
        self.bump(1);
        while self.pos < self.src.len() {
            match self.peek() {
                c if c == quote => {
                    self.bump(1);
                    return Ok(());
                }
                b'\\' => self.bump(if self.peek_at(1) == b'x' { 4 } else { 2 }),
                _ => self.bump(1),
            }
        }
        self.pos = self.src.len();
        Err(LexError::UnterminatedString)
    }

    /// Consumes the longest prefix a float parser would accept, plus `0x` hex.
    fn scan_number(&mut self) {
        if self.peek() == b'0'
            && matches!(self.peek_at(1), b'x' | b'X')
            && self.peek_at(2).is_ascii_hexdigit()
        {
            self.bump(2);
            while self.peek().is_ascii_hexdigit() {
                self.bump(1);
            }
            return;
        }
        while self.peek().is_ascii_digit() {
            self.bump(1);
        }
        if self.peek() == b'.' {
            self.bump(1);
            while self.peek().is_ascii_digit() {
                self.bump(1);
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            let sign = usize::from(matches!(self.peek_at(1), b'+' | b'-'));
            if self.peek_at(1 + sign).is_ascii_digit() {
                self.bump(1 + sign);
                while self.peek().is_ascii_digit() {
                    self.bump(1);
                }
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while Self::is_ident_continue(self.peek()) {
            self.bump(1);
        }
        Token::keyword(&self.src[start..self.pos])
    }

    /// Longest-match operator scan.
    fn scan_operator(&mut self, b: u8) -> Option<Token> {
        let (b1, b2, b3) = (self.peek_at(1), self.peek_at(2), self.peek_at(3));
        let (token, len) = match b {
            b'?' => (Token::Question, 1),
            b':' => (Token::Colon, 1),
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b'{' => (Token::LBrace, 1),
            b'}' => (Token::RBrace, 1),
            b';' => (Token::Semicolon, 1),
            b',' => (Token::Comma, 1),
            b'.' => (Token::Dot, 1),
            b'~' => (Token::Tilde, 1),
            b'!' => match (b1, b2) {
                (b'=', b'=') => (Token::Ne, 3),
                (b'=', _) => (Token::Ne, 2),
                _ => (Token::Not, 1),
            },
            b'=' => match (b1, b2) {
                (b'=', b'=') => (Token::Eq, 3),
                (b'=', _) => (Token::Eq, 2),
                _ => (Token::Assign, 1),
            },
            b'+' => match b1 {
                b'+' => (Token::PostInc, 2),
                b'=' => (Token::PlusAssign, 2),
                _ => (Token::Plus, 1),
            },
            b'-' => match b1 {
                b'-' => (Token::PostDec, 2),
                b'=' => (Token::MinusAssign, 2),
                _ => (Token::Minus, 1),
            },
            b'*' => match b1 {
                b'*' => (Token::Exp, 2),
                b'=' => (Token::MulAssign, 2),
                _ => (Token::Mul, 1),
            },
            b'/' => match b1 {
                b'=' => (Token::DivAssign, 2),
                _ => (Token::Div, 1),
            },
            b'%' => match b1 {
                b'=' => (Token::RemAssign, 2),
                _ => (Token::Rem, 1),
            },
            b'&' => match b1 {
                b'&' => (Token::LAnd, 2),
                b'=' => (Token::AndAssign, 2),
                _ => (Token::And, 1),
            },
            b'|' => match b1 {
                b'|' => (Token::LOr, 2),
                b'=' => (Token::OrAssign, 2),
                _ => (Token::Or, 1),
            },
            b'^' => match b1 {
                b'=' => (Token::XorAssign, 2),
                _ => (Token::Xor, 1),
            },
            b'<' => match (b1, b2) {
                (b'<', b'=') => (Token::ShlAssign, 3),
                (b'<', _) => (Token::Shl, 2),
                (b'=', _) => (Token::Le, 2),
                _ => (Token::Lt, 1),
            },
            b'>' => match (b1, b2, b3) {
                (b'>', b'>', b'=') => (Token::ZshrAssign, 4),
                (b'>', b'>', _) => (Token::Zshr, 3),
                (b'>', b'=', _) => (Token::ShrAssign, 3),
                (b'>', _, _) => (Token::Shr, 2),
                (b'=', _, _) => (Token::Ge, 2),
                _ => (Token::Gt, 1),
            },
            _ => {
                self.bump(1);
                return None;
            }
        };
        self.bump(len);
        Some(token)
    }
}

impl Iterator for Lexer<'_> {
    type Item = SpannedToken;

    /// Yields every token up to and including [`Token::Eof`].
    fn next(&mut self) -> Option<SpannedToken> {
        if self.done {
            return None;
        }
        let tok = self.next_token();
        self.done = tok.token == Token::Eof;
        Some(tok)
    }
}

/// Decodes the escape-aware byte at `i` of a quoted literal's body (quotes excluded).
/// Returns the byte and the number of source bytes it took.
pub fn unescape_at(body: &[u8], i: usize, quote: u8) -> Result<(u8, usize), LexError> {
    let b = body[i];
    if b != b'\\' {
        return Ok((b, 1));
    }
    let esc = *body.get(i + 1).ok_or(LexError::InvalidStringEscape)?;
    let byte = match esc {
        b'n' => b'\n',
        b't' => b'\t',
        b'r' => b'\r',
        b'\\' => b'\\',
        b'x' => {
            let hex = body.get(i + 2..i + 4).ok_or(LexError::InvalidStringEscape)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return Err(LexError::InvalidStringEscape);
            }
            return Ok(((hex_value(hex[0]) << 4) | hex_value(hex[1]), 4));
        }
        c if c == quote => quote,
        _ => return Err(LexError::InvalidStringEscape),
    };
    Ok((byte, 2))
}

/// Parses a number token's text.
pub fn parse_number(text: &[u8]) -> f64 {
    if let [b'0', b'x' | b'X', hex @ ..] = text {
        return hex.iter().fold(0.0, |acc, &d| acc * 16.0 + f64::from(hex_value(d)));
    }
    std::str::from_utf8(text).ok().and_then(|s| s.parse().ok()).unwrap_or(f64::NAN)
}

#[inline]
fn hex_value(d: u8) -> u8 {
    match d {
        b'0'..=b'9' => d - b'0',
        b'a'..=b'f' => d - b'a' + 10,
        b'A'..=b'F' => d - b'A' + 10,
        _ => 0,
    }
}
