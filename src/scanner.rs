//! Streaming lexer.
//!
//! [`Scanner`] walks the source bytes once and yields `Result<Token>` items
//! lazily, so the parser can pull tokens and lexical errors in source order.
//! Whitespace and `//` comments never reach the caller. The stream always
//! finishes with exactly one `EOF` token positioned at the end of the input,
//! after which the iterator is exhausted for good.
//!
//! Lexical errors do not stop the scan:
//!
//! - an unrecognised character is reported once, even when it spans several
//!   UTF‑8 bytes, and skipped;
//! - an unterminated string is reported from its opening quote to the end of
//!   the input and yields no token.
//!
//! ```rust
//! use rox::scanner::Scanner;
//!
//! let kinds: Vec<String> = Scanner::new("print 1;")
//!     .filter_map(Result::ok)
//!     .map(|token| token.token_type.name().to_string())
//!     .collect();
//!
//! assert_eq!(kinds, ["PRINT", "NUMBER", "SEMICOLON", "EOF"]);
//! ```

use std::iter::FusedIterator;

use log::{debug, info, trace};
use memchr::memchr;
use phf::phf_map;

use crate::error::{LoxError, Position, Result};
use crate::token::{Token, TokenId, TokenType};

/// Reserved words, looked up by the raw identifier bytes.
static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"      => TokenType::AND,
    b"break"    => TokenType::BREAK,
    b"class"    => TokenType::CLASS,
    b"continue" => TokenType::CONTINUE,
    b"else"     => TokenType::ELSE,
    b"false"    => TokenType::FALSE,
    b"fun"      => TokenType::FUN,
    b"for"      => TokenType::FOR,
    b"if"       => TokenType::IF,
    b"nil"      => TokenType::NIL,
    b"or"       => TokenType::OR,
    b"print"    => TokenType::PRINT,
    b"return"   => TokenType::RETURN,
    b"super"    => TokenType::SUPER,
    b"this"     => TokenType::THIS,
    b"true"     => TokenType::TRUE,
    b"var"      => TokenType::VAR,
    b"while"    => TokenType::WHILE,
};

pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    /// First byte of the lexeme being scanned.
    lexeme_start: usize,
    /// Next byte to look at.
    cursor: usize,
    line: usize,
    next_id: usize,
    finished: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        info!("Scanner created over {} bytes", src.len());

        Self {
            src,
            bytes: src.as_bytes(),
            lexeme_start: 0,
            cursor: 0,
            line: 1,
            next_id: 0,
            finished: false,
        }
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    /// Current byte, or `0` once the input is exhausted.
    #[inline]
    fn peek(&self) -> u8 {
        self.bytes.get(self.cursor).copied().unwrap_or(0)
    }

    #[inline]
    fn peek_next(&self) -> u8 {
        self.bytes.get(self.cursor + 1).copied().unwrap_or(0)
    }

    #[inline]
    fn bump(&mut self) -> u8 {
        let byte = self.peek();
        self.cursor += 1;
        byte
    }

    /// `long` if the next byte is `second` (consuming it), else `short`.
    #[inline]
    fn either(&mut self, second: u8, long: TokenType, short: TokenType) -> TokenType {
        if !self.at_end() && self.peek() == second {
            self.cursor += 1;
            long
        } else {
            short
        }
    }

    #[inline]
    fn lexeme_position(&self) -> Position {
        Position::new(self.line, self.lexeme_start, self.cursor)
    }

    /// Consume one lexeme. `Ok(None)` means it produced no token
    /// (whitespace or a comment).
    fn scan_token(&mut self) -> Result<Option<TokenType>> {
        let token_type = match self.bump() {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,

            b'!' => self.either(b'=', TokenType::BANG_EQUAL, TokenType::BANG),
            b'=' => self.either(b'=', TokenType::EQUAL_EQUAL, TokenType::EQUAL),
            b'<' => self.either(b'=', TokenType::LESS_EQUAL, TokenType::LESS),
            b'>' => self.either(b'=', TokenType::GREATER_EQUAL, TokenType::GREATER),

            b'/' if self.peek() == b'/' => {
                self.skip_comment();
                return Ok(None);
            }
            b'/' => TokenType::SLASH,

            b' ' | b'\r' | b'\t' => return Ok(None),

            b'\n' => {
                self.line += 1;
                return Ok(None);
            }

            b'"' => self.string()?,

            b'0'..=b'9' => self.number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),

            _ => {
                // continuation bytes belong to the same character
                while !self.at_end() && (self.peek() & 0b1100_0000) == 0b1000_0000 {
                    self.cursor += 1;
                }

                return Err(LoxError::lex(
                    self.lexeme_position(),
                    "Unexpected character.",
                ));
            }
        };

        Ok(Some(token_type))
    }

    /// Jump to the next newline without consuming it, so the line count
    /// still sees it.
    fn skip_comment(&mut self) {
        self.cursor = match memchr(b'\n', &self.bytes[self.cursor..]) {
            Some(offset) => self.cursor + offset,
            None => self.bytes.len(),
        };
    }

    /// String literal, multi-line, no escapes. The token's payload is the
    /// text between the quotes.
    fn string(&mut self) -> Result<TokenType> {
        while !self.at_end() && self.peek() != b'"' {
            if self.bump() == b'\n' {
                self.line += 1;
            }
        }

        if self.at_end() {
            return Err(LoxError::lex(
                self.lexeme_position(),
                "Unterminated string.",
            ));
        }

        self.cursor += 1;

        // both quotes are ASCII, so these are char boundaries
        let contents = &self.src[self.lexeme_start + 1..self.cursor - 1];
        Ok(TokenType::STRING(contents.to_owned()))
    }

    /// Digits with an optional fraction. A trailing `.` is left for the
    /// next token.
    fn number(&mut self) -> TokenType {
        self.skip_digits();

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.cursor += 1;
            self.skip_digits();
        }

        let text = &self.src[self.lexeme_start..self.cursor];
        TokenType::NUMBER(text.parse().unwrap_or_default())
    }

    fn skip_digits(&mut self) {
        while self.peek().is_ascii_digit() {
            self.cursor += 1;
        }
    }

    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.cursor += 1;
        }

        KEYWORDS
            .get(&self.bytes[self.lexeme_start..self.cursor])
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }

    fn token(&mut self, token_type: TokenType, start: usize, end: usize) -> Token {
        let id = TokenId(self.next_id);
        self.next_id += 1;

        Token::new(token_type, &self.src[start..end], self.line, start, end, id)
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while !self.at_end() {
            self.lexeme_start = self.cursor;

            match self.scan_token() {
                Ok(Some(token_type)) => {
                    trace!("Scanned {} on line {}", token_type.name(), self.line);

                    let (start, end) = (self.lexeme_start, self.cursor);
                    return Some(Ok(self.token(token_type, start, end)));
                }
                Ok(None) => {}
                Err(error) => return Some(Err(error)),
            }
        }

        self.finished = true;
        debug!("Scanner reached EOF after {} token(s)", self.next_id);

        let end = self.bytes.len();
        Some(Ok(self.token(TokenType::EOF, end, end)))
    }
}

impl FusedIterator for Scanner<'_> {}
