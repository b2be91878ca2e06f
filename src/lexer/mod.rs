/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

pub mod token;

use crate::errors::{AssemblyError, Location};
use token::{Token, TokenKind};

/// A fully lexed token sequence with one-token lookahead and O(1)
/// snapshot/restore. The sequence always ends with a single Eof token,
/// which `peek` and `advance` keep returning once reached.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

/// An opaque stream position, handed back to `restore`.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot(usize);

impl TokenStream {
    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.pos)
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.pos = snapshot.0;
    }
}

/// Tokenize the whole source. SPARC assembly is ASCII, so the scanner
/// works on the byte slice directly.
pub fn tokenize(source: &str) -> Result<TokenStream, AssemblyError> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = scanner.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    Ok(TokenStream { tokens, pos: 0 })
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    row: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            row: 1,
            column: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_second(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.row += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn location(&self) -> Location {
        Location {
            row: self.row,
            column: self.column,
        }
    }

    fn error(&self, location: Location, width: usize, reason: String) -> AssemblyError {
        AssemblyError::LexicalError {
            location,
            width,
            reason,
        }
    }

    fn next_token(&mut self) -> Result<Token, AssemblyError> {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.bump();
        }

        let location = self.location();
        let Some(byte) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                value: None,
                location,
            });
        };

        match byte {
            b'!' => self.lex_line_comment(location),
            b'/' => self.lex_block_comment(location),
            b'"' => self.lex_string(location),
            b'\'' => self.lex_char(location),
            b'0'..=b'9' => self.lex_number(location),
            b'.' if matches!(self.peek_second(), Some(c) if c.is_ascii_alphabetic() || c == b'_') => {
                self.lex_identifier(location)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => self.lex_identifier(location),
            _ => {
                if let Some(kind) = single_char_kind(byte) {
                    self.bump();
                    Ok(self.simple(kind, byte, location))
                } else {
                    Err(self.error(
                        location,
                        1,
                        format!("unexpected character '{}'", byte as char),
                    ))
                }
            }
        }
    }

    fn simple(&self, kind: TokenKind, byte: u8, location: Location) -> Token {
        Token {
            kind,
            text: (byte as char).to_string(),
            value: None,
            location,
        }
    }

    fn lex_line_comment(&mut self, location: Location) -> Result<Token, AssemblyError> {
        let mut text = String::new();
        while let Some(byte) = self.peek() {
            if byte == b'\n' {
                self.bump();
                break;
            }
            text.push(byte as char);
            self.bump();
        }
        Ok(Token {
            kind: TokenKind::Comment,
            text,
            value: None,
            location,
        })
    }

    fn lex_block_comment(&mut self, location: Location) -> Result<Token, AssemblyError> {
        self.bump();
        if self.peek() != Some(b'*') {
            return Err(self.error(location, 1, "unexpected character '/'".to_string()));
        }
        self.bump();

        let mut text = String::from("/*");
        loop {
            let Some(byte) = self.bump() else {
                return Err(self.error(location, 2, "unterminated block comment".to_string()));
            };
            text.push(byte as char);
            if byte == b'*' && self.peek() == Some(b'/') {
                self.bump();
                text.push('/');
                break;
            }
        }
        Ok(Token {
            kind: TokenKind::Comment,
            text,
            value: None,
            location,
        })
    }

    fn lex_string(&mut self, location: Location) -> Result<Token, AssemblyError> {
        self.bump();
        let mut text = String::from("\"");
        loop {
            let Some(byte) = self.bump() else {
                return Err(self.error(location, 1, "unterminated string literal".to_string()));
            };
            text.push(byte as char);
            if byte == b'"' {
                break;
            }
        }
        Ok(Token {
            kind: TokenKind::StringLit,
            text,
            value: None,
            location,
        })
    }

    fn lex_char(&mut self, location: Location) -> Result<Token, AssemblyError> {
        self.bump();
        let inner = match self.peek() {
            Some(byte) if byte != b'\'' && byte != b'\n' => byte,
            _ => {
                return Err(self.error(location, 1, "invalid character literal".to_string()));
            }
        };
        self.bump();
        if self.peek() != Some(b'\'') {
            return Err(self.error(location, 2, "unterminated character literal".to_string()));
        }
        self.bump();
        Ok(Token {
            kind: TokenKind::CharLit,
            text: format!("'{}'", inner as char),
            value: None,
            location,
        })
    }

    fn lex_number(&mut self, location: Location) -> Result<Token, AssemblyError> {
        if self.peek() == Some(b'0') && self.peek_second() == Some(b'x') {
            self.bump();
            self.bump();
            let mut digits = String::new();
            // hex digits are uppercase only
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || (b'A'..=b'F').contains(&c))
            {
                digits.push(self.bump().unwrap_or_default() as char);
            }
            if digits.is_empty() {
                return Err(self.error(
                    location,
                    2,
                    "expected hexadecimal digits after '0x'".to_string(),
                ));
            }
            let text = format!("0x{}", digits);
            let value = i64::from_str_radix(&digits, 16).map_err(|_| {
                self.error(location, text.len(), format!("number out of range: {}", text))
            })?;
            return Ok(Token {
                kind: TokenKind::NumberLit,
                text,
                value: Some(value),
                location,
            });
        }

        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap_or_default() as char);
        }
        let value = text.parse::<i64>().map_err(|_| {
            self.error(location, text.len(), format!("number out of range: {}", text))
        })?;
        Ok(Token {
            kind: TokenKind::NumberLit,
            text,
            value: Some(value),
            location,
        })
    }

    fn lex_identifier(&mut self, location: Location) -> Result<Token, AssemblyError> {
        let mut text = String::new();
        if self.peek() == Some(b'.') {
            text.push('.');
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            text.push(self.bump().unwrap_or_default() as char);
        }
        Ok(Token {
            kind: TokenKind::Identifier,
            text,
            value: None,
            location,
        })
    }
}

fn single_char_kind(byte: u8) -> Option<TokenKind> {
    match byte {
        b'%' => Some(TokenKind::Percent),
        b':' => Some(TokenKind::Colon),
        b'.' => Some(TokenKind::Dot),
        b',' => Some(TokenKind::Comma),
        b'=' => Some(TokenKind::Assign),
        b'[' => Some(TokenKind::OpenBracket),
        b']' => Some(TokenKind::CloseBracket),
        b'(' => Some(TokenKind::OpenParen),
        b')' => Some(TokenKind::CloseParen),
        b'+' => Some(TokenKind::Plus),
        b'-' => Some(TokenKind::Minus),
        b'&' => Some(TokenKind::Ampersand),
        b'|' => Some(TokenKind::Pipe),
        b'^' => Some(TokenKind::Caret),
        _ => None,
    }
}
