//! Tokenizer for the JSON parser.
//!
//! The scanner consumes a buffered byte stream one byte at a time up
//! to a declared size limit. Reaching the limit is a normal end of
//! stream, and nothing past it is ever read: when the input is an
//! HTTP body this leaves the connection exactly at the byte after
//! `Content-Length`. A read that times out is treated as end of
//! stream too; the parser then fails with an ordinary eof error.

use std::fmt;
use std::io::{self, BufRead};

use crate::json::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Num,
    Str,
    Bool,
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Num(_) => TokenKind::Num,
            Token::Str(_) => TokenKind::Str,
            Token::Bool(_) => TokenKind::Bool,
            Token::Null => TokenKind::Null,
            Token::LBrace => TokenKind::LBrace,
            Token::RBrace => TokenKind::RBrace,
            Token::LBracket => TokenKind::LBracket,
            Token::RBracket => TokenKind::RBracket,
            Token::Comma => TokenKind::Comma,
            Token::Colon => TokenKind::Colon,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Num => "NUM",
            TokenKind::Str => "STR",
            TokenKind::Bool => "BOOL",
            TokenKind::Null => "NIL",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
        };
        f.write_str(name)
    }
}

pub struct Scanner<'a> {
    input: &'a mut dyn BufRead,
    limit: usize,
    pos: usize,
    peeked: Option<u8>,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a mut dyn BufRead, limit: usize) -> Self {
        Scanner {
            input,
            limit,
            pos: 0,
            peeked: None,
        }
    }

    /// Bytes consumed from the underlying stream so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    fn peek(&mut self) -> Result<Option<u8>, Error> {
        if self.peeked.is_some() {
            return Ok(self.peeked);
        }
        if self.pos == self.limit {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.pos += 1;
        self.peeked = Some(buf[0]);
        Ok(self.peeked)
    }

    fn advance(&mut self) -> Result<u8, Error> {
        match self.peek()? {
            Some(b) => {
                self.peeked = None;
                Ok(b)
            }
            None => Err(Error::Parse("unexpected eof".into())),
        }
    }

    fn skip_whitespace(&mut self) -> Result<(), Error> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.advance()?;
        }
        Ok(())
    }

    fn scan_string(&mut self) -> Result<Token, Error> {
        self.advance()?;
        let mut s = String::new();
        loop {
            match self.advance()? {
                b'"' => return Ok(Token::Str(s)),
                b'\n' => return Err(Error::Parse("unterminated string".into())),
                b => s.push(b as char),
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token, Error> {
        let mut s = String::new();
        if self.peek()? == Some(b'-') {
            s.push(self.advance()? as char);
        }
        while let Some(b) = self.peek()? {
            if !b.is_ascii_digit() {
                break;
            }
            s.push(self.advance()? as char);
        }
        if self.peek()? == Some(b'.') {
            s.push(self.advance()? as char);
            while let Some(b) = self.peek()? {
                if !b.is_ascii_digit() {
                    break;
                }
                s.push(self.advance()? as char);
            }
        }
        if let Some(b'e' | b'E') = self.peek()? {
            s.push(self.advance()? as char);
            if let Some(b'+' | b'-') = self.peek()? {
                s.push(self.advance()? as char);
            }
            while let Some(b) = self.peek()? {
                if !b.is_ascii_digit() {
                    break;
                }
                s.push(self.advance()? as char);
            }
        }
        let value: f64 = s
            .parse()
            .map_err(|_| Error::Parse(format!("bad number: {s}")))?;
        Ok(Token::Num(value))
    }

    fn scan_literal(&mut self) -> Result<Token, Error> {
        let mut s = String::new();
        while let Some(b) = self.peek()? {
            if !b.is_ascii_alphabetic() {
                break;
            }
            s.push(self.advance()? as char);
        }
        match s.as_str() {
            "true" => Ok(Token::Bool(true)),
            "false" => Ok(Token::Bool(false)),
            "null" => Ok(Token::Null),
            _ => Err(Error::Parse(format!("invalid literal: {s}"))),
        }
    }

    /// Scans the next token, or `None` at end of stream.
    pub fn scan(&mut self) -> Result<Option<Token>, Error> {
        self.skip_whitespace()?;
        let Some(b) = self.peek()? else {
            return Ok(None);
        };
        let token = match b {
            b'[' => {
                self.advance()?;
                Token::LBracket
            }
            b']' => {
                self.advance()?;
                Token::RBracket
            }
            b'{' => {
                self.advance()?;
                Token::LBrace
            }
            b'}' => {
                self.advance()?;
                Token::RBrace
            }
            b',' => {
                self.advance()?;
                Token::Comma
            }
            b':' => {
                self.advance()?;
                Token::Colon
            }
            b'"' => self.scan_string()?,
            b'-' => self.scan_number()?,
            b if b.is_ascii_digit() => self.scan_number()?,
            b if b.is_ascii_alphabetic() => self.scan_literal()?,
            b => return Err(Error::Parse(format!("bad token: {}", b as char))),
        };
        Ok(Some(token))
    }
}
