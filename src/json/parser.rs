//! Recursive-descent JSON parser over one token of lookahead.

use std::io::BufRead;

use indexmap::IndexMap;

use crate::json::scanner::{Scanner, Token, TokenKind};
use crate::json::{Error, Value};

pub struct Parser<'a> {
    scanner: Scanner<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a mut dyn BufRead, size: usize) -> Self {
        Parser {
            scanner: Scanner::new(input, size),
            lookahead: None,
        }
    }

    fn peek(&mut self) -> Result<Option<TokenKind>, Error> {
        if self.lookahead.is_none() {
            self.lookahead = self.scanner.scan()?;
        }
        Ok(self.lookahead.as_ref().map(Token::kind))
    }

    fn next(&mut self) -> Result<Token, Error> {
        self.peek()?;
        self.lookahead
            .take()
            .ok_or_else(|| Error::Parse("unexpected eof".into()))
    }

    fn eat(&mut self, want: TokenKind) -> Result<Token, Error> {
        let token = self.next()?;
        if token.kind() != want {
            return Err(Error::Parse(format!("want {want}, got {}", token.kind())));
        }
        Ok(token)
    }

    fn array(&mut self) -> Result<Value, Error> {
        self.eat(TokenKind::LBracket)?;
        let mut values = Vec::new();
        loop {
            match self.peek()? {
                None | Some(TokenKind::RBracket) => break,
                _ if !values.is_empty() => {
                    self.eat(TokenKind::Comma)?;
                }
                _ => {}
            }
            values.push(self.value()?);
        }
        self.eat(TokenKind::RBracket)?;
        Ok(Value::Array(values))
    }

    fn object(&mut self) -> Result<Value, Error> {
        self.eat(TokenKind::LBrace)?;
        let mut members = IndexMap::new();
        loop {
            match self.peek()? {
                None | Some(TokenKind::RBrace) => break,
                _ if !members.is_empty() => {
                    self.eat(TokenKind::Comma)?;
                }
                _ => {}
            }
            let Token::Str(key) = self.eat(TokenKind::Str)? else {
                unreachable!()
            };
            self.eat(TokenKind::Colon)?;
            let value = self.value()?;
            members.insert(key, value);
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Value::Object(members))
    }

    pub fn value(&mut self) -> Result<Value, Error> {
        let Some(kind) = self.peek()? else {
            return Err(Error::Parse("unexpected eof".into()));
        };
        match kind {
            TokenKind::Num => match self.next()? {
                Token::Num(n) => Ok(Value::Num(n)),
                _ => unreachable!(),
            },
            TokenKind::Str => match self.next()? {
                Token::Str(s) => Ok(Value::Str(s)),
                _ => unreachable!(),
            },
            TokenKind::Bool => match self.next()? {
                Token::Bool(b) => Ok(Value::Bool(b)),
                _ => unreachable!(),
            },
            TokenKind::Null => {
                self.next()?;
                Ok(Value::Null)
            }
            TokenKind::LBracket => self.array(),
            TokenKind::LBrace => self.object(),
            kind => Err(Error::Parse(format!("bad value: {kind}"))),
        }
    }

    /// Fails if anything but whitespace remains after the top-level
    /// value.
    pub fn expect_end(&mut self) -> Result<(), Error> {
        match self.peek()? {
            None => Ok(()),
            Some(kind) => Err(Error::Parse(format!("trailing {kind} after value"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::json::{Error, Value, parse};
    use indexmap::IndexMap;

    fn obj<const N: usize>(members: [(&str, Value); N]) -> Value {
        Value::Object(
            members
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn parse_null() {
        assert_eq!(parse("null").unwrap(), Value::Null);
    }

    #[test]
    fn parse_number() {
        assert_eq!(parse("0").unwrap(), Value::Num(0.0));
        assert_eq!(parse("17").unwrap(), Value::Num(17.0));
        let n = parse("-32.4").unwrap().as_number().unwrap();
        assert!((n - -32.4).abs() < 0.001);
        let n = parse("1e-17").unwrap().as_number().unwrap();
        assert!((n - 1e-17).abs() < 1e-29);
    }

    #[test]
    fn parse_boolean() {
        assert_eq!(parse("true").unwrap(), Value::Bool(true));
        assert_eq!(parse("false").unwrap(), Value::Bool(false));
    }

    #[test]
    fn parse_string() {
        assert_eq!(parse("\"\"").unwrap(), Value::Str("".into()));
        assert_eq!(parse("\"foo bar\"").unwrap(), Value::Str("foo bar".into()));
    }

    #[test]
    fn parse_array() {
        assert_eq!(parse("[]").unwrap(), Value::Array(vec![]));
        assert_eq!(
            parse("[true, \"abc\"]").unwrap(),
            Value::Array(vec![Value::Bool(true), Value::Str("abc".into())])
        );
        assert_eq!(
            parse("[[],[]]").unwrap(),
            Value::Array(vec![Value::Array(vec![]), Value::Array(vec![])])
        );
    }

    #[test]
    fn parse_object() {
        assert_eq!(parse("{}").unwrap(), Value::Object(IndexMap::new()));
        assert_eq!(
            parse("{\"a\": \"b\", \"c\": 1}").unwrap(),
            obj([("a", Value::Str("b".into())), ("c", Value::Num(1.0))])
        );
    }

    #[test]
    fn duplicate_keys_last_wins() {
        assert_eq!(
            parse("{\"a\": 1, \"a\": 2}").unwrap(),
            obj([("a", Value::Num(2.0))])
        );
    }

    #[test]
    fn parse_completion_request() {
        let expected = obj([
            ("model", Value::Str("parley-1".into())),
            (
                "messages",
                Value::Array(vec![
                    obj([
                        ("role", Value::Str("system".into())),
                        ("content", Value::Str("You are a helpful assistant.".into())),
                    ]),
                    obj([
                        ("role", Value::Str("user".into())),
                        ("content", Value::Str("Hello!".into())),
                    ]),
                ]),
            ),
            ("stream", Value::Bool(true)),
        ]);
        let parsed = parse(
            r#"
            {
                "model": "parley-1",
                "messages": [
                    {
                        "role": "system",
                        "content": "You are a helpful assistant."
                    },
                    {
                        "role": "user",
                        "content": "Hello!"
                    }
                ],
                "stream": true
            }
        "#,
        )
        .unwrap();
        assert_eq!(parsed, expected);
    }

    fn parse_err(input: &str) -> String {
        match parse(input) {
            Err(Error::Parse(msg)) => msg,
            other => panic!("want parse error, got {other:?}"),
        }
    }

    #[test]
    fn error_names_expected_and_actual() {
        assert_eq!(parse_err("{1: 2}"), "want STR, got NUM");
        assert_eq!(parse_err("{\"a\" 2}"), "want COLON, got NUM");
        assert_eq!(parse_err("[1 2]"), "want COMMA, got NUM");
    }

    #[test]
    fn error_on_bad_value() {
        assert_eq!(parse_err(":"), "bad value: COLON");
        assert_eq!(parse_err("[1,]"), "bad value: RBRACKET");
    }

    #[test]
    fn error_on_eof() {
        assert_eq!(parse_err(""), "unexpected eof");
        assert_eq!(parse_err("[1, 2"), "unexpected eof");
        assert_eq!(parse_err("{\"a\""), "unexpected eof");
    }

    #[test]
    fn error_on_trailing_data() {
        assert_eq!(parse_err("1 2"), "trailing NUM after value");
        assert_eq!(parse_err("{} []"), "trailing LBRACKET after value");
    }

    #[test]
    fn trailing_whitespace_ok() {
        assert_eq!(parse(" 1 \n").unwrap(), Value::Num(1.0));
    }
}
