//! Line-oriented request parsing.
//!
//! A request is read as CRLF-terminated lines of at most
//! [`MAX_LINE_LEN`] bytes: the request line (`METHOD SP PATH SP
//! VERSION`), then headers (`KEY: VALUE`, exactly one space after
//! the colon) until an empty line. Header names are kept as-is and
//! a repeated name keeps the last value. The rest of the stream is
//! handed to the request untouched as its body.

use std::io::{self, BufRead, Read};

use indexmap::IndexMap;
use log::debug;

use crate::http::error::HttpError;
use crate::http::{Method, Request};

/// Maximum line length, terminator included.
pub const MAX_LINE_LEN: usize = 256;

/// Reads one line, strict about the CRLF ending and the length cap.
fn read_line(input: &mut dyn BufRead) -> Result<String, HttpError> {
    let mut buf = Vec::new();
    let mut limited = Read::take(&mut *input, MAX_LINE_LEN as u64);
    match limited.read_until(b'\n', &mut buf) {
        Ok(_) => {}
        Err(e)
            if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
        {
            return Err(HttpError::RequestTimeout);
        }
        Err(_) => {
            return Err(HttpError::BadRequest("failed to read from stream".into()));
        }
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() == MAX_LINE_LEN {
            return Err(HttpError::BadRequest("header line too long".into()));
        }
        return Err(HttpError::BadRequest("unexpected eof".into()));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(HttpError::BadRequest("invalid line ending".into()));
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf).map_err(|_| HttpError::BadRequest("invalid utf-8 in line".into()))
}

fn parse_request_line(line: &str) -> Result<(Method, String), HttpError> {
    let Some((method, rest)) = line.split_once(' ') else {
        return Err(HttpError::BadRequest("missing http method".into()));
    };
    let method = match method {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => return Err(HttpError::BadRequest("invalid http method".into())),
    };
    debug!("parsed method: {method}");
    let Some((path, _version)) = rest.split_once(' ') else {
        return Err(HttpError::BadRequest("missing http path".into()));
    };
    debug!("parsed path: {path}");
    Ok((method, path.to_string()))
}

fn parse_header(line: &str) -> Result<(String, String), HttpError> {
    let Some((key, value)) = line.split_once(": ") else {
        return Err(HttpError::BadRequest("missing colon in http header".into()));
    };
    debug!("parsed header: [{key}: {value}]");
    Ok((key.to_string(), value.to_string()))
}

/// Parses the request line and headers from `input` and returns the
/// assembled [`Request`], with `input` handed over as the body
/// stream.
pub fn parse_request(addr: String, mut input: Box<dyn BufRead>) -> Result<Request, HttpError> {
    let line = read_line(&mut *input)?;
    if line.is_empty() {
        return Err(HttpError::BadRequest("missing request line".into()));
    }
    let (method, path) = parse_request_line(&line)?;
    let mut headers = IndexMap::new();
    loop {
        let line = read_line(&mut *input)?;
        if line.is_empty() {
            break;
        }
        let (key, value) = parse_header(&line)?;
        headers.insert(key, value);
    }
    debug!("parsed request: {method} {path} ({} headers)", headers.len());
    Ok(Request {
        addr,
        method,
        path,
        headers,
        body: input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &[u8]) -> Result<Request, HttpError> {
        parse_request("1.2.3.4".into(), Box::new(Cursor::new(raw.to_vec())))
    }

    fn bad_request(raw: &[u8]) -> String {
        match parse(raw) {
            Err(HttpError::BadRequest(msg)) => msg,
            other => panic!(
                "want bad request, got {:?}",
                other.map(|r| (r.method, r.path))
            ),
        }
    }

    #[test]
    fn get_without_headers() {
        let req = parse(b"GET /foo HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.addr, "1.2.3.4");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/foo");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn post_with_headers_and_body() {
        let mut req =
            parse(b"POST /v1/chat/completions HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello").unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.header("Host"), Some("example.com"));
        assert_eq!(req.header("Content-Length"), Some("5"));

        // The body stream must sit exactly past the header terminator.
        let mut body = String::new();
        req.body.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn repeated_header_keeps_last_value() {
        let req = parse(b"GET / HTTP/1.1\r\na: 1\r\na: 2\r\n\r\n").unwrap();
        assert_eq!(req.header("a"), Some("2"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn header_names_are_case_sensitive() {
        let req = parse(b"GET / HTTP/1.1\r\nHost: a\r\nhost: b\r\n\r\n").unwrap();
        assert_eq!(req.header("Host"), Some("a"));
        assert_eq!(req.header("host"), Some("b"));
    }

    #[test]
    fn invalid_method() {
        assert_eq!(bad_request(b"PUT / HTTP/1.1\r\n\r\n"), "invalid http method");
        assert_eq!(bad_request(b"get / HTTP/1.1\r\n\r\n"), "invalid http method");
    }

    #[test]
    fn malformed_request_line() {
        assert_eq!(bad_request(b"\r\n"), "missing request line");
        assert_eq!(bad_request(b"GET\r\n"), "missing http method");
        assert_eq!(bad_request(b"GET /foo\r\n"), "missing http path");
    }

    #[test]
    fn header_without_colon_space() {
        assert_eq!(
            bad_request(b"GET / HTTP/1.1\r\nBadHeader\r\n\r\n"),
            "missing colon in http header"
        );
        // A colon without the single space does not split the header.
        assert_eq!(
            bad_request(b"GET / HTTP/1.1\r\na:b\r\n\r\n"),
            "missing colon in http header"
        );
    }

    #[test]
    fn line_too_long() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', 300));
        raw.extend(b" HTTP/1.1\r\n\r\n");
        assert_eq!(bad_request(&raw), "header line too long");
    }

    #[test]
    fn bare_lf_line_ending() {
        assert_eq!(bad_request(b"GET /foo HTTP/1.1\n\n"), "invalid line ending");
    }

    #[test]
    fn truncated_request() {
        assert_eq!(bad_request(b"GET /foo HT"), "unexpected eof");
        assert_eq!(bad_request(b""), "unexpected eof");
        assert_eq!(bad_request(b"GET / HTTP/1.1\r\nHost: a\r\n"), "unexpected eof");
    }
}
