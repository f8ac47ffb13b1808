//! HTTP/1.1 subset: request/response types, the wire codec, and the
//! router.
//!
//! Only what the service needs is implemented: GET and POST, one
//! request per connection, bodies sized by `Content-Length`. The
//! parser lives in [`parser`], the stateful response writer in
//! [`response`], and path dispatch in [`router`].

pub mod error;
pub mod parser;
pub mod response;
pub mod router;

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::http::error::HttpError;
use crate::http::response::ResponseWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    RequestTimeout = 408,
    InternalServerError = 500,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An incoming request after header parsing.
///
/// `body` is the connection's buffered stream positioned at the
/// first byte after the header terminator; handlers that expect a
/// body read `Content-Length` bytes from it.
pub struct Request {
    pub addr: String,
    pub method: Method,
    pub path: String,
    pub headers: IndexMap<String, String>,
    pub body: Box<dyn BufRead>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Per-request callback. The same handler value is invoked
/// concurrently from distinct workers.
///
/// A handler either writes a complete response or returns a
/// status-bearing [`HttpError`], which the connection task converts
/// into an error response.
pub type Handler =
    Arc<dyn Fn(&mut Request, &mut ResponseWriter<'_>) -> Result<(), HttpError> + Send + Sync>;
