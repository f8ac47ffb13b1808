//! HTTP-status-bearing failures.
//!
//! Every error that crosses the request/response boundary carries
//! the status code the connection task should answer with; the
//! mapping lives in [`HttpError::status`]. Socket reads and writes
//! that trip the per-connection timeout surface as
//! `EAGAIN`/`EWOULDBLOCK`, which [`From<io::Error>`] turns into
//! [`HttpError::RequestTimeout`].

use std::io;

use thiserror::Error;

use crate::http::StatusCode;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Malformed request line, header, method, JSON, or a missing
    /// required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No route matched, or a matched route rejected the method.
    #[error("not found: {0}")]
    NotFound(String),

    /// A socket operation timed out mid-request.
    #[error("request timeout")]
    RequestTimeout,

    /// Protocol misuse by a handler or an unexpected I/O failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BadRequest,
            HttpError::NotFound(_) => StatusCode::NotFound,
            HttpError::RequestTimeout => StatusCode::RequestTimeout,
            HttpError::Internal(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => HttpError::RequestTimeout,
            _ => HttpError::Internal(err.to_string()),
        }
    }
}
