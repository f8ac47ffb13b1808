//! Stateful response writer.
//!
//! The writer moves through three phases. In START nothing has been
//! sent; writing the status line emits it together with the
//! `Connection: close` header and enters HEADERS. The first body
//! write emits the blank separator line and enters BODY; if no
//! status was written by then, `200 OK` is emitted implicitly.
//! `finish` flushes and closes the writer. Any call outside its
//! phase is a protocol error by the handler and reported as an
//! internal error, never silently reordered.

use std::io::Write;

use indexmap::IndexMap;
use log::warn;

use crate::http::StatusCode;
use crate::http::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Headers,
    Body,
    Closed,
}

pub struct ResponseWriter<'a> {
    out: &'a mut dyn Write,
    phase: Phase,
    status: Option<StatusCode>,
    headers: IndexMap<String, String>,
    bytes_written: usize,
}

impl<'a> ResponseWriter<'a> {
    /// Wraps a borrowed byte sink. The sink is flushed when the
    /// writer is finished or dropped; it is not closed.
    pub fn new(out: &'a mut dyn Write) -> Self {
        ResponseWriter {
            out,
            phase: Phase::Start,
            status: None,
            headers: IndexMap::new(),
            bytes_written: 0,
        }
    }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Total body bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Headers written so far.
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Emits the status line and the `Connection: close` header.
    /// A status may be written exactly once, before any body write.
    pub fn write_status(&mut self, code: StatusCode) -> Result<(), HttpError> {
        match self.phase {
            Phase::Start => {
                write!(self.out, "HTTP/1.1 {} {}\r\n", code.code(), code.reason())?;
                self.status = Some(code);
                self.phase = Phase::Headers;
                self.write_header("Connection", "close")
            }
            _ => Err(HttpError::Internal(format!(
                "can't write status {code}: status already written"
            ))),
        }
    }

    /// Emits one header line. Before the first body write only; in
    /// START an implicit `200 OK` status line is emitted first.
    pub fn write_header(&mut self, key: &str, value: &str) -> Result<(), HttpError> {
        match self.phase {
            Phase::Start => {
                self.write_status(StatusCode::Ok)?;
                self.write_header(key, value)
            }
            Phase::Headers => {
                write!(self.out, "{key}: {value}\r\n")?;
                self.headers.insert(key.to_string(), value.to_string());
                Ok(())
            }
            Phase::Body | Phase::Closed => Err(HttpError::Internal(format!(
                "can't write header {key}: body already started"
            ))),
        }
    }

    /// Writes body bytes. The first call terminates the header
    /// section; an unset status becomes an implicit `200 OK`.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), HttpError> {
        match self.phase {
            Phase::Start => {
                self.write_status(StatusCode::Ok)?;
                self.write_data(data)
            }
            Phase::Headers => {
                self.out.write_all(b"\r\n")?;
                self.phase = Phase::Body;
                self.write_data(data)
            }
            Phase::Body => {
                self.out.write_all(data)?;
                self.bytes_written += data.len();
                Ok(())
            }
            Phase::Closed => Err(HttpError::Internal("write after close".into())),
        }
    }

    pub fn flush(&mut self) -> Result<(), HttpError> {
        self.out.flush()?;
        Ok(())
    }

    /// Flushes and closes the writer; further writes are errors.
    pub fn finish(&mut self) -> Result<(), HttpError> {
        self.flush()?;
        self.phase = Phase::Closed;
        Ok(())
    }
}

impl Drop for ResponseWriter<'_> {
    fn drop(&mut self) {
        if self.phase != Phase::Closed {
            if let Err(e) = self.out.flush() {
                warn!("response flush failed: {e}");
            }
        }
    }
}
