//! Raw socket client used by the server and service tests.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::http::Method;
use crate::json::{self, Value};

const NUM_RETRIES: usize = 3;

pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub fn connect(port: u16) -> TestClient {
        loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => return TestClient { stream },
                Err(e) if e.raw_os_error() == Some(libc::ECONNABORTED) => continue,
                Err(e) => panic!("connect to port {port}: {e}"),
            }
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.try_write(data).unwrap();
    }

    fn try_write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data)
    }

    /// Reads until the server hangs up. A reset mid-read counts as
    /// end of stream: the server closes abruptly after timeouts.
    pub fn read_all(&mut self) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => panic!("read: {e}"),
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }
}

/// Performs one full request and returns the raw response,
/// retrying when the server resets the connection under load.
pub fn call(port: u16, method: Method, path: &str, headers: &[(&str, &str)], data: &str) -> String {
    for _attempt in 0..NUM_RETRIES {
        let mut sock = TestClient::connect(port);
        let mut request = format!("{method} {path} HTTP/1.1\r\n");
        for (key, value) in headers {
            request.push_str(&format!("{key}: {value}\r\n"));
        }
        if !data.is_empty() {
            request.push_str(&format!("Content-Length: {}\r\n", data.len()));
        }
        request.push_str("\r\n");
        request.push_str(data);
        match sock.try_write(request.as_bytes()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => continue,
            Err(e) => panic!("write: {e}"),
        }
        let response = sock.read_all();
        if response.is_empty() {
            continue;
        }
        return response;
    }
    panic!("exceeded max retries calling {method} {path}");
}

/// Posts a JSON document and parses the JSON response body.
pub fn post_json(port: u16, path: &str, data: &Value) -> Value {
    let result = call(port, Method::Post, path, &[], &data.to_string());
    let (_, body) = result
        .split_once("\r\n\r\n")
        .unwrap_or_else(|| panic!("invalid http response: {result}"));
    json::parse(body).unwrap()
}
