//! The HTTP server loop.
//!
//! A dedicated listener thread polls the listen socket together
//! with the read end of a self-pipe. Each accepted connection is
//! handed to the worker pool as a task that applies the socket
//! timeouts, parses the request, dispatches it through the handler,
//! and converts failures into status responses.
//!
//! Shutdown rides the self-pipe: [`ShutdownTrigger::trigger`]
//! clears the run flag and writes one byte, which wakes the poll.
//! Both operations are async-signal-safe, so the trigger may be
//! fired from a signal handler. [`HttpServer::wait`] joins the
//! listener and then the workers; in-flight connections finish,
//! queued ones are dropped.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{fmt, io};

use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::http::error::HttpError;
use crate::http::parser::parse_request;
use crate::http::response::ResponseWriter;
use crate::http::{Handler, StatusCode};
use crate::net::pool::ThreadPool;
use crate::net::socket::{self, ServerSocket};

struct Shared {
    run: AtomicBool,
    running: AtomicBool,
    pipe_wr: OwnedFd,
}

/// Handle for stopping the server. `trigger` performs only an
/// atomic store and a pipe write, so it may be invoked from a
/// signal handler; repeated triggers are no-ops.
#[derive(Clone)]
pub struct ShutdownTrigger {
    shared: Arc<Shared>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        if self.shared.run.swap(false, Ordering::SeqCst) {
            let byte = [1u8];
            unsafe {
                libc::write(
                    self.shared.pipe_wr.as_raw_fd(),
                    byte.as_ptr() as *const libc::c_void,
                    1,
                );
            }
        }
    }
}

pub struct HttpServer {
    config: ServerConfig,
    handler: Handler,
    shared: Arc<Shared>,
    sock: Option<ServerSocket>,
    pipe_rd: Option<OwnedFd>,
    pool: Option<Arc<ThreadPool>>,
    listener_thread: Option<JoinHandle<()>>,
    port: u16,
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.config)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl HttpServer {
    /// Creates the server with its listen socket and self-pipe;
    /// nothing is bound until [`HttpServer::start`].
    pub fn new(config: ServerConfig, handler: Handler) -> io::Result<HttpServer> {
        let sock = ServerSocket::new()?;
        let (pipe_rd, pipe_wr) = socket::pipe()?;
        Ok(HttpServer {
            port: config.port,
            config,
            handler,
            shared: Arc::new(Shared {
                run: AtomicBool::new(false),
                running: AtomicBool::new(false),
                pipe_wr,
            }),
            sock: Some(sock),
            pipe_rd: Some(pipe_rd),
            pool: None,
            listener_thread: None,
        })
    }

    /// The bound port; meaningful once [`HttpServer::start`] has
    /// returned (a requested port of 0 is resolved to the ephemeral
    /// port picked by the OS).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            shared: self.shared.clone(),
        }
    }

    /// True while the listener loop is alive.
    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Binds and listens, resolves the effective port, and spawns
    /// the worker pool plus the listener thread. Must be called
    /// exactly once; when it returns the server is reachable.
    pub fn start(&mut self) -> io::Result<()> {
        let sock = self.sock.take().expect("server already started");
        self.shared.run.store(true, Ordering::SeqCst);
        let listener = sock.listen(self.config.port)?;
        self.port = listener.local_addr()?.port();
        info!("http server listening at port {}", self.port);

        let pool = Arc::new(ThreadPool::new(self.config.worker_threads));
        self.pool = Some(pool.clone());
        let pipe_rd = self.pipe_rd.take().expect("server already started");
        let shared = self.shared.clone();
        let handler = self.handler.clone();
        let config = self.config.clone();
        self.listener_thread = Some(thread::spawn(move || {
            listen_loop(listener, pipe_rd, &shared, &pool, &handler, &config);
        }));
        Ok(())
    }

    /// Requests shutdown and returns immediately. Idempotent, and
    /// safe to call from a signal handler through
    /// [`ShutdownTrigger`].
    pub fn stop(&self) {
        debug!("stopping server...");
        self.shutdown_trigger().trigger();
    }

    /// Blocks until the listener thread has exited and every
    /// in-flight connection task has completed.
    pub fn wait(&mut self) {
        debug!("waiting on server thread to exit...");
        if let Some(thread) = self.listener_thread.take() {
            if thread.join().is_err() {
                error!("listener thread panicked");
            }
        }
        // Last reference: joins the workers.
        self.pool = None;
        debug!("server thread exited");
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn listen_loop(
    listener: std::net::TcpListener,
    pipe_rd: OwnedFd,
    shared: &Shared,
    pool: &ThreadPool,
    handler: &Handler,
    config: &ServerConfig,
) {
    shared.running.store(true, Ordering::SeqCst);
    debug!("http server loop started");
    let mut fds = [
        libc::pollfd {
            fd: listener.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: pipe_rd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    while shared.run.load(Ordering::SeqCst) {
        fds[0].revents = 0;
        fds[1].revents = 0;
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!("poll failed: {err}");
            break;
        }
        if fds[0].revents & libc::POLLIN != 0 {
            accept_one(&listener, pool, handler, config);
        }
    }
    debug!("http server loop finished");
    shared.running.store(false, Ordering::SeqCst);
}

fn accept_one(
    listener: &std::net::TcpListener,
    pool: &ThreadPool,
    handler: &Handler,
    config: &ServerConfig,
) {
    match listener.accept() {
        Ok((stream, peer)) => {
            let handler = handler.clone();
            let read_timeout_millis = config.read_timeout_millis;
            let write_timeout_millis = config.write_timeout_millis;
            pool.offer(Box::new(move || {
                handle_client(stream, peer, read_timeout_millis, write_timeout_millis, &handler);
            }));
        }
        Err(e) if e.raw_os_error() == Some(libc::ECONNABORTED) => {
            warn!("accept: {e}");
        }
        Err(e) => {
            error!("accept failed: {e}");
        }
    }
}

/// Sends an error status, unless a status already went out, in
/// which case there is nothing useful left to say to the client.
fn must_send(resp: &mut ResponseWriter<'_>, status: StatusCode) {
    if let Some(sent) = resp.status() {
        error!("can't send {status}, already sent {sent}");
        return;
    }
    if let Err(e) = resp.write_status(status).and_then(|_| resp.finish()) {
        warn!("failed to send {status}: {e}");
    }
}

fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout_millis: u64,
    write_timeout_millis: u64,
    handler: &Handler,
) {
    let addr = peer.ip().to_string();
    debug!("handling client {addr}:{}", peer.port());

    let timeout = |millis: u64| (millis > 0).then(|| Duration::from_millis(millis));
    let reader = stream
        .set_read_timeout(timeout(read_timeout_millis))
        .and_then(|_| stream.set_write_timeout(timeout(write_timeout_millis)))
        .and_then(|_| stream.try_clone())
        .map(BufReader::new);
    let reader = match reader {
        Ok(reader) => reader,
        Err(e) => {
            error!("failed to set up client stream: {e}");
            return;
        }
    };

    let mut sink = BufWriter::new(stream);
    let mut resp = ResponseWriter::new(&mut sink);
    let result = parse_request(addr.clone(), Box::new(reader)).and_then(|mut req| {
        // A panicking handler is an unexpected failure; answer 500.
        panic::catch_unwind(AssertUnwindSafe(|| handler(&mut req, &mut resp)))
            .unwrap_or_else(|_| Err(HttpError::Internal("handler panicked".into())))?;
        resp.finish()?;
        Ok(req)
    });
    match result {
        Ok(req) => {
            let status = resp.status().map(StatusCode::code).unwrap_or_default();
            let user_agent = req.header("User-Agent").unwrap_or_default();
            info!(
                "{addr} - {} {} HTTP/1.1 {status} {} {user_agent}",
                req.method,
                req.path,
                resp.bytes_written(),
            );
        }
        Err(e) => {
            error!("{e}");
            must_send(&mut resp, e.status());
        }
    }

    debug!("done handling client {addr}:{}", peer.port());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Request};
    use crate::net::test_client::{self, TestClient};
    use indexmap::IndexMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            read_timeout_millis: 5000,
            write_timeout_millis: 5000,
            worker_threads: 3,
        }
    }

    fn start_server(config: ServerConfig, handler: Handler) -> HttpServer {
        let mut server = HttpServer::new(config, handler).unwrap();
        server.start().unwrap();
        server
    }

    fn ok_handler() -> Handler {
        Arc::new(|_req: &mut Request, resp: &mut ResponseWriter<'_>| {
            resp.write_status(StatusCode::Ok)
        })
    }

    #[test]
    fn call_and_hang_up() {
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let server = start_server(
            test_config(),
            Arc::new(move |_req: &mut Request, resp: &mut ResponseWriter<'_>| {
                done2.store(true, Ordering::SeqCst);
                resp.write_status(StatusCode::Ok)
            }),
        );

        // The server should handle hang-ups gracefully: the handler
        // is never invoked and the server keeps serving.
        for _ in 0..5 {
            let _sock = TestClient::connect(server.port());
        }
        assert!(!done.load(Ordering::SeqCst));
        let response = test_client::call(server.port(), Method::Get, "/", &[], "");
        assert!(response.contains("HTTP/1.1 200 OK"));
    }

    #[test]
    fn read_timeout_sends_408() {
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let mut config = test_config();
        config.read_timeout_millis = 1;
        let server = start_server(
            config,
            Arc::new(move |_req: &mut Request, resp: &mut ResponseWriter<'_>| {
                done2.store(true, Ordering::SeqCst);
                resp.write_status(StatusCode::Ok)
            }),
        );

        // Sleep before sending the full request line.
        let mut sock = TestClient::connect(server.port());
        sock.write(b"GET ");
        thread::sleep(Duration::from_millis(500));
        let result = sock.read_all();

        assert!(!done.load(Ordering::SeqCst));
        assert!(result.contains("HTTP/1.1 408 Request Timeout"), "got: {result}");
    }

    #[test]
    fn write_timeout_truncates_response() {
        let data = "x".repeat(16 * 1024 * 1024);
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let mut config = test_config();
        config.write_timeout_millis = 1;
        let body = data.clone();
        let server = start_server(
            config,
            Arc::new(move |_req: &mut Request, resp: &mut ResponseWriter<'_>| {
                done2.store(true, Ordering::SeqCst);
                resp.write_status(StatusCode::Ok)?;
                resp.write_data(body.as_bytes())
            }),
        );

        // Sleep so we can't ACK the full response.
        let mut sock = TestClient::connect(server.port());
        sock.write(b"GET / HTTP/1.1\r\n\r\n");
        thread::sleep(Duration::from_millis(500));
        let result = sock.read_all();

        // The server sends an OK but hangs up before the whole body.
        assert!(done.load(Ordering::SeqCst));
        assert!(result.contains("200 OK"));
        assert!(!result.contains(&data));
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Captured {
        method: Method,
        path: String,
        headers: IndexMap<String, String>,
    }

    #[test]
    fn call_successfully() {
        let data = "x".repeat(16 * 1024 * 1024);
        let captured: Arc<Mutex<Option<Captured>>> = Arc::new(Mutex::new(None));
        let captured2 = captured.clone();
        let body = data.clone();
        let server = start_server(
            test_config(),
            Arc::new(move |req: &mut Request, resp: &mut ResponseWriter<'_>| {
                *captured2.lock().unwrap() = Some(Captured {
                    method: req.method,
                    path: req.path.clone(),
                    headers: req.headers.clone(),
                });
                resp.write_status(StatusCode::Ok)?;
                resp.write_data(body.as_bytes())
            }),
        );

        let result = test_client::call(
            server.port(),
            Method::Get,
            "/foo",
            &[("a", "b"), ("1", "2")],
            "",
        );

        assert!(result.contains("HTTP/1.1 200 OK"));
        assert!(result.contains(&data));
        let captured = captured.lock().unwrap().clone().unwrap();
        assert_eq!(captured.method, Method::Get);
        assert_eq!(captured.path, "/foo");
        assert_eq!(captured.headers.get("a").unwrap(), "b");
        assert_eq!(captured.headers.get("1").unwrap(), "2");
    }

    #[test]
    fn call_concurrently() {
        for num_workers in 1..=7 {
            let mut config = test_config();
            config.worker_threads = num_workers;
            let count = Arc::new(AtomicUsize::new(0));
            let count2 = count.clone();
            let server = start_server(
                config,
                Arc::new(move |_req: &mut Request, resp: &mut ResponseWriter<'_>| {
                    count2.fetch_add(1, Ordering::SeqCst);
                    resp.write_status(StatusCode::Ok)
                }),
            );
            let port = server.port();

            let num_clients = 10;
            let num_requests = 10;
            let barrier = Arc::new(Barrier::new(num_clients));
            let threads: Vec<_> = (0..num_clients)
                .map(|_| {
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        (0..num_requests)
                            .map(|_| test_client::call(port, Method::Get, "/foo", &[], ""))
                            .collect::<Vec<String>>()
                    })
                })
                .collect();
            for thread in threads {
                for result in thread.join().unwrap() {
                    assert!(result.contains("HTTP/1.1 200 OK"));
                }
            }
            assert_eq!(count.load(Ordering::SeqCst), num_clients * num_requests);
        }
    }

    #[test]
    fn stop_is_idempotent_and_refuses_new_connections() {
        let mut server = start_server(test_config(), ok_handler());
        let port = server.port();
        let response = test_client::call(port, Method::Get, "/", &[], "");
        assert!(response.contains("HTTP/1.1 200 OK"));
        assert!(server.running());

        server.stop();
        server.stop();
        server.wait();
        assert!(!server.running());

        match TcpStream::connect(("127.0.0.1", port)) {
            Err(_) => {}
            Ok(mut stream) => {
                // A racing connect may still succeed against the dead
                // socket; it must yield a closed stream.
                use std::io::Read;
                let mut buf = [0u8; 1];
                assert_eq!(stream.read(&mut buf).unwrap_or(0), 0);
            }
        }
    }

    #[test]
    fn handler_error_becomes_status_response() {
        let server = start_server(
            test_config(),
            Arc::new(|_req: &mut Request, _resp: &mut ResponseWriter<'_>| {
                Err(HttpError::BadRequest("nope".into()))
            }),
        );
        let response = test_client::call(server.port(), Method::Get, "/", &[], "");
        assert!(response.contains("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn panicking_handler_becomes_500() {
        let server = start_server(
            test_config(),
            Arc::new(|_req: &mut Request, _resp: &mut ResponseWriter<'_>| -> Result<(), HttpError> {
                panic!("boom")
            }),
        );
        let response = test_client::call(server.port(), Method::Get, "/", &[], "");
        assert!(response.contains("HTTP/1.1 500 Internal Server Error"));
    }

    #[test]
    fn unparseable_request_becomes_400() {
        let server = start_server(test_config(), ok_handler());
        let mut sock = TestClient::connect(server.port());
        sock.write(b"NONSENSE\r\n\r\n");
        let result = sock.read_all();
        assert!(result.contains("HTTP/1.1 400 Bad Request"), "got: {result}");
    }
}
