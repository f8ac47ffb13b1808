//! Listen-socket and self-pipe construction.
//!
//! The listen socket is built by hand so it carries `SO_REUSEADDR`
//! and the platform-maximum backlog before being adopted as a
//! `std::net::TcpListener`. File descriptors live in
//! [`std::os::fd::OwnedFd`] from the moment they exist, so every
//! error path releases them.

use std::io;
use std::mem;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// A created-but-unbound TCP socket with `SO_REUSEADDR` set.
pub struct ServerSocket {
    fd: OwnedFd,
}

impl ServerSocket {
    pub fn new() -> io::Result<ServerSocket> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let optval: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &optval as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ServerSocket { fd })
    }

    /// Binds to `port` (0 picks an ephemeral port), listens with the
    /// maximum backlog, and hands the socket over as a listener.
    pub fn listen(self, port: u16) -> io::Result<TcpListener> {
        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        addr.sin_port = port.to_be();
        let rc = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::listen(self.fd.as_raw_fd(), libc::SOMAXCONN) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(TcpListener::from(self.fd))
    }
}

/// Creates the self-pipe pair; both ends close on drop.
pub fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn ephemeral_port_is_resolved() {
        let listener = ServerSocket::new().unwrap().listen(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_ne!(port, 0);
    }

    #[test]
    fn accepts_a_connection() {
        let listener = ServerSocket::new().unwrap().listen(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server_side.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn pipe_round_trip() {
        let (rd, wr) = pipe().unwrap();
        let buf = [7u8];
        let n = unsafe { libc::write(wr.as_raw_fd(), buf.as_ptr() as *const libc::c_void, 1) };
        assert_eq!(n, 1);
        let mut out = [0u8];
        let n = unsafe { libc::read(rd.as_raw_fd(), out.as_mut_ptr() as *mut libc::c_void, 1) };
        assert_eq!(n, 1);
        assert_eq!(out[0], 7);
    }
}
