// Copyright (c) 2017 Chef Software Inc. and/or applicable contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named listening sockets owned by the supervisor.
//!
//! The registry binds them once and keeps the descriptors for the lifetime
//! of the daemon; children inherit them over exec, so a descriptor
//! survives any number of single-service restarts.

use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::os::unix::net::UnixListener;

use libc;

use core::os::fd;
use error::{Error, Result};

pub const DEFAULT_LISTEN_QSIZE: i32 = 128;

pub struct Socket {
    pub name: String,
    pub host: Option<String>,
    /// A TCP port number, or a filesystem path for a UNIX socket.
    pub service: Option<String>,
    pub nonblocking: bool,
    pub listen_qsize: i32,
    fd: Option<RawFd>,
    bound_addr: Option<SocketAddr>,
    unix_path: Option<String>,
}

impl Socket {
    pub fn new<T: Into<String>>(name: T) -> Socket {
        Socket {
            name: name.into(),
            host: None,
            service: None,
            nonblocking: false,
            listen_qsize: DEFAULT_LISTEN_QSIZE,
            fd: None,
            bound_addr: None,
            unix_path: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.fd.is_some()
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Local address after a bind; reports the actual port when the
    /// configuration asked for a wildcard.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Create, bind and mark listening. Binding twice under the same name
    /// is rejected; the first descriptor stays authoritative.
    pub fn bind(&mut self) -> Result<()> {
        if self.fd.is_some() {
            return Err(Error::SocketBound(self.name.clone()));
        }
        let service = match self.service {
            Some(ref s) if !s.is_empty() => s.clone(),
            _ => return Err(Error::SocketConfig(self.name.clone())),
        };
        if service.parse::<u16>().is_ok() {
            self.bind_tcp(&service)
        } else {
            self.bind_unix(&service)
        }
    }

    fn bind_tcp(&mut self, port: &str) -> Result<()> {
        let host = self.host.as_ref().map_or("127.0.0.1", |h| h.as_str());
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(addr.as_str())
            .map_err(|e| Error::SocketBind(self.name.clone(), e))?;
        if self.nonblocking {
            listener
                .set_nonblocking(true)
                .map_err(|e| Error::SocketBind(self.name.clone(), e))?;
        }
        self.bound_addr = listener.local_addr().ok();
        let fd = self.keep_fd(listener.into_raw_fd())?;
        self.adjust_backlog(fd);
        info!(
            "socket {} bound on {}",
            self.name,
            self.bound_addr
                .map_or_else(|| addr.clone(), |a| a.to_string())
        );
        self.fd = Some(fd);
        Ok(())
    }

    fn bind_unix(&mut self, path: &str) -> Result<()> {
        // A stale socket file from a previous run would make bind fail.
        let _ = fs::remove_file(path);
        let listener = UnixListener::bind(path)
            .map_err(|e| Error::SocketBind(self.name.clone(), e))?;
        if self.nonblocking {
            listener
                .set_nonblocking(true)
                .map_err(|e| Error::SocketBind(self.name.clone(), e))?;
        }
        let fd = self.keep_fd(listener.into_raw_fd())?;
        self.adjust_backlog(fd);
        info!("socket {} bound on {}", self.name, path);
        self.fd = Some(fd);
        self.unix_path = Some(path.to_string());
        Ok(())
    }

    /// Park the descriptor above the range children place their own pipes
    /// in (the proxy host gets pipes dup2'd onto 3/4/5).
    fn keep_fd(&self, fd: RawFd) -> Result<RawFd> {
        if fd >= 10 {
            return Ok(fd);
        }
        let high = fd::dup_above(fd, 10)?;
        fd::close(fd);
        Ok(high)
    }

    fn adjust_backlog(&self, fd: RawFd) {
        if self.listen_qsize != DEFAULT_LISTEN_QSIZE {
            unsafe {
                libc::listen(fd, self.listen_qsize);
            }
        }
    }

    pub fn unbind(&mut self) {
        if let Some(fd) = self.fd.take() {
            fd::close(fd);
        }
        if let Some(path) = self.unix_path.take() {
            let _ = fs::remove_file(path);
        }
        self.bound_addr = None;
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;

    #[test]
    fn binding_without_an_address_is_an_error() {
        let mut sock = Socket::new("empty");
        match sock.bind() {
            Err(Error::SocketConfig(_)) => (),
            other => panic!("expected SocketConfig, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wildcard_port_reports_the_bound_address() {
        let mut sock = Socket::new("anyport");
        sock.service = Some(String::from("0"));
        sock.bind().unwrap();
        let addr = sock.bound_addr().unwrap();
        assert!(addr.port() != 0);
        assert!(sock.is_bound());
        assert!(sock.fd().is_some());
    }

    #[test]
    fn double_bind_is_rejected() {
        let mut sock = Socket::new("twice");
        sock.service = Some(String::from("0"));
        sock.bind().unwrap();
        let first_fd = sock.fd();
        match sock.bind() {
            Err(Error::SocketBound(_)) => (),
            other => panic!("expected SocketBound, got {:?}", other.map(|_| ())),
        }
        assert_eq!(sock.fd(), first_fd);
    }

    #[test]
    fn bound_socket_accepts_connections() {
        let mut sock = Socket::new("reachable");
        sock.service = Some(String::from("0"));
        sock.bind().unwrap();
        let addr = sock.bound_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();
    }
}
