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

//! The admin console: a line-oriented CRLF protocol over a UNIX or TCP
//! stream socket. Everything is nonblocking and serviced from the event
//! loop; per-connection writes are serialized through an output buffer.

use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use error::{Error, Result};

pub struct Console {
    pub host: Option<String>,
    /// A TCP port number, or a filesystem path for a UNIX socket.
    pub service: Option<String>,
    /// Full consoles may mutate configuration; others only get `command`
    /// verbs.
    pub full: bool,
    started: bool,
    listener: Option<Listener>,
    clients: Vec<Client>,
    next_client: u64,
    default_path: Option<PathBuf>,
    unix_path: Option<PathBuf>,
    bound_addr: Option<SocketAddr>,
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

struct Client {
    id: u64,
    stream: ClientStream,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>,
    close_after_flush: bool,
    dead: bool,
}

enum ClientStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            ClientStream::Tcp(ref mut s) => s.read(buf),
            ClientStream::Unix(ref mut s) => s.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            ClientStream::Tcp(ref mut s) => s.write(buf),
            ClientStream::Unix(ref mut s) => s.write(buf),
        }
    }
}

impl Console {
    pub fn new() -> Console {
        Console {
            host: None,
            service: None,
            full: true,
            started: false,
            listener: None,
            clients: Vec::new(),
            next_client: 1,
            default_path: None,
            unix_path: None,
            bound_addr: None,
        }
    }

    /// Where to bind when no explicit address was configured; the manager
    /// points this at `<home>/sock`.
    pub fn set_default_path(&mut self, path: PathBuf) {
        self.default_path = Some(path);
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Actual TCP address after a wildcard-port bind.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    pub fn configure(&mut self, attr: &str, value: &str) -> Result<()> {
        if self.started {
            return Err(Error::ConsoleStarted);
        }
        match attr {
            "host" => {
                self.host = opt_string(value);
                Ok(())
            }
            "service" | "address" => {
                self.set_address(value);
                Ok(())
            }
            "full" => match ::command::parse_bool(value) {
                Some(full) => {
                    self.full = full;
                    Ok(())
                }
                None => Err(Error::BadValue(attr.to_string(), value.to_string())),
            },
            _ => Err(Error::InvalidProperty(attr.to_string())),
        }
    }

    /// Accepts `host:port`, a bare port, or a filesystem path.
    pub fn set_address(&mut self, addr: &str) {
        if addr.is_empty() {
            self.service = None;
            return;
        }
        let mut parts = addr.rsplitn(2, ':');
        let last = parts.next().unwrap_or("");
        match parts.next() {
            Some(host) if last.parse::<u16>().is_ok() => {
                self.host = opt_string(host);
                self.service = Some(last.to_string());
            }
            _ => {
                self.service = Some(addr.to_string());
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::ConsoleStarted);
        }
        let listener = match self.service.clone() {
            Some(ref service) if service.parse::<u16>().is_ok() => self.start_tcp(service)?,
            Some(ref path) => self.start_unix(PathBuf::from(path))?,
            None => {
                let path = match self.default_path.clone() {
                    Some(path) => path,
                    None => {
                        return Err(Error::ConsoleIo(io::Error::new(
                            ErrorKind::NotFound,
                            "no console address configured",
                        )))
                    }
                };
                self.start_unix(path)?
            }
        };
        self.listener = Some(listener);
        self.started = true;
        Ok(())
    }

    fn start_tcp(&mut self, port: &str) -> Result<Listener> {
        let host = self.host.clone().unwrap_or_else(|| String::from("127.0.0.1"));
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(addr.as_str()).map_err(Error::ConsoleIo)?;
        listener.set_nonblocking(true).map_err(Error::ConsoleIo)?;
        self.bound_addr = listener.local_addr().ok();
        info!(
            "admin console listening on {}",
            self.bound_addr
                .map_or_else(|| addr.clone(), |a| a.to_string())
        );
        Ok(Listener::Tcp(listener))
    }

    fn start_unix(&mut self, path: PathBuf) -> Result<Listener> {
        let _ = fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(Error::ConsoleIo)?;
        listener.set_nonblocking(true).map_err(Error::ConsoleIo)?;
        info!("admin console listening on {}", path.display());
        self.unix_path = Some(path);
        Ok(Listener::Unix(listener))
    }

    pub fn stop(&mut self) {
        self.listener = None;
        self.clients.clear();
        self.started = false;
        if let Some(path) = self.unix_path.take() {
            let _ = fs::remove_file(path);
        }
    }

    /// Accept whoever is waiting and return every complete command line
    /// received this tick, tagged with its client id.
    pub fn poll_lines(&mut self) -> Vec<(u64, String)> {
        self.accept_new();
        let mut lines = Vec::new();
        for client in self.clients.iter_mut() {
            for line in client.poll() {
                lines.push((client.id, line));
            }
        }
        lines
    }

    fn accept_new(&mut self) {
        loop {
            let stream = match self.listener {
                Some(Listener::Tcp(ref listener)) => match listener.accept() {
                    Ok((stream, _)) => {
                        if stream.set_nonblocking(true).is_err() {
                            continue;
                        }
                        ClientStream::Tcp(stream)
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => {
                        warn!("console accept failed: {}", err);
                        break;
                    }
                },
                Some(Listener::Unix(ref listener)) => match listener.accept() {
                    Ok((stream, _)) => {
                        if stream.set_nonblocking(true).is_err() {
                            continue;
                        }
                        ClientStream::Unix(stream)
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => {
                        warn!("console accept failed: {}", err);
                        break;
                    }
                },
                None => break,
            };
            let id = self.next_client;
            self.next_client += 1;
            debug!("console client {} connected", id);
            self.clients.push(Client {
                id: id,
                stream: stream,
                inbuf: Vec::new(),
                outbuf: Vec::new(),
                close_after_flush: false,
                dead: false,
            });
        }
    }

    /// Queue a reply for one client; the terminating CRLF is appended
    /// here.
    pub fn respond(&mut self, id: u64, text: &str) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.id == id) {
            client.outbuf.extend_from_slice(text.as_bytes());
            client.outbuf.extend_from_slice(b"\r\n");
        }
    }

    /// The client sent `exit`: drain the write queue, then close.
    pub fn close_client(&mut self, id: u64) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.id == id) {
            client.close_after_flush = true;
        }
    }

    /// Push buffered output and drop finished or broken connections.
    pub fn flush(&mut self) {
        for client in self.clients.iter_mut() {
            client.flush();
        }
        self.clients
            .retain(|c| !c.dead && !(c.close_after_flush && c.outbuf.is_empty()));
    }
}

impl Client {
    fn poll(&mut self) -> Vec<String> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.dead = true;
                    break;
                }
                Ok(n) => self.inbuf.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.dead = true;
                    break;
                }
            }
        }
        let mut lines = Vec::new();
        while let Some(pos) = self.inbuf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.inbuf.drain(..pos + 1).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    fn flush(&mut self) {
        while !self.outbuf.is_empty() {
            match self.stream.write(&self.outbuf) {
                Ok(0) => {
                    self.dead = true;
                    break;
                }
                Ok(n) => {
                    self.outbuf.drain(..n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.dead = true;
                    break;
                }
            }
        }
    }
}

fn opt_string(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn started_tcp_console() -> Console {
        let mut console = Console::new();
        console.set_address("127.0.0.1:0");
        console.start().unwrap();
        console
    }

    fn poll_for_line(console: &mut Console) -> (u64, String) {
        for _ in 0..200 {
            let mut lines = console.poll_lines();
            if !lines.is_empty() {
                return lines.remove(0);
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("no line arrived");
    }

    #[test]
    fn address_forms_parse() {
        let mut console = Console::new();
        console.set_address("0.0.0.0:9001");
        assert_eq!(console.host, Some(String::from("0.0.0.0")));
        assert_eq!(console.service, Some(String::from("9001")));
        console.set_address("/tmp/cfk-test.sock");
        assert_eq!(console.service, Some(String::from("/tmp/cfk-test.sock")));
    }

    #[test]
    fn configure_after_start_is_rejected() {
        let mut console = started_tcp_console();
        match console.configure("host", "0.0.0.0") {
            Err(Error::ConsoleStarted) => (),
            other => panic!("expected ConsoleStarted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wildcard_port_reports_back() {
        let console = started_tcp_console();
        assert!(console.bound_addr().unwrap().port() != 0);
    }

    #[test]
    fn lines_round_trip_with_crlf() {
        let mut console = started_tcp_console();
        let addr = console.bound_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"command version\r\n").unwrap();
        let (id, line) = poll_for_line(&mut console);
        assert_eq!(line, "command version");
        console.respond(id, "0.2.0\r\nOK");
        console.flush();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut reply = Vec::new();
        let mut chunk = [0u8; 64];
        while !reply.ends_with(b"OK\r\n") {
            let n = client.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed early");
            reply.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(&reply[..], b"0.2.0\r\nOK\r\n");
    }

    #[test]
    fn two_clients_are_kept_apart() {
        let mut console = started_tcp_console();
        let addr = console.bound_addr().unwrap();
        let mut first = TcpStream::connect(addr).unwrap();
        let mut second = TcpStream::connect(addr).unwrap();
        first.write_all(b"one\r\n").unwrap();
        let (first_id, line) = poll_for_line(&mut console);
        assert_eq!(line, "one");
        second.write_all(b"two\r\n").unwrap();
        let (second_id, line) = poll_for_line(&mut console);
        assert_eq!(line, "two");
        assert!(first_id != second_id);
        drop(first);
        drop(second);
    }
}
