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

//! Incremental line reading over nonblocking descriptors.
//!
//! The event loop polls these readers every tick; a poll never blocks and
//! returns whatever complete lines have arrived since the last one.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::io::{FromRawFd, RawFd};

pub struct LineReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    /// The descriptor behind `inner` must already be in nonblocking mode.
    pub fn new(inner: R) -> LineReader<R> {
        LineReader {
            inner: inner,
            buf: Vec::new(),
            eof: false,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Drain everything currently readable and return the complete lines.
    /// A trailing unterminated chunk stays buffered until its newline (or
    /// EOF) arrives.
    pub fn poll(&mut self) -> Vec<String> {
        let mut chunk = [0u8; 4096];
        while !self.eof {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.eof = true;
                }
            }
        }
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..pos + 1).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.eof && !self.buf.is_empty() {
            let rest: Vec<u8> = self.buf.drain(..).collect();
            lines.push(String::from_utf8_lossy(&rest).into_owned());
        }
        lines
    }
}

/// Take ownership of a raw descriptor as a `File` suitable for a
/// `LineReader`.
pub fn file_from_fd(fd: RawFd) -> File {
    unsafe { File::from_raw_fd(fd) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os::fd;
    use std::io::Write;

    fn pair() -> (LineReader<File>, File) {
        let (r, w) = fd::pipe().unwrap();
        fd::set_nonblocking(r, true).unwrap();
        (LineReader::new(file_from_fd(r)), file_from_fd(w))
    }

    #[test]
    fn complete_lines_come_out_partial_lines_wait() {
        let (mut reader, mut writer) = pair();
        writer.write_all(b"one\ntwo\nthr").unwrap();
        assert_eq!(reader.poll(), vec!["one".to_string(), "two".to_string()]);
        assert_eq!(reader.poll(), Vec::<String>::new());
        writer.write_all(b"ee\n").unwrap();
        assert_eq!(reader.poll(), vec!["three".to_string()]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let (mut reader, mut writer) = pair();
        writer.write_all(b"hello\r\n").unwrap();
        assert_eq!(reader.poll(), vec!["hello".to_string()]);
    }

    #[test]
    fn eof_flushes_the_trailing_chunk() {
        let (mut reader, writer) = pair();
        {
            let mut w = writer;
            w.write_all(b"tail").unwrap();
        }
        assert_eq!(reader.poll(), vec!["tail".to_string()]);
        assert!(reader.is_eof());
    }

    #[test]
    fn empty_pipe_is_not_eof() {
        let (mut reader, _writer) = pair();
        assert_eq!(reader.poll(), Vec::<String>::new());
        assert!(!reader.is_eof());
    }
}
