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

use std::io;
use std::os::unix::io::RawFd;

use libc;

use crate::error::{Error, Result};

/// Set or clear `FD_CLOEXEC`. Descriptors handed to children over `exec`
/// must have the flag cleared explicitly.
pub fn set_cloexec(fd: RawFd, on: bool) -> Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(Error::Fcntl(io::Error::last_os_error()));
        }
        let flags = if on {
            flags | libc::FD_CLOEXEC
        } else {
            flags & !libc::FD_CLOEXEC
        };
        match libc::fcntl(fd, libc::F_SETFD, flags) {
            -1 => Err(Error::Fcntl(io::Error::last_os_error())),
            _ => Ok(()),
        }
    }
}

/// Set or clear `O_NONBLOCK`.
pub fn set_nonblocking(fd: RawFd, on: bool) -> Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(Error::Fcntl(io::Error::last_os_error()));
        }
        let flags = if on {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        match libc::fcntl(fd, libc::F_SETFL, flags) {
            -1 => Err(Error::Fcntl(io::Error::last_os_error())),
            _ => Ok(()),
        }
    }
}

/// `dup(2)`; the copy does not carry `FD_CLOEXEC`.
pub fn dup(fd: RawFd) -> Result<RawFd> {
    match unsafe { libc::dup(fd) } {
        -1 => Err(Error::Fcntl(io::Error::last_os_error())),
        copy => Ok(copy),
    }
}

/// Duplicate `fd` to a descriptor numbered at least `min`, close-on-exec.
/// Long-lived descriptors are kept out of the low range so children can
/// `dup2` inherited pipes onto well-known numbers without clobbering them.
pub fn dup_above(fd: RawFd, min: RawFd) -> Result<RawFd> {
    match unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, min) } {
        -1 => Err(Error::Fcntl(io::Error::last_os_error())),
        copy => Ok(copy),
    }
}

/// A pipe pair `(read, write)`, both ends close-on-exec. Children that
/// should inherit an end get it `dup2`'d into place after fork.
pub fn pipe() -> Result<(RawFd, RawFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    match unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } {
        -1 => Err(Error::Pipe(io::Error::last_os_error())),
        _ => Ok((fds[0], fds[1])),
    }
}

pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use libc;

    #[test]
    fn pipe_ends_are_cloexec() {
        let (r, w) = pipe().unwrap();
        unsafe {
            assert!(libc::fcntl(r, libc::F_GETFD) & libc::FD_CLOEXEC != 0);
            assert!(libc::fcntl(w, libc::F_GETFD) & libc::FD_CLOEXEC != 0);
        }
        close(r);
        close(w);
    }

    #[test]
    fn cloexec_can_be_cleared() {
        let (r, w) = pipe().unwrap();
        set_cloexec(r, false).unwrap();
        unsafe {
            assert!(libc::fcntl(r, libc::F_GETFD) & libc::FD_CLOEXEC == 0);
        }
        close(r);
        close(w);
    }

    #[test]
    fn nonblocking_can_be_toggled() {
        let (r, w) = pipe().unwrap();
        set_nonblocking(r, true).unwrap();
        unsafe {
            assert!(libc::fcntl(r, libc::F_GETFL) & libc::O_NONBLOCK != 0);
        }
        set_nonblocking(r, false).unwrap();
        unsafe {
            assert!(libc::fcntl(r, libc::F_GETFL) & libc::O_NONBLOCK == 0);
        }
        close(r);
        close(w);
    }
}
