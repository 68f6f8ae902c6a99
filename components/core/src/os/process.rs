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

use std::fmt::{self, Display, Formatter};
use std::io;

use libc::{self, c_int, pid_t};

use crate::error::{Error, Result};

pub type Pid = pid_t;

#[allow(non_snake_case)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Signal {
    INT,
    KILL,
    TERM,
    HUP,
    QUIT,
    USR1,
    USR2,
    CHLD,
}

impl From<Signal> for i32 {
    fn from(value: Signal) -> i32 {
        match value {
            Signal::HUP => libc::SIGHUP,
            Signal::INT => libc::SIGINT,
            Signal::QUIT => libc::SIGQUIT,
            Signal::KILL => libc::SIGKILL,
            Signal::USR1 => libc::SIGUSR1,
            Signal::USR2 => libc::SIGUSR2,
            Signal::TERM => libc::SIGTERM,
            Signal::CHLD => libc::SIGCHLD,
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match *self {
            Signal::HUP => "HUP",
            Signal::INT => "INT",
            Signal::QUIT => "QUIT",
            Signal::KILL => "KILL",
            Signal::USR1 => "USR1",
            Signal::USR2 => "USR2",
            Signal::TERM => "TERM",
            Signal::CHLD => "CHLD",
        };
        write!(f, "{}", s)
    }
}

pub fn current_pid() -> Pid {
    unsafe { libc::getpid() }
}

/// Is the process identified by this pid still around?
pub fn is_alive(pid: Pid) -> bool {
    match unsafe { libc::kill(pid, 0) } {
        0 => true,
        _ => {
            let err = io::Error::last_os_error();
            err.raw_os_error() == Some(libc::EPERM)
        }
    }
}

/// Send a signal to a single process.
pub fn signal(pid: Pid, sig: Signal) -> Result<()> {
    match unsafe { libc::kill(pid, sig.into()) } {
        0 => Ok(()),
        _ => Err(Error::SignalFailed(pid, io::Error::last_os_error())),
    }
}

/// Send a signal to the whole process group of `pid`.
///
/// The group identity is computed from the child's pid, never from our own,
/// so the supervisor cannot end up signaling itself.
pub fn signal_group(pid: Pid, sig: Signal) -> Result<()> {
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid <= 0 {
        // The group is already gone; fall back to the pid itself.
        return signal(pid, sig);
    }
    debug!("signaling process group {} (from pid {}) with {}", pgid, pid, sig);
    match unsafe { libc::kill(-pgid, sig.into()) } {
        0 => Ok(()),
        _ => Err(Error::SignalFailed(pid, io::Error::last_os_error())),
    }
}

/// Non-blocking wait on one child. Returns the raw wait status when the
/// child has exited, `None` while it is still running.
pub fn try_wait(pid: Pid) -> Result<Option<c_int>> {
    let mut status = 0 as c_int;
    match unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) } {
        0 => Ok(None),
        -1 => Err(Error::WaitFailed(pid, io::Error::last_os_error())),
        _ => Ok(Some(status)),
    }
}

/// Non-blocking wait on any child of the calling process. Returns the pid
/// and raw wait status of one exited child, `None` when nothing is waiting.
pub fn try_wait_any() -> Result<Option<(Pid, c_int)>> {
    let mut status = 0 as c_int;
    match unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) } {
        0 => Ok(None),
        -1 => {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ECHILD) {
                Ok(None)
            } else {
                Err(Error::WaitFailed(-1, err))
            }
        }
        pid => Ok(Some((pid, status))),
    }
}

/// A child exit is "normal" when the program exited 0 or was terminated by
/// SIGTERM; every other wait status is a failure.
pub fn exited_normally(status: c_int) -> bool {
    if libc::WIFEXITED(status) {
        return libc::WEXITSTATUS(status) == 0;
    }
    if libc::WIFSIGNALED(status) {
        return libc::WTERMSIG(status) == libc::SIGTERM;
    }
    false
}

/// Human-readable failure reason for an abnormal wait status. These strings
/// are part of the `status` command output.
pub fn exit_reason(status: c_int) -> Option<String> {
    let mut parts = Vec::new();
    if libc::WIFEXITED(status) {
        let code = libc::WEXITSTATUS(status);
        if code != 0 {
            parts.push(format!("Exited with error {}", code));
        }
    }
    if libc::WIFSIGNALED(status) {
        parts.push(format!("Received signal {}", libc::WTERMSIG(status)));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" - "))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use libc;

    fn exited(code: i32) -> i32 {
        (code & 0xff) << 8
    }

    fn signaled(sig: i32) -> i32 {
        sig & 0x7f
    }

    #[test]
    fn clean_exit_is_normal() {
        assert!(exited_normally(exited(0)));
        assert_eq!(exit_reason(exited(0)), None);
    }

    #[test]
    fn sigterm_is_normal() {
        assert!(exited_normally(signaled(libc::SIGTERM)));
    }

    #[test]
    fn error_exit_is_abnormal() {
        let status = exited(255);
        assert!(!exited_normally(status));
        assert_eq!(exit_reason(status).unwrap(), "Exited with error 255");
    }

    #[test]
    fn sigkill_is_abnormal() {
        let status = signaled(libc::SIGKILL);
        assert!(!exited_normally(status));
        assert_eq!(exit_reason(status).unwrap(), "Received signal 9");
    }

    #[test]
    fn we_are_alive() {
        assert!(is_alive(current_pid()));
    }
}
