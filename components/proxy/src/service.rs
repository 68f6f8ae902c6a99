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

use std::env;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};

use libc;

use core::lineio::LineReader;
use core::os::fd;
use core::os::process::{self, Pid, Signal};
use error::{Error, Result};
use protocol::{self, Cmd, LogRecord, Spawn, Stream};

/// A service from the proxy host's perspective: a forked child whose
/// captured output is relayed line-by-line to the supervisor.
pub struct Service {
    spawn: Spawn,
    pid: Pid,
    stdout: Option<LineReader<ChildStdout>>,
    stderr: Option<LineReader<ChildStderr>>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.spawn.name
    }

    pub fn id(&self) -> Pid {
        self.pid
    }

    /// Deliver SIGTERM, to the whole process group when the service got its
    /// own session at spawn.
    pub fn terminate(&self) {
        let result = if self.spawn.no_new_session {
            process::signal(self.pid, Signal::TERM)
        } else {
            process::signal_group(self.pid, Signal::TERM)
        };
        if let Err(err) = result {
            warn!("unable to terminate {}: {}", self.spawn.name, err);
        }
    }

    pub fn kill(&self) {
        let result = if self.spawn.no_new_session {
            process::signal(self.pid, Signal::KILL)
        } else {
            process::signal_group(self.pid, Signal::KILL)
        };
        if let Err(err) = result {
            warn!("unable to kill {}: {}", self.spawn.name, err);
        }
    }

    /// Drain whatever the child has written since the last tick.
    pub fn poll_output(&mut self) -> Vec<LogRecord> {
        let name = self.spawn.name.clone();
        let mut records = Vec::new();
        if let Some(ref mut out) = self.stdout {
            for line in out.poll() {
                records.push(LogRecord {
                    stream: Stream::Out,
                    name: Some(name.clone()),
                    line: line,
                });
            }
        }
        if let Some(ref mut err) = self.stderr {
            for line in err.poll() {
                records.push(LogRecord {
                    stream: Stream::Err,
                    name: Some(name.clone()),
                    line: line,
                });
            }
        }
        records
    }
}

/// Fork and exec one service. The child gets the same preparation as the
/// supervisor's direct spawn path: its own session unless `no_new_session`,
/// default signal dispositions, the env overlay, and stdio routed per the
/// spawn record.
pub fn run(spawn: Spawn) -> Result<Service> {
    debug!("proxy host is spawning {}", spawn.name);
    let mut cmd = base_command(&spawn.cmd);
    match spawn.tie_stdin_to {
        Some(ref sock_name) => {
            let fd = inherited_sock_fd(sock_name)?;
            let fd = fd::dup(fd)?;
            cmd.stdin(unsafe { Stdio::from_raw_fd(fd) });
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }
    cmd.stdout(if spawn.ignore_stdout {
        Stdio::null()
    } else {
        Stdio::piped()
    });
    cmd.stderr(if spawn.ignore_stderr {
        Stdio::null()
    } else {
        Stdio::piped()
    });
    if let Some(ref dir) = spawn.cwd {
        cmd.current_dir(dir);
    }
    for (key, val) in spawn.env.iter() {
        cmd.env(key, val);
    }
    let no_new_session = spawn.no_new_session;
    unsafe {
        cmd.pre_exec(move || {
            if !no_new_session {
                libc::setsid();
            }
            reset_signals();
            Ok(())
        });
    }
    let mut child = cmd.spawn().map_err(Error::Spawn)?;
    let pid = child.id() as Pid;
    let stdout = match child.stdout.take() {
        Some(out) => {
            fd::set_nonblocking(out.as_raw_fd(), true)?;
            Some(LineReader::new(out))
        }
        None => None,
    };
    let stderr = match child.stderr.take() {
        Some(err) => {
            fd::set_nonblocking(err.as_raw_fd(), true)?;
            Some(LineReader::new(err))
        }
        None => None,
    };
    Ok(Service {
        spawn: spawn,
        pid: pid,
        stdout: stdout,
        stderr: stderr,
    })
}

pub fn base_command(cmd: &Cmd) -> Command {
    match *cmd {
        Cmd::Shell(ref line) => {
            let mut c = Command::new("/bin/sh");
            c.arg("-c").arg(line);
            c
        }
        Cmd::Argv(ref argv) => {
            let mut c = Command::new(&argv[0]);
            c.args(&argv[1..]);
            c
        }
    }
}

fn inherited_sock_fd(sock_name: &str) -> Result<RawFd> {
    let var = protocol::sock_env_var(sock_name);
    env::var(&var)
        .ok()
        .and_then(|v| v.parse::<RawFd>().ok())
        .ok_or_else(|| Error::NoSuchSocket(sock_name.to_string()))
}

/// Put the dispositions the supervisor (or this host) customized back to
/// their defaults before exec.
fn reset_signals() {
    unsafe {
        libc::signal(libc::SIGHUP, libc::SIG_DFL);
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGTERM, libc::SIG_DFL);
        libc::signal(libc::SIGUSR1, libc::SIG_DFL);
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}
