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

//! Direct child spawning for services that run without a proxy host.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};

use libc;

use core::lineio::LineReader;
use core::os::fd;
use core::os::process::Pid;
use core::os::users;
use core::{ENABLED_ENVVAR, HOME_ENVVAR, SERVICE_ENVVAR};
use error::{Error, Result};
use manager::service::Service;
use protocol::Cmd;

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

/// Fork and exec one service child.
///
/// The child gets its own session unless `no_new_session`, default signal
/// dispositions, the service env overlay plus the injected variables, and
/// stdio per the service configuration. `stdin_fd` is the bound listening
/// descriptor of a `tie_stdin_to` socket, already resolved by the caller.
pub fn run(
    svc: &Service,
    stdin_fd: Option<RawFd>,
    home: &Path,
) -> Result<(
    Pid,
    Option<LineReader<ChildStdout>>,
    Option<LineReader<ChildStderr>>,
)> {
    let cmd = match svc.cmd {
        Some(ref cmd) => cmd,
        None => return Err(Error::EmptyCmd(svc.name.clone())),
    };
    debug!("spawning {} ({})", svc.name, cmd);
    let mut command = base_command(cmd);
    match stdin_fd {
        Some(sock_fd) => {
            // A plain dup: the child owns its copy, the registry keeps the
            // original for the next spawn.
            let copy = fd::dup(sock_fd)?;
            command.stdin(unsafe { Stdio::from_raw_fd(copy) });
        }
        None => {
            command.stdin(Stdio::null());
        }
    }
    command.stdout(if svc.ignore_stdout {
        Stdio::null()
    } else {
        Stdio::piped()
    });
    command.stderr(if svc.ignore_stderr {
        Stdio::null()
    } else {
        Stdio::piped()
    });
    if let Some(ref dir) = svc.cwd {
        command.current_dir(dir);
    }
    for (key, val) in svc.env.iter() {
        command.env(key, val);
    }
    command.env(ENABLED_ENVVAR, "1");
    command.env(SERVICE_ENVVAR, &svc.name);
    command.env(HOME_ENVVAR, home);
    if let Some(ref user) = svc.user {
        let uid = users::get_uid_by_name(user)
            .ok_or_else(|| Error::Core(::core::Error::UserNotFound(user.clone())))?;
        command.uid(uid);
    }
    if let Some(ref group) = svc.group {
        let gid = users::get_gid_by_name(group)
            .ok_or_else(|| Error::Core(::core::Error::GroupNotFound(group.clone())))?;
        command.gid(gid);
    }
    let no_new_session = svc.no_new_session;
    let priority = svc.priority;
    unsafe {
        command.pre_exec(move || {
            if !no_new_session {
                libc::setsid();
            }
            if let Some(prio) = priority {
                // absolute niceness target, not a delta on ours
                if libc::setpriority(libc::PRIO_PROCESS as _, 0, prio) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            reset_signals();
            Ok(())
        });
    }
    let mut child = command
        .spawn()
        .map_err(|e| Error::Spawn(svc.name.clone(), e))?;
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
    Ok((pid, stdout, stderr))
}

/// The supervisor traps HUP/INT/TERM/USR1/CHLD and ignores PIPE; children
/// must not inherit any of that.
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
