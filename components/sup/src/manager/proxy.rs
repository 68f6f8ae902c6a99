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

//! Supervisor-side view of a proxy host.
//!
//! The proxy is spawned with three pipes dup2'd onto descriptors 3/4/5 and
//! told about them (and about every bound listening socket) through the
//! environment. From then on the supervisor only writes start/stop
//! records and reads status and log records back.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Stdio;

use libc;
use serde_json;
use time::{self, SteadyTime};

use core::lineio::{self, LineReader};
use core::os::fd;
use core::os::process::{self, Pid, Signal};
use error::{Error, Result};
use protocol::{self, Cmd, Command, LogRecord, Status, Stream};
use sys::exec;

/// How long a shutting-down proxy gets before the supervisor forces its
/// bookkeeping to "down".
pub const STOP_GRACE_SECS: i64 = 3;

pub struct Proxy {
    pub name: String,
    pub cmd: Option<Cmd>,
    pub env: HashMap<String, String>,
    /// Start the host lazily with its first service, stop it when the last
    /// one is down.
    pub auto: bool,
    pid: Option<Pid>,
    command: Option<File>,
    status: Option<LineReader<File>>,
    log: Option<LineReader<File>>,
    services: BTreeSet<String>,
    stopping: bool,
    stop_deadline: Option<SteadyTime>,
}

impl Proxy {
    pub fn new<T: Into<String>>(name: T) -> Proxy {
        Proxy {
            name: name.into(),
            cmd: None,
            env: HashMap::new(),
            auto: true,
            pid: None,
            command: None,
            status: None,
            log: None,
            services: BTreeSet::new(),
            stopping: false,
            stop_deadline: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.pid.is_some()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn attach_service(&mut self, svc: &str) {
        self.services.insert(svc.to_string());
    }

    pub fn detach_service(&mut self, svc: &str) {
        self.services.remove(svc);
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().cloned().collect()
    }

    /// Spawn the host process. `socket_fds` lists every bound listening
    /// socket to announce; the descriptors get their close-on-exec flag
    /// cleared in the child only.
    pub fn start(&mut self, socket_fds: &[(String, RawFd)]) -> Result<()> {
        if self.is_up() {
            return Err(Error::ProxyUp(self.name.clone()));
        }
        let cmd = match self.cmd {
            Some(ref cmd) if !cmd.is_empty() => cmd.clone(),
            _ => return Err(Error::EmptyCmd(self.name.clone())),
        };
        let (cmd_r, cmd_w) = fd::pipe()?;
        let (status_r, status_w) = fd::pipe()?;
        let (log_r, log_w) = fd::pipe()?;
        let mut child_cmd = exec::base_command(&cmd);
        child_cmd.stdin(Stdio::null());
        for (key, val) in self.env.iter() {
            child_cmd.env(key, val);
        }
        child_cmd.env(protocol::COMMAND_FD_ENVVAR, protocol::COMMAND_FD.to_string());
        child_cmd.env(protocol::STATUS_FD_ENVVAR, protocol::STATUS_FD.to_string());
        child_cmd.env(protocol::LOG_FD_ENVVAR, protocol::LOG_FD.to_string());
        for &(ref sock_name, sock_fd) in socket_fds {
            child_cmd.env(protocol::sock_env_var(sock_name), sock_fd.to_string());
        }
        let inherited: Vec<RawFd> = socket_fds.iter().map(|&(_, sock_fd)| sock_fd).collect();
        unsafe {
            child_cmd.pre_exec(move || {
                libc::setsid();
                place_pipes(cmd_r, status_w, log_w)?;
                for &sock_fd in &inherited {
                    clear_cloexec_raw(sock_fd)?;
                }
                Ok(())
            });
        }
        let child = match child_cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                for pipe_fd in &[cmd_r, cmd_w, status_r, status_w, log_r, log_w] {
                    fd::close(*pipe_fd);
                }
                return Err(Error::Spawn(self.name.clone(), e));
            }
        };
        // Our copies of the child's pipe ends are no longer needed.
        fd::close(cmd_r);
        fd::close(status_w);
        fd::close(log_w);
        fd::set_nonblocking(status_r, true)?;
        fd::set_nonblocking(log_r, true)?;
        self.pid = Some(child.id() as Pid);
        self.command = Some(lineio::file_from_fd(cmd_w));
        self.status = Some(LineReader::new(lineio::file_from_fd(status_r)));
        self.log = Some(LineReader::new(lineio::file_from_fd(log_r)));
        self.stopping = false;
        self.stop_deadline = None;
        info!("proxy {} started with pid {}", self.name, child.id());
        Ok(())
    }

    pub fn send(&mut self, record: &Command) -> Result<()> {
        let name = self.name.clone();
        let line = serde_json::to_string(record).map_err(|e| {
            Error::ProxyPipe(name.clone(), io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        match self.command {
            Some(ref mut pipe) => {
                writeln!(pipe, "{}", line).map_err(|e| Error::ProxyPipe(name, e))
            }
            None => Err(Error::ProxyDown(name)),
        }
    }

    /// Drain both inbound pipes. Unparsable log lines are attributed to
    /// nobody rather than dropped.
    pub fn poll(&mut self) -> (Vec<Status>, Vec<LogRecord>) {
        let mut statuses = Vec::new();
        let mut records = Vec::new();
        if let Some(ref mut status) = self.status {
            for line in status.poll() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Status>(&line) {
                    Ok(st) => statuses.push(st),
                    Err(err) => warn!(
                        "proxy {}: undecodable status record ({}): {}",
                        self.name, err, line
                    ),
                }
            }
        }
        if let Some(ref mut log) = self.log {
            for line in log.poll() {
                match LogRecord::parse(&line) {
                    Some(record) => records.push(record),
                    None => records.push(LogRecord {
                        stream: Stream::Out,
                        name: None,
                        line: line,
                    }),
                }
            }
        }
        (statuses, records)
    }

    /// Did the status pipe reach EOF? The host is gone or going.
    pub fn status_eof(&self) -> bool {
        self.status.as_ref().map_or(false, |s| s.is_eof())
    }

    /// Orderly shutdown: stop every service the host knows, close the
    /// command pipe, TERM the host, and bound the whole affair with a
    /// timer in case it never obliges.
    pub fn begin_shutdown(&mut self) {
        if self.stopping || self.pid.is_none() {
            return;
        }
        info!("shutting down proxy {}", self.name);
        let names = self.service_names();
        for name in names {
            let _ = self.send(&Command::Stop { name: name });
        }
        self.command = None;
        if let Some(pid) = self.pid {
            if let Err(err) = process::signal(pid, Signal::TERM) {
                warn!("proxy {}: {}", self.name, err);
            }
        }
        self.stopping = true;
        self.stop_deadline =
            Some(SteadyTime::now() + time::Duration::seconds(STOP_GRACE_SECS));
    }

    pub fn force_down_due(&self, now: SteadyTime) -> bool {
        self.pid.is_some() && self.stopping && self.stop_deadline.map_or(false, |d| now >= d)
    }

    /// Clear all supervisor-side bookkeeping; the host is down.
    pub fn mark_down(&mut self) {
        self.pid = None;
        self.command = None;
        self.status = None;
        self.log = None;
        self.stopping = false;
        self.stop_deadline = None;
    }

    pub fn status_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.name,
            if self.is_up() { "up" } else { "down" },
            self.pid.map_or(String::new(), |p| p.to_string())
        )
    }

    /// The proxy column of `status`/`desc` lines: the name, with a
    /// trailing `!` when the host is not actually running.
    pub fn as_text(&self) -> String {
        if self.is_up() {
            self.name.clone()
        } else {
            format!("{}!", self.name)
        }
    }
}

/// Lift all three child-side pipe ends above the well-known range, then
/// dup2 them into place. Lifting first keeps one dup2 from clobbering
/// another's source when a pipe end happened to be allocated at 3, 4 or 5.
fn place_pipes(cmd_r: RawFd, status_w: RawFd, log_w: RawFd) -> io::Result<()> {
    let high_cmd = lift(cmd_r)?;
    let high_status = lift(status_w)?;
    let high_log = lift(log_w)?;
    place(high_cmd, protocol::COMMAND_FD)?;
    place(high_status, protocol::STATUS_FD)?;
    place(high_log, protocol::LOG_FD)?;
    unsafe {
        libc::close(high_cmd);
        libc::close(high_status);
        libc::close(high_log);
    }
    Ok(())
}

fn lift(src: RawFd) -> io::Result<RawFd> {
    match unsafe { libc::fcntl(src, libc::F_DUPFD, 10) } {
        -1 => Err(io::Error::last_os_error()),
        high => Ok(high),
    }
}

fn place(src: RawFd, target: RawFd) -> io::Result<()> {
    match unsafe { libc::dup2(src, target) } {
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

fn clear_cloexec_raw(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        match libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) {
            -1 => Err(io::Error::last_os_error()),
            _ => Ok(()),
        }
    }
}
