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

use std::collections::HashMap;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use serde_json;
use time::{self, SteadyTime};

use core::lineio::{self, LineReader};
use core::os::fd;
use core::os::process::{self, Pid};
use core::os::signals;
use error::{Error, Result};
use protocol::{self, Command, LogRecord, Spawn, Status};
use service::{self, Service};

const TICK_MS: u64 = 10;
/// Grace period between TERM and KILL while the host shuts down.
const SHUTDOWN_TERM_SECS: i64 = 2;
/// How long we keep waiting for kills to be reaped before giving up.
const SHUTDOWN_KILL_SECS: i64 = 1;
/// Exits observed before their registration are held this long for the
/// matching `start` to show up.
const BLACKLIST_AGE_SECS: i64 = 5;

enum TickState {
    Continue,
    Exit(i32),
}

pub struct Server {
    services: HashMap<String, Service>,
    command: LineReader<File>,
    status: File,
    log: File,
    /// Wait statuses reaped before the owning service was registered,
    /// keyed by pid.
    blacklist: HashMap<Pid, (i32, SteadyTime)>,
    stopping: bool,
    term_deadline: Option<SteadyTime>,
    kill_deadline: Option<SteadyTime>,
    /// Image shared with every forked service; opaque to the host itself.
    preload: Option<Vec<u8>>,
}

pub fn run(args: Vec<String>) -> Result<i32> {
    signals::init_proxy()?;
    let mut server = Server::new(args)?;
    loop {
        match server.tick() {
            TickState::Continue => thread::sleep(Duration::from_millis(TICK_MS)),
            TickState::Exit(code) => return Ok(code),
        }
    }
}

impl Server {
    pub fn new(args: Vec<String>) -> Result<Server> {
        let preload = match preload_path(&args) {
            Some(path) => {
                let image = fs::read(&path).map_err(|e| Error::Preload(path.clone(), e))?;
                info!("preloaded {} bytes from {}", image.len(), path);
                Some(image)
            }
            None => None,
        };
        let command_fd = pipe_fd_from_env(protocol::COMMAND_FD_ENVVAR)?;
        let status_fd = pipe_fd_from_env(protocol::STATUS_FD_ENVVAR)?;
        let log_fd = pipe_fd_from_env(protocol::LOG_FD_ENVVAR)?;
        fd::set_nonblocking(command_fd, true)?;
        Ok(Server {
            services: HashMap::new(),
            command: LineReader::new(lineio::file_from_fd(command_fd)),
            status: lineio::file_from_fd(status_fd),
            log: lineio::file_from_fd(log_fd),
            blacklist: HashMap::new(),
            stopping: false,
            term_deadline: None,
            kill_deadline: None,
            preload: preload,
        })
    }

    /// Size of the preloaded image, when one was requested.
    pub fn preload_size(&self) -> Option<usize> {
        self.preload.as_ref().map(|image| image.len())
    }

    fn tick(&mut self) -> TickState {
        if signals::pending_shutdown() && !self.stopping {
            info!("received TERM, shutting down");
            self.begin_shutdown();
        }
        signals::take_sigchld();
        self.handle_commands();
        self.pump_output();
        self.reap_children();
        self.expire_blacklist();
        if self.command.is_eof() && !self.stopping {
            info!("command pipe closed, shutting down");
            self.begin_shutdown();
        }
        if self.stopping {
            return self.tick_shutdown();
        }
        TickState::Continue
    }

    fn handle_commands(&mut self) {
        let lines = self.command.poll();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(Command::Start(spawn)) => self.start_service(spawn),
                Ok(Command::Stop { name }) => self.stop_service(&name),
                Err(err) => warn!("discarding undecodable command ({}): {}", err, line),
            }
        }
    }

    fn start_service(&mut self, spawn: Spawn) {
        let name = spawn.name.clone();
        if self.services.contains_key(&name) {
            warn!("service {} is already running, ignoring start", name);
            return;
        }
        match service::run(spawn) {
            Ok(svc) => {
                let pid = svc.id();
                self.report(Status::Started {
                    name: name.clone(),
                    pid: pid as i32,
                });
                match self.blacklist.remove(&pid) {
                    Some((status, _)) => {
                        debug!("pid {} exited before registration, reconciling", pid);
                        self.report(Status::Stopped {
                            name: name,
                            status: status,
                        });
                    }
                    None => {
                        self.services.insert(name, svc);
                    }
                }
            }
            Err(err) => {
                warn!("unable to spawn {}: {}", name, err);
                // Keep the started-before-stopped ordering even for a spawn
                // that never produced a child; pid 0 marks the failure.
                self.report(Status::Started {
                    name: name.clone(),
                    pid: 0,
                });
                self.report(Status::Stopped {
                    name: name,
                    status: 127 << 8,
                });
            }
        }
    }

    fn stop_service(&mut self, name: &str) {
        match self.services.get(name) {
            Some(svc) => svc.terminate(),
            None => warn!("stop for unknown service {}", name),
        }
    }

    fn reap_children(&mut self) {
        loop {
            match process::try_wait_any() {
                Ok(Some((pid, status))) => match self.name_of_pid(pid) {
                    Some(name) => {
                        let mut svc = match self.services.remove(&name) {
                            Some(svc) => svc,
                            None => continue,
                        };
                        for record in svc.poll_output() {
                            self.write_log(record);
                        }
                        debug!("service {} (pid {}) exited with {}", name, pid, status);
                        self.report(Status::Stopped {
                            name: name,
                            status: status,
                        });
                    }
                    None => {
                        debug!("reaped unregistered pid {}, blacklisting", pid);
                        self.blacklist.insert(pid, (status, SteadyTime::now()));
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("unable to reap children, {}", err);
                    break;
                }
            }
        }
    }

    fn pump_output(&mut self) {
        let mut records = Vec::new();
        for svc in self.services.values_mut() {
            records.extend(svc.poll_output());
        }
        for record in records {
            self.write_log(record);
        }
    }

    fn expire_blacklist(&mut self) {
        let horizon = SteadyTime::now() - time::Duration::seconds(BLACKLIST_AGE_SECS);
        self.blacklist.retain(|_, entry| entry.1 > horizon);
    }

    fn begin_shutdown(&mut self) {
        self.stopping = true;
        self.term_deadline = Some(SteadyTime::now() + time::Duration::seconds(SHUTDOWN_TERM_SECS));
        for svc in self.services.values() {
            svc.terminate();
        }
    }

    fn tick_shutdown(&mut self) -> TickState {
        if self.services.is_empty() {
            return TickState::Exit(0);
        }
        let now = SteadyTime::now();
        match self.kill_deadline {
            Some(deadline) => {
                if now >= deadline {
                    warn!("{} services survived SIGKILL, leaving", self.services.len());
                    return TickState::Exit(1);
                }
            }
            None => {
                if self.term_deadline.map_or(false, |d| now >= d) {
                    for svc in self.services.values() {
                        svc.kill();
                    }
                    self.kill_deadline =
                        Some(now + time::Duration::seconds(SHUTDOWN_KILL_SECS));
                }
            }
        }
        TickState::Continue
    }

    fn name_of_pid(&self, pid: Pid) -> Option<String> {
        self.services
            .values()
            .find(|svc| svc.id() == pid)
            .map(|svc| svc.name().to_string())
    }

    fn report(&mut self, status: Status) {
        let line = match serde_json::to_string(&status) {
            Ok(line) => line,
            Err(err) => {
                warn!("unable to encode status record, {}", err);
                return;
            }
        };
        if let Err(err) = writeln!(self.status, "{}", line) {
            warn!("status pipe write failed ({}), shutting down", err);
            if !self.stopping {
                self.begin_shutdown();
            }
        }
    }

    fn write_log(&mut self, record: LogRecord) {
        if let Err(err) = writeln!(self.log, "{}", record.render()) {
            warn!("log pipe write failed ({}), shutting down", err);
            if !self.stopping {
                self.begin_shutdown();
            }
        }
    }
}

fn preload_path(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--preload" {
            return iter.next().cloned();
        }
    }
    None
}

fn pipe_fd_from_env(var: &str) -> Result<RawFd> {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<RawFd>().ok())
        .ok_or_else(|| Error::BadPipeEnv(var.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preload_flag_takes_the_next_argument() {
        let args = vec![
            "--preload".to_string(),
            "/tmp/image.bin".to_string(),
        ];
        assert_eq!(preload_path(&args), Some("/tmp/image.bin".to_string()));
    }

    #[test]
    fn missing_preload_value_is_none() {
        assert_eq!(preload_path(&["--preload".to_string()]), None);
        assert_eq!(preload_path(&[]), None);
    }

    #[test]
    fn pipe_fds_come_from_the_environment() {
        env::set_var("_CFK_TEST_FD", "7");
        assert_eq!(pipe_fd_from_env("_CFK_TEST_FD").unwrap(), 7);
        env::remove_var("_CFK_TEST_FD");
        assert!(pipe_fd_from_env("_CFK_TEST_FD").is_err());
    }
}
