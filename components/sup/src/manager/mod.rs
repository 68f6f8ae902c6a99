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

//! The controller: one process-wide registry of services, sockets and
//! proxies, plus the event loop everything converges on.
//!
//! Every transition happens on this loop. A tick drains signal flags,
//! reaps children, pumps pipes, fires timers and services the console;
//! nothing in here blocks.

pub mod proxy;
pub mod service;
pub mod socket;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::thread;
use std::time::Duration as StdDuration;

use time::{self, SteadyTime};

use command;
use config;
use console::Console;
use core::os::process::{self, Pid, Signal};
use core::os::signals;
use core::{ENABLED_ENVVAR, HOME_ENVVAR, SERVICE_ENVVAR};
use error::{Error, Result};
use logger::Logger;
use protocol::{Command as ProxyCommand, Spawn, Status};
use sys::exec;

use self::proxy::Proxy;
use self::service::{Followup, Service, State, StopOutcome};
use self::socket::Socket;

const TICK_MS: u64 = 10;
/// Hard ceiling on the shutdown drain; stopwait escalation and the proxy
/// grace timers normally finish the job well before this.
const SHUTDOWN_BACKSTOP_SECS: i64 = 30;

pub struct ManagerConfig {
    pub home: PathBuf,
    /// Substituted for `${BASE}` in config files.
    pub base: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> ManagerConfig {
        let user_home = env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        ManagerConfig {
            home: user_home.join(::DEFAULT_HOME_DIR),
            base: None,
            config_path: None,
        }
    }
}

enum ShutdownMode {
    None,
    Draining(SteadyTime),
    Done,
}

pub struct Manager {
    services: HashMap<String, Service>,
    sockets: HashMap<String, Socket>,
    proxies: HashMap<String, Proxy>,
    pub logger: Logger,
    pub console: Console,
    pub base: Option<String>,
    home: PathBuf,
    config_path: Option<PathBuf>,
    shutdown: ShutdownMode,
    /// Pids we still owe a wait(2), e.g. a force-downed proxy.
    orphans: Vec<Pid>,
}

impl Manager {
    pub fn new(cfg: ManagerConfig) -> Manager {
        let mut console = Console::new();
        console.set_default_path(cfg.home.join(::CONSOLE_SOCK));
        Manager {
            services: HashMap::new(),
            sockets: HashMap::new(),
            proxies: HashMap::new(),
            logger: Logger::new(),
            console: console,
            base: cfg.base,
            home: cfg.home,
            config_path: cfg.config_path,
            shutdown: ShutdownMode::None,
            orphans: Vec::new(),
        }
    }

    pub fn home(&self) -> &PathBuf {
        &self.home
    }

    /// Everything up to the loop: home directory, config file, console.
    pub fn boot(&mut self) -> Result<()> {
        fs::create_dir_all(&self.home).map_err(|e| Error::HomeIo(self.home.clone(), e))?;
        env::set_var(HOME_ENVVAR, &self.home);
        if let Some(path) = self.config_path.clone() {
            config::apply_file(self, &path)?;
        }
        self.console.start()?;
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        signals::init()?;
        self.boot()?;
        info!("supervisor ready (home {})", self.home.display());
        loop {
            self.tick();
            if self.shutdown_complete() {
                break;
            }
            thread::sleep(StdDuration::from_millis(TICK_MS));
        }
        self.finish();
        Ok(())
    }

    /// One turn of the event loop.
    pub fn tick(&mut self) {
        if signals::pending_shutdown() {
            info!("received termination signal");
            self.request_shutdown();
        }
        if signals::take_reload_logs() {
            self.logger.reinit();
        }
        signals::take_sigchld();
        self.reap_children();
        self.pump_services();
        self.pump_proxies();
        self.fire_timers();
        self.tick_console();
        self.tick_shutdown();
    }

    pub fn shutdown_complete(&self) -> bool {
        match self.shutdown {
            ShutdownMode::Done => true,
            _ => false,
        }
    }

    /// Post-loop cleanup: sockets unbound last, after every child that
    /// could inherit them is gone.
    pub fn finish(&mut self) {
        for sock in self.sockets.values_mut() {
            sock.unbind();
        }
        self.console.stop();
        info!("supervisor done");
    }

    // ---- registries ----

    pub fn find_or_create_service(&mut self, name: &str) -> &mut Service {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| Service::new(name.to_string()))
    }

    pub fn find_or_create_socket(&mut self, name: &str) -> &mut Socket {
        self.sockets
            .entry(name.to_string())
            .or_insert_with(|| Socket::new(name.to_string()))
    }

    pub fn find_or_create_proxy(&mut self, name: &str) -> &mut Proxy {
        self.proxies
            .entry(name.to_string())
            .or_insert_with(|| Proxy::new(name.to_string()))
    }

    pub fn attach_to_proxy(&mut self, proxy_name: &str, svc_name: &str) {
        self.find_or_create_proxy(proxy_name).attach_service(svc_name);
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn socket(&self, name: &str) -> Option<&Socket> {
        self.sockets.get(name)
    }

    pub fn proxy(&self, name: &str) -> Option<&Proxy> {
        self.proxies.get(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn services_with_tag(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .values()
            .filter(|svc| svc.has_tag(tag))
            .map(|svc| svc.name.clone())
            .collect();
        names.sort();
        names
    }

    // ---- service operations ----

    pub fn start_service(&mut self, name: &str) -> Result<()> {
        {
            let svc = self
                .services
                .get(name)
                .ok_or_else(|| Error::UnknownService(name.to_string()))?;
            svc.check_startable()?;
        }
        let proxy_name = self.services.get(name).and_then(|s| s.proxy.clone());
        match proxy_name {
            Some(pname) => self.start_via_proxy(name, &pname),
            None => self.start_direct(name),
        }
    }

    fn start_direct(&mut self, name: &str) -> Result<()> {
        let stdin_fd = self.resolve_stdin_fd(name)?;
        let home = self.home.clone();
        let svc = match self.services.get_mut(name) {
            Some(svc) => svc,
            None => return Err(Error::UnknownService(name.to_string())),
        };
        svc.begin_start();
        match exec::run(svc, stdin_fd, &home) {
            Ok((pid, stdout, stderr)) => {
                svc.attach_child(pid, stdout, stderr);
                Ok(())
            }
            Err(err) => {
                let reason = format!("{}", err);
                svc.has_stopped(&reason);
                Err(err)
            }
        }
    }

    fn resolve_stdin_fd(&self, name: &str) -> Result<Option<RawFd>> {
        let svc = match self.services.get(name) {
            Some(svc) => svc,
            None => return Ok(None),
        };
        match svc.tie_stdin_to {
            Some(ref sock_name) => {
                let sock = self
                    .sockets
                    .get(sock_name)
                    .ok_or_else(|| Error::UnknownSocket(sock_name.clone()))?;
                match sock.fd() {
                    Some(fd) => Ok(Some(fd)),
                    None => Err(Error::SocketNotBound(sock_name.clone())),
                }
            }
            None => Ok(None),
        }
    }

    fn start_via_proxy(&mut self, name: &str, pname: &str) -> Result<()> {
        if !self.proxies.contains_key(pname) {
            return Err(Error::UnknownProxy(pname.to_string()));
        }
        let proxy_up = self.proxies.get(pname).map_or(false, |p| p.is_up());
        if !proxy_up {
            let auto = self.proxies.get(pname).map_or(false, |p| p.auto);
            if !auto {
                return Err(Error::ProxyDown(pname.to_string()));
            }
            self.proxy_up(pname)?;
        }
        let spawn = self.spawn_message(name)?;
        if let Some(svc) = self.services.get_mut(name) {
            svc.begin_start();
        }
        let sent = match self.proxies.get_mut(pname) {
            Some(proxy) => proxy.send(&ProxyCommand::Start(spawn)),
            None => Err(Error::UnknownProxy(pname.to_string())),
        };
        if let Err(err) = sent {
            let reason = format!("{}", err);
            if let Some(svc) = self.services.get_mut(name) {
                svc.has_stopped(&reason);
            }
            return Err(err);
        }
        Ok(())
    }

    fn spawn_message(&self, name: &str) -> Result<Spawn> {
        let svc = self
            .services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        let cmd = match svc.cmd {
            Some(ref cmd) => cmd.clone(),
            None => return Err(Error::EmptyCmd(name.to_string())),
        };
        let mut env = svc.env.clone();
        env.insert(ENABLED_ENVVAR.to_string(), String::from("1"));
        env.insert(SERVICE_ENVVAR.to_string(), svc.name.clone());
        env.insert(
            HOME_ENVVAR.to_string(),
            self.home.to_string_lossy().into_owned(),
        );
        Ok(Spawn {
            name: svc.name.clone(),
            cmd: cmd,
            env: env,
            cwd: svc.cwd.clone(),
            ignore_stdout: svc.ignore_stdout,
            ignore_stderr: svc.ignore_stderr,
            tie_stdin_to: svc.tie_stdin_to.clone(),
            no_new_session: svc.no_new_session,
        })
    }

    pub fn stop_service(&mut self, name: &str) -> Result<()> {
        let proxied = self
            .services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?
            .proxy
            .clone();
        let outcome = {
            let svc = match self.services.get_mut(name) {
                Some(svc) => svc,
                None => return Err(Error::UnknownService(name.to_string())),
            };
            svc.stop(proxied.is_none())?
        };
        match (proxied, outcome) {
            (Some(pname), StopOutcome::Signaled) => {
                if let Some(proxy) = self.proxies.get_mut(&pname) {
                    if let Err(err) = proxy.send(&ProxyCommand::Stop {
                        name: name.to_string(),
                    }) {
                        // a broken command pipe means the host is gone;
                        // the stopwait escalation still reaps the child
                        warn!("proxy {}: {}", pname, err);
                        proxy.begin_shutdown();
                    }
                }
            }
            (Some(_), StopOutcome::WasBackedOff) => {
                self.check_proxy_idle(name);
            }
            (None, _) => {}
        }
        Ok(())
    }

    pub fn restart_service(&mut self, name: &str) -> Result<()> {
        {
            let svc = self
                .services
                .get(name)
                .ok_or_else(|| Error::UnknownService(name.to_string()))?;
            if svc.state() != State::Running {
                return Err(Error::NotRunning(name.to_string()));
            }
        }
        self.stop_service(name)?;
        if let Some(svc) = self.services.get_mut(name) {
            svc.arm_restart_poll();
        }
        Ok(())
    }

    /// Idempotent start: already-up services are left alone.
    pub fn up_service(&mut self, name: &str) -> Result<()> {
        let up = self
            .services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?
            .is_up();
        if up {
            return Ok(());
        }
        self.start_service(name)
    }

    /// Idempotent stop.
    pub fn down_service(&mut self, name: &str) -> Result<()> {
        let state = self
            .services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?
            .state();
        match state {
            State::Starting | State::Running | State::Backoff => self.stop_service(name),
            _ => Ok(()),
        }
    }

    pub fn destroy_service(&mut self, name: &str) -> Result<()> {
        {
            let svc = self
                .services
                .get(name)
                .ok_or_else(|| Error::UnknownService(name.to_string()))?;
            if svc.is_up() {
                return Err(Error::ServiceNotDown(name.to_string()));
            }
        }
        let svc = match self.services.remove(name) {
            Some(svc) => svc,
            None => return Ok(()),
        };
        if let Some(pname) = svc.proxy {
            if let Some(proxy) = self.proxies.get_mut(&pname) {
                proxy.detach_service(name);
            }
        }
        Ok(())
    }

    // ---- proxy operations ----

    pub fn proxy_up(&mut self, name: &str) -> Result<()> {
        let socket_fds: Vec<(String, RawFd)> = self
            .sockets
            .values()
            .filter_map(|s| s.fd().map(|fd| (s.name.clone(), fd)))
            .collect();
        match self.proxies.get_mut(name) {
            Some(proxy) => proxy.start(&socket_fds),
            None => Err(Error::UnknownProxy(name.to_string())),
        }
    }

    pub fn proxy_down(&mut self, name: &str) -> Result<()> {
        match self.proxies.get_mut(name) {
            Some(proxy) => {
                if !proxy.is_up() {
                    return Err(Error::ProxyDown(name.to_string()));
                }
                proxy.begin_shutdown();
                Ok(())
            }
            None => Err(Error::UnknownProxy(name.to_string())),
        }
    }

    // ---- socket operations ----

    pub fn bind_socket(&mut self, name: &str) -> Result<()> {
        match self.sockets.get_mut(name) {
            Some(sock) => sock.bind(),
            None => Err(Error::UnknownSocket(name.to_string())),
        }
    }

    // ---- queries ----

    pub fn list_services(&self) -> Vec<String> {
        self.service_names()
    }

    fn proxy_as_text(&self, svc: &Service) -> String {
        match svc.proxy {
            Some(ref pname) => self
                .proxies
                .get(pname)
                .map_or_else(|| format!("{}!", pname), |p| p.as_text()),
            None => String::new(),
        }
    }

    pub fn status_lines(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| {
                self.services
                    .get(name)
                    .map(|svc| svc.status_line(&self.proxy_as_text(svc)))
            })
            .collect()
    }

    pub fn desc_lines(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| {
                self.services
                    .get(name)
                    .map(|svc| svc.desc_line(&self.proxy_as_text(svc)))
            })
            .collect()
    }

    pub fn pid_lines(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| self.services.get(name).map(|svc| svc.pid_line()))
            .collect()
    }

    pub fn proxy_status_lines(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.proxies.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.proxies.get(name).map(|p| p.status_line()))
            .collect()
    }

    // ---- lifecycle ----

    pub fn request_shutdown(&mut self) {
        match self.shutdown {
            ShutdownMode::None => {}
            _ => return,
        }
        info!("stopping all services and proxies");
        let names = self.service_names();
        for name in names {
            let stoppable = self
                .services
                .get(&name)
                .map_or(false, |s| s.is_up() || s.state() == State::Backoff);
            if stoppable {
                if let Err(err) = self.stop_service(&name) {
                    warn!("unable to stop {}: {}", name, err);
                }
            }
        }
        let pnames: Vec<String> = self.proxies.keys().cloned().collect();
        for pname in pnames {
            if let Some(proxy) = self.proxies.get_mut(&pname) {
                proxy.begin_shutdown();
            }
        }
        self.shutdown = ShutdownMode::Draining(
            SteadyTime::now() + time::Duration::seconds(SHUTDOWN_BACKSTOP_SECS),
        );
    }

    pub fn reload_config(&mut self) -> Result<()> {
        let path = self.config_path.clone().ok_or(Error::NoConfig)?;
        config::apply_file(self, &path)
    }

    // ---- event loop internals ----

    fn reap_children(&mut self) {
        let mut exited: Vec<(String, i32)> = Vec::new();
        for (name, svc) in self.services.iter() {
            if svc.proxy.is_some() {
                continue;
            }
            if let Some(pid) = svc.pid() {
                match process::try_wait(pid) {
                    Ok(Some(status)) => exited.push((name.clone(), status)),
                    Ok(None) => {}
                    Err(err) => warn!("service {}: {}", name, err),
                }
            }
        }
        let mut proxy_exits: Vec<(String, i32)> = Vec::new();
        for (name, proxy) in self.proxies.iter() {
            if let Some(pid) = proxy.pid() {
                match process::try_wait(pid) {
                    Ok(Some(status)) => proxy_exits.push((name.clone(), status)),
                    Ok(None) => {}
                    Err(err) => warn!("proxy {}: {}", name, err),
                }
            }
        }
        for (name, status) in exited {
            self.finish_service_exit(&name, status);
        }
        for (name, status) in proxy_exits {
            self.finish_proxy_exit(&name, status);
        }
        self.orphans.retain(|&pid| match process::try_wait(pid) {
            Ok(None) => true,
            _ => false,
        });
    }

    /// One exit event per child reaches the matching service, whether the
    /// status came from our own reaper or over a proxy's status pipe.
    fn finish_service_exit(&mut self, name: &str, status: i32) {
        self.pump_one(name);
        let respawn = match self.services.get_mut(name) {
            Some(svc) => {
                if !svc.is_up() {
                    debug!("stray exit event for {} ignored", name);
                    return;
                }
                svc.handle_exit(status)
            }
            None => return,
        };
        if respawn {
            if let Err(err) = self.start_service(name) {
                warn!("unable to respawn {}: {}", name, err);
            }
        }
        self.check_proxy_idle(name);
    }

    fn finish_proxy_exit(&mut self, name: &str, status: i32) {
        // whatever is still in the pipes comes first
        self.pump_proxy(name);
        let (expected, bound) = match self.proxies.get(name) {
            Some(proxy) => (proxy.is_stopping(), proxy.service_names()),
            None => return,
        };
        if expected {
            info!("proxy {} is down", name);
        } else {
            warn!(
                "proxy {} exited unexpectedly ({})",
                name,
                process::exit_reason(status).unwrap_or_else(|| String::from("clean exit"))
            );
        }
        for svc_name in bound {
            if let Some(svc) = self.services.get_mut(&svc_name) {
                if svc.is_up() {
                    svc.has_stopped("proxy stopped");
                }
            }
        }
        if let Some(proxy) = self.proxies.get_mut(name) {
            proxy.mark_down();
        }
    }

    /// An auto proxy whose services are all down gets shut down.
    fn check_proxy_idle(&mut self, svc_name: &str) {
        let pname = match self.services.get(svc_name).and_then(|s| s.proxy.clone()) {
            Some(pname) => pname,
            None => return,
        };
        let should_stop = match self.proxies.get(&pname) {
            Some(proxy) if proxy.is_up() && proxy.auto && !proxy.is_stopping() => proxy
                .service_names()
                .iter()
                .all(|n| self.services.get(n).map_or(true, |s| s.is_down())),
            _ => false,
        };
        if should_stop {
            info!("proxy {} has no services left up", pname);
            if let Some(proxy) = self.proxies.get_mut(&pname) {
                proxy.begin_shutdown();
            }
        }
    }

    fn pump_services(&mut self) {
        let logger = &mut self.logger;
        for svc in self.services.values_mut() {
            let name = svc.name.clone();
            for (stream, line) in svc.poll_output() {
                logger.output(&name, stream, &line);
            }
        }
    }

    fn pump_one(&mut self, name: &str) {
        let logger = &mut self.logger;
        if let Some(svc) = self.services.get_mut(name) {
            let svc_name = svc.name.clone();
            for (stream, line) in svc.poll_output() {
                logger.output(&svc_name, stream, &line);
            }
        }
    }

    fn pump_proxies(&mut self) {
        let pnames: Vec<String> = self.proxies.keys().cloned().collect();
        for pname in pnames {
            self.pump_proxy(&pname);
        }
    }

    fn pump_proxy(&mut self, pname: &str) {
        let (statuses, records) = match self.proxies.get_mut(pname) {
            Some(proxy) => proxy.poll(),
            None => return,
        };
        {
            let logger = &mut self.logger;
            for record in &records {
                logger.record(record);
            }
        }
        for status in statuses {
            self.handle_proxy_status(pname, status);
        }
        let broken = self
            .proxies
            .get(pname)
            .map_or(false, |p| p.is_up() && !p.is_stopping() && p.status_eof());
        if broken {
            warn!("proxy {}: status pipe closed, shutting it down", pname);
            if let Some(proxy) = self.proxies.get_mut(pname) {
                proxy.begin_shutdown();
            }
        }
    }

    fn handle_proxy_status(&mut self, pname: &str, status: Status) {
        match status {
            Status::Started { name, pid } => {
                debug!("proxy {} started {} (pid {})", pname, name, pid);
                match self.services.get_mut(&name) {
                    Some(svc) => {
                        if pid > 0 {
                            svc.assign_pid(pid as Pid);
                        } else {
                            warn!("proxy {} failed to spawn {}", pname, name);
                        }
                    }
                    None => warn!("proxy {} started unknown service {}", pname, name),
                }
            }
            Status::Stopped { name, status } => {
                let ours = self.services.get(&name).map_or(false, |svc| {
                    svc.proxy.as_ref().map_or(false, |p| p == pname)
                });
                if ours {
                    self.finish_service_exit(&name, status);
                } else {
                    warn!("proxy {} stopped unknown service {}", pname, name);
                }
            }
        }
    }

    fn fire_timers(&mut self) {
        let now = SteadyTime::now();
        let names: Vec<String> = self.services.keys().cloned().collect();
        for name in names {
            let followups = match self.services.get_mut(&name) {
                Some(svc) => svc.poll_timers(now),
                None => continue,
            };
            for followup in followups {
                match followup {
                    Followup::Start => {
                        if let Err(err) = self.start_service(&name) {
                            warn!("unable to start {}: {}", name, err);
                        }
                    }
                }
            }
        }
        let pnames: Vec<String> = self.proxies.keys().cloned().collect();
        for pname in pnames {
            let force = self
                .proxies
                .get(&pname)
                .map_or(false, |p| p.force_down_due(now));
            if force {
                self.force_proxy_down(&pname);
            }
        }
    }

    fn force_proxy_down(&mut self, pname: &str) {
        warn!("proxy {} did not stop in time, forcing it down", pname);
        let (pid, bound) = match self.proxies.get(pname) {
            Some(proxy) => (proxy.pid(), proxy.service_names()),
            None => return,
        };
        if let Some(pid) = pid {
            let _ = process::signal(pid, Signal::KILL);
            self.orphans.push(pid);
        }
        for svc_name in bound {
            if let Some(svc) = self.services.get_mut(&svc_name) {
                if svc.is_up() {
                    svc.has_stopped("proxy stopped");
                }
            }
        }
        if let Some(proxy) = self.proxies.get_mut(pname) {
            proxy.mark_down();
        }
    }

    fn tick_console(&mut self) {
        let lines = self.console.poll_lines();
        for (client, line) in lines {
            if line.trim() == "exit" {
                self.console.close_client(client);
                continue;
            }
            let has_priv = self.console.full;
            let reply = match command::dispatch(self, &line, has_priv, false) {
                Ok(ref lines) if lines.is_empty() => String::from("OK"),
                Ok(lines) => format!("{}\r\nOK", lines.join("\r\n")),
                Err(err) => format!("ERROR: {}", err),
            };
            self.console.respond(client, &reply);
        }
        self.console.flush();
    }

    fn tick_shutdown(&mut self) {
        let deadline = match self.shutdown {
            ShutdownMode::Draining(deadline) => deadline,
            _ => return,
        };
        let services_down = self.services.values().all(|s| s.is_down());
        let proxies_down = self.proxies.values().all(|p| !p.is_up());
        if services_down && proxies_down && self.orphans.is_empty() {
            self.shutdown = ShutdownMode::Done;
            return;
        }
        if SteadyTime::now() >= deadline {
            warn!("shutdown deadline hit, forcing the issue");
            for svc in self.services.values() {
                if let Some(pid) = svc.pid() {
                    let result = if svc.no_new_session {
                        process::signal(pid, Signal::KILL)
                    } else {
                        process::signal_group(pid, Signal::KILL)
                    };
                    if let Err(err) = result {
                        warn!("service {}: {}", svc.name, err);
                    }
                }
            }
            for proxy in self.proxies.values_mut() {
                if let Some(pid) = proxy.pid() {
                    let _ = process::signal(pid, Signal::KILL);
                }
                proxy.mark_down();
            }
            self.shutdown = ShutdownMode::Done;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use protocol::Cmd;
    use tempfile::TempDir;

    fn test_manager() -> (Manager, TempDir) {
        let dir = TempDir::new().unwrap();
        let cfg = ManagerConfig {
            home: dir.path().to_path_buf(),
            base: None,
            config_path: None,
        };
        (Manager::new(cfg), dir)
    }

    #[test]
    fn find_or_create_is_idempotent() {
        let (mut mgr, _dir) = test_manager();
        mgr.find_or_create_service("web").desc = Some(String::from("kept"));
        assert_eq!(
            mgr.find_or_create_service("web").desc,
            Some(String::from("kept"))
        );
        assert_eq!(mgr.service_names(), vec!["web".to_string()]);
    }

    #[test]
    fn unknown_names_error_out() {
        let (mut mgr, _dir) = test_manager();
        assert!(mgr.start_service("ghost").is_err());
        assert!(mgr.stop_service("ghost").is_err());
        assert!(mgr.bind_socket("ghost").is_err());
        assert!(mgr.proxy_up("ghost").is_err());
    }

    #[test]
    fn destroy_requires_down() {
        let (mut mgr, _dir) = test_manager();
        {
            let svc = mgr.find_or_create_service("web");
            svc.cmd = Some(Cmd::Shell(String::from("sleep 1")));
            svc.begin_start();
            svc.attach_child(4242, None, None);
        }
        match mgr.destroy_service("web") {
            Err(Error::ServiceNotDown(_)) => (),
            other => panic!("expected ServiceNotDown, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn destroyed_services_are_gone() {
        let (mut mgr, _dir) = test_manager();
        mgr.find_or_create_service("web");
        mgr.destroy_service("web").unwrap();
        assert!(!mgr.has_service("web"));
    }

    #[test]
    fn proxy_text_marks_down_proxies() {
        let (mut mgr, _dir) = test_manager();
        mgr.find_or_create_proxy("pool");
        {
            let svc = mgr.find_or_create_service("web");
            svc.proxy = Some(String::from("pool"));
        }
        mgr.attach_to_proxy("pool", "web");
        let lines = mgr.status_lines(&[String::from("web")]);
        let fields: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(fields[5], "pool!");
    }

    #[test]
    fn proxystatus_reports_up_and_down() {
        let (mut mgr, _dir) = test_manager();
        mgr.find_or_create_proxy("pool");
        let lines = mgr.proxy_status_lines();
        assert_eq!(lines, vec!["pool\tdown\t".to_string()]);
    }
}
