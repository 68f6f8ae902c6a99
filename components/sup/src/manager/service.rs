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

//! Per-service state machine.
//!
//! Every command, timer and child-exit event for one service lands here,
//! always on the supervisor's event loop. Timer handles are plain
//! deadlines owned by the record and cleared on every outbound edge, so a
//! stale firing is a no-op.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::process::{ChildStderr, ChildStdout};

use rand::{self, Rng};
use time::{self, SteadyTime};

use core::lineio::LineReader;
use core::os::process::{self, Pid, Signal};
use error::{Error, Result};
use protocol::{Cmd, Stream};

pub const DEFAULT_STARTWAIT_SECS: f64 = 1.0;
pub const DEFAULT_STOPWAIT_SECS: f64 = 2.0;
pub const DEFAULT_MAX_RETRIES: u32 = 8;
/// Base unit of the randomized backoff delay.
pub const BASE_BACKOFF_DELAY_MS: i64 = 300;
/// The restart chain polls for the service to be down at most this many
/// times before giving up.
pub const RESTART_POLL_MAX_TRIES: u32 = 150;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
    Backoff,
    Fatal,
    Fail,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match *self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Backoff => "backoff",
            State::Fatal => "fatal",
            State::Fail => "fail",
        };
        write!(f, "{}", state)
    }
}

/// Work the state machine wants the controller to do once the current
/// event has been applied.
#[derive(Debug, PartialEq)]
pub enum Followup {
    Start,
}

/// What `stop` did, so the controller knows whether a signal (or a proxy
/// stop command) is in flight.
#[derive(Debug, PartialEq)]
pub enum StopOutcome {
    /// TERM was requested; the service is now `stopping`.
    Signaled,
    /// The service was in backoff; it is down already.
    WasBackedOff,
}

pub struct Service {
    pub name: String,
    pub cmd: Option<Cmd>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub priority: Option<i32>,
    pub desc: Option<String>,
    pub tags: BTreeSet<String>,
    pub tie_stdin_to: Option<String>,
    pub ignore_stdout: bool,
    pub ignore_stderr: bool,
    pub startwait_secs: f64,
    pub stopwait_secs: f64,
    pub respawn_on_fail: bool,
    pub respawn_on_stop: bool,
    pub respawn_max_retries: u32,
    pub no_new_session: bool,
    /// Name of the proxy that forks this service, if any; resolved through
    /// the controller when needed.
    pub proxy: Option<String>,

    state: State,
    pid: Option<Pid>,
    start_time: Option<i64>,
    stop_time: Option<i64>,
    exit_status: Option<i32>,
    fail_reason: Option<String>,
    backoff_retry: u32,
    wants_down: bool,
    normal_exit: bool,
    startwait_timer: Option<SteadyTime>,
    stopwait_timer: Option<SteadyTime>,
    backoff_timer: Option<SteadyTime>,
    restart_poll: Option<(SteadyTime, u32)>,
    stdout: Option<LineReader<ChildStdout>>,
    stderr: Option<LineReader<ChildStderr>>,
}

impl Service {
    pub fn new<T: Into<String>>(name: T) -> Service {
        Service {
            name: name.into(),
            cmd: None,
            env: HashMap::new(),
            cwd: None,
            user: None,
            group: None,
            priority: None,
            desc: None,
            tags: BTreeSet::new(),
            tie_stdin_to: None,
            ignore_stdout: false,
            ignore_stderr: false,
            startwait_secs: DEFAULT_STARTWAIT_SECS,
            stopwait_secs: DEFAULT_STOPWAIT_SECS,
            respawn_on_fail: true,
            respawn_on_stop: false,
            respawn_max_retries: DEFAULT_MAX_RETRIES,
            no_new_session: false,
            proxy: None,
            state: State::Stopped,
            pid: None,
            start_time: None,
            stop_time: None,
            exit_status: None,
            fail_reason: None,
            backoff_retry: 0,
            wants_down: false,
            normal_exit: false,
            startwait_timer: None,
            stopwait_timer: None,
            backoff_timer: None,
            restart_poll: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn backoff_retry(&self) -> u32 {
        self.backoff_retry
    }

    /// Raw wait status of the last exit, if any.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Did the last exit classify as normal (exit 0 or SIGTERM)?
    pub fn normal_exit(&self) -> bool {
        self.normal_exit
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_ref().map(|r| r.as_str())
    }

    pub fn is_up(&self) -> bool {
        match self.state {
            State::Starting | State::Running | State::Stopping => true,
            _ => false,
        }
    }

    pub fn is_down(&self) -> bool {
        !self.is_up()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    fn set_state(&mut self, state: State) {
        if self.state == state {
            return;
        }
        debug!("service {}: {} -> {}", self.name, self.state, state);
        self.state = state;
    }

    fn clear_timers(&mut self) {
        self.startwait_timer = None;
        self.stopwait_timer = None;
        self.backoff_timer = None;
    }

    pub fn close_pipes(&mut self) {
        self.stdout = None;
        self.stderr = None;
    }

    /// Guard shared by every start path: a service that is up cannot be
    /// started again, and there must be something to run.
    pub fn check_startable(&self) -> Result<()> {
        if self.is_up() {
            return Err(Error::ServiceUp(self.name.clone()));
        }
        match self.cmd {
            Some(ref cmd) if !cmd.is_empty() => Ok(()),
            _ => Err(Error::EmptyCmd(self.name.clone())),
        }
    }

    /// Enter `starting`. The caller spawns the child (directly or through
    /// the proxy) right after this.
    pub fn begin_start(&mut self) {
        let from_backoff = self.state == State::Backoff;
        self.clear_timers();
        self.set_state(State::Starting);
        self.start_time = Some(time::get_time().sec);
        self.stop_time = None;
        self.exit_status = None;
        self.fail_reason = None;
        self.wants_down = false;
        self.normal_exit = false;
        if !from_backoff {
            self.backoff_retry = 0;
        }
        self.startwait_timer = Some(SteadyTime::now() + secs_to_duration(self.startwait_secs));
    }

    /// Record a directly-spawned child.
    pub fn attach_child(
        &mut self,
        pid: Pid,
        stdout: Option<LineReader<ChildStdout>>,
        stderr: Option<LineReader<ChildStderr>>,
    ) {
        self.pid = Some(pid);
        self.stdout = stdout;
        self.stderr = stderr;
    }

    /// The proxy reported `started`: take the pid and re-arm the startwait
    /// check from now. The old check may race with this message; whichever
    /// side runs second sees the pid and does the right thing.
    pub fn assign_pid(&mut self, pid: Pid) {
        self.pid = Some(pid);
        if self.state == State::Starting {
            self.startwait_timer =
                Some(SteadyTime::now() + secs_to_duration(self.startwait_secs));
        }
    }

    /// Ask the service to stop. Delivers TERM itself unless the service
    /// belongs to a proxy (`deliver_signal == false`), in which case the
    /// controller forwards a stop command instead.
    pub fn stop(&mut self, deliver_signal: bool) -> Result<StopOutcome> {
        match self.state {
            State::Backoff => {
                self.clear_timers();
                self.backoff_retry = 0;
                self.wants_down = true;
                self.set_state(State::Stopped);
                info!("service {} stopped (was backing off)", self.name);
                Ok(StopOutcome::WasBackedOff)
            }
            State::Starting | State::Running | State::Stopping => {
                if self.state == State::Stopping {
                    return Err(Error::ServiceStopping(self.name.clone()));
                }
                self.wants_down = true;
                if deliver_signal {
                    if let Some(pid) = self.pid {
                        let result = if self.no_new_session {
                            process::signal(pid, Signal::TERM)
                        } else {
                            process::signal_group(pid, Signal::TERM)
                        };
                        if let Err(err) = result {
                            warn!("service {}: {}", self.name, err);
                        }
                    }
                }
                self.set_state(State::Stopping);
                self.stopwait_timer =
                    Some(SteadyTime::now() + secs_to_duration(self.stopwait_secs));
                Ok(StopOutcome::Signaled)
            }
            _ => Err(Error::ServiceDown(self.name.clone())),
        }
    }

    /// Arm the polling chain that completes a `restart`: once the service
    /// is observed down, start it again.
    pub fn arm_restart_poll(&mut self) {
        let period = secs_to_duration(self.stopwait_secs / 10.0);
        self.restart_poll = Some((SteadyTime::now() + period, 0));
    }

    /// Escalate to KILL. Targets the process group only when the child got
    /// its own session; a `no_new_session` child shares our group and must
    /// be signaled alone.
    fn kill(&mut self) {
        if let Some(pid) = self.pid {
            let result = if self.no_new_session {
                process::signal(pid, Signal::KILL)
            } else {
                process::signal_group(pid, Signal::KILL)
            };
            if let Err(err) = result {
                warn!("service {}: {}", self.name, err);
            }
        }
    }

    /// The child is gone without a wait status (proxy crashed or was
    /// forced down). Straight to `fail` with the given reason.
    pub fn has_stopped(&mut self, reason: &str) {
        self.clear_timers();
        self.close_pipes();
        self.pid = None;
        self.stop_time = Some(time::get_time().sec);
        self.fail_reason = Some(reason.to_string());
        self.set_state(State::Fail);
    }

    /// Apply one child-exit event. Returns true when the controller should
    /// start the service again right away (running failure with respawn,
    /// or respawn-on-stop).
    pub fn handle_exit(&mut self, status: i32) -> bool {
        let was_starting = self.state == State::Starting;
        self.pid = None;
        self.close_pipes();
        self.clear_timers();
        self.stop_time = Some(time::get_time().sec);
        self.exit_status = Some(status);
        if process::exited_normally(status) {
            self.normal_exit = true;
            self.set_state(State::Stopped);
            info!("service {} stopped", self.name);
            return self.respawn_on_stop && !self.wants_down;
        }
        let reason =
            process::exit_reason(status).unwrap_or_else(|| String::from("unknown failure"));
        if !self.respawn_on_fail || self.wants_down {
            warn!("service {} failed: {}", self.name, reason);
            self.fail_reason = Some(reason);
            self.set_state(State::Fail);
            return false;
        }
        if was_starting {
            self.backoff_retry += 1;
            self.fail_reason = Some(reason);
            if self.backoff_retry >= self.respawn_max_retries {
                error!(
                    "service {} failed to start {} times, giving up",
                    self.name, self.backoff_retry
                );
                self.set_state(State::Fatal);
            } else {
                let delay = backoff_delay(self.backoff_retry);
                warn!(
                    "service {} failed to start (attempt {}), backing off {}ms",
                    self.name,
                    self.backoff_retry,
                    delay.num_milliseconds()
                );
                self.set_state(State::Backoff);
                self.backoff_timer = Some(SteadyTime::now() + delay);
            }
            return false;
        }
        // Failure while running: note the failure, then respawn.
        warn!("service {} died ({}), respawning", self.name, reason);
        self.fail_reason = Some(reason);
        self.set_state(State::Fail);
        true
    }

    /// Fire whatever deadlines have expired. Stale timers were cleared on
    /// the edge that invalidated them, and every firing re-checks state
    /// before acting.
    pub fn poll_timers(&mut self, now: SteadyTime) -> Vec<Followup> {
        let mut followups = Vec::new();
        if self.startwait_timer.map_or(false, |t| now >= t) {
            self.startwait_timer = None;
            if self.state == State::Starting {
                if self.pid.is_some() {
                    self.backoff_retry = 0;
                    self.set_state(State::Running);
                    info!("service {} is running", self.name);
                } else if self.proxy.is_some() {
                    warn!(
                        "service {}: no pid from proxy yet; increase startwait_secs",
                        self.name
                    );
                } else {
                    self.fail_reason = Some(String::from("never spawned"));
                    self.set_state(State::Fail);
                }
            }
        }
        if self.stopwait_timer.map_or(false, |t| now >= t) {
            self.stopwait_timer = None;
            if self.state == State::Stopping && self.pid.is_some() {
                warn!("service {} ignored TERM, killing", self.name);
                self.kill();
            }
        }
        if self.backoff_timer.map_or(false, |t| now >= t) {
            self.backoff_timer = None;
            if self.state == State::Backoff {
                followups.push(Followup::Start);
            }
        }
        if let Some((deadline, tries)) = self.restart_poll {
            if now >= deadline {
                if self.is_down() {
                    self.restart_poll = None;
                    followups.push(Followup::Start);
                } else if tries + 1 >= RESTART_POLL_MAX_TRIES {
                    self.restart_poll = None;
                    error!(
                        "service {} never came down, abandoning restart",
                        self.name
                    );
                } else {
                    let period = secs_to_duration(self.stopwait_secs / 10.0);
                    self.restart_poll = Some((now + period, tries + 1));
                }
            }
        }
        followups
    }

    /// Drain whatever the child wrote since the last tick.
    pub fn poll_output(&mut self) -> Vec<(Stream, String)> {
        let mut lines = Vec::new();
        if let Some(ref mut out) = self.stdout {
            for line in out.poll() {
                lines.push((Stream::Out, line));
            }
        }
        if let Some(ref mut err) = self.stderr {
            for line in err.poll() {
                lines.push((Stream::Err, line));
            }
        }
        lines
    }

    pub fn status_line(&self, proxy_as_text: &str) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.state,
            self.pid.map_or(String::new(), |p| p.to_string()),
            self.start_time.map_or(String::new(), |t| t.to_string()),
            self.stop_time.map_or(String::new(), |t| t.to_string()),
            proxy_as_text,
            self.fail_reason.as_ref().map_or("", |r| r.as_str()),
            self.cmd.as_ref().map_or(String::new(), |c| c.to_string()),
        )
    }

    pub fn desc_line(&self, proxy_as_text: &str) -> String {
        let tags: Vec<&str> = self.tags.iter().map(|t| t.as_str()).collect();
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            tags.join(","),
            self.desc.as_ref().map_or("", |d| d.as_str()),
            proxy_as_text,
            self.cmd.as_ref().map_or(String::new(), |c| c.to_string()),
        )
    }

    pub fn pid_line(&self) -> String {
        format!(
            "{}\t{}",
            self.name,
            self.pid.map_or(String::new(), |p| p.to_string())
        )
    }
}

fn secs_to_duration(secs: f64) -> time::Duration {
    time::Duration::milliseconds((secs * 1000.0) as i64)
}

/// Backoff before start attempt n+1: `BASE * uniform[1, 2n-1]`, a
/// randomized delay that grows linearly in the number of failures.
fn backoff_delay(n: u32) -> time::Duration {
    let ceiling = if n < 1 { 1 } else { 2 * n - 1 };
    let factor = if ceiling <= 1 {
        1
    } else {
        rand::thread_rng().gen_range(1..=ceiling)
    };
    time::Duration::milliseconds(BASE_BACKOFF_DELAY_MS * factor as i64)
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

    fn runnable(name: &str) -> Service {
        let mut svc = Service::new(name);
        svc.cmd = Some(Cmd::Shell(String::from("sleep 1")));
        svc
    }

    fn fake_up(svc: &mut Service, pid: Pid) {
        svc.begin_start();
        svc.attach_child(pid, None, None);
    }

    #[test]
    fn services_come_up_stopped() {
        let svc = Service::new("web");
        assert_eq!(svc.state(), State::Stopped);
        assert_eq!(svc.pid(), None);
        assert!(svc.is_down());
    }

    #[test]
    fn start_requires_a_command() {
        let svc = Service::new("web");
        match svc.check_startable() {
            Err(Error::EmptyCmd(_)) => (),
            other => panic!("expected EmptyCmd, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let mut svc = runnable("web");
        fake_up(&mut svc, 999901);
        match svc.check_startable() {
            Err(Error::ServiceUp(_)) => (),
            other => panic!("expected ServiceUp, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn startwait_promotes_to_running() {
        let mut svc = runnable("web");
        fake_up(&mut svc, 999901);
        assert_eq!(svc.state(), State::Starting);
        let later = SteadyTime::now() + time::Duration::seconds(60);
        assert!(svc.poll_timers(later).is_empty());
        assert_eq!(svc.state(), State::Running);
        assert!(svc.is_up());
    }

    #[test]
    fn startwait_without_pid_or_proxy_fails() {
        let mut svc = runnable("web");
        svc.begin_start();
        let later = SteadyTime::now() + time::Duration::seconds(60);
        svc.poll_timers(later);
        assert_eq!(svc.state(), State::Fail);
    }

    #[test]
    fn startwait_without_pid_waits_for_the_proxy() {
        let mut svc = runnable("web");
        svc.proxy = Some(String::from("pool"));
        svc.begin_start();
        let later = SteadyTime::now() + time::Duration::seconds(60);
        svc.poll_timers(later);
        assert_eq!(svc.state(), State::Starting);
        // the late pid re-arms the check
        svc.assign_pid(999903);
        assert_eq!(svc.pid(), Some(999903));
        svc.poll_timers(later + time::Duration::seconds(60));
        assert_eq!(svc.state(), State::Running);
    }

    #[test]
    fn clean_exit_stops_the_service() {
        let mut svc = runnable("web");
        fake_up(&mut svc, 999901);
        assert!(!svc.handle_exit(exited(0)));
        assert_eq!(svc.state(), State::Stopped);
        assert_eq!(svc.pid(), None);
    }

    #[test]
    fn sigterm_exit_counts_as_clean() {
        let mut svc = runnable("web");
        fake_up(&mut svc, 999901);
        svc.handle_exit(signaled(libc::SIGTERM));
        assert_eq!(svc.state(), State::Stopped);
        assert_eq!(svc.exit_status(), Some(signaled(libc::SIGTERM)));
        assert!(svc.normal_exit());
    }

    #[test]
    fn respawn_on_stop_requests_a_start() {
        let mut svc = runnable("web");
        svc.respawn_on_stop = true;
        fake_up(&mut svc, 999901);
        assert!(svc.handle_exit(exited(0)));
        assert_eq!(svc.state(), State::Stopped);
    }

    #[test]
    fn respawn_on_stop_respects_wants_down() {
        let mut svc = runnable("web");
        svc.respawn_on_stop = true;
        fake_up(&mut svc, 999901);
        svc.stop(false).unwrap();
        assert!(!svc.handle_exit(signaled(libc::SIGTERM)));
        assert_eq!(svc.state(), State::Stopped);
    }

    mod startup_failures {
        use super::*;

        #[test]
        fn first_failure_backs_off() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            assert!(!svc.handle_exit(exited(255)));
            assert_eq!(svc.state(), State::Backoff);
            assert_eq!(svc.backoff_retry(), 1);
        }

        #[test]
        fn backoff_retry_stays_below_the_cap() {
            let mut svc = runnable("web");
            svc.respawn_max_retries = 3;
            for attempt in 1..3 {
                fake_up(&mut svc, 999901);
                svc.handle_exit(exited(255));
                assert_eq!(svc.state(), State::Backoff);
                assert_eq!(svc.backoff_retry(), attempt);
                // the backoff timer requests the next start
                let later = SteadyTime::now() + time::Duration::seconds(60);
                assert_eq!(svc.poll_timers(later), vec![Followup::Start]);
            }
            fake_up(&mut svc, 999901);
            svc.handle_exit(exited(255));
            assert_eq!(svc.state(), State::Fatal);
            assert_eq!(svc.backoff_retry(), 3);
        }

        #[test]
        fn entering_running_clears_the_retry_counter() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            svc.handle_exit(exited(255));
            assert_eq!(svc.backoff_retry(), 1);
            fake_up(&mut svc, 999902);
            let later = SteadyTime::now() + time::Duration::seconds(60);
            svc.poll_timers(later);
            assert_eq!(svc.state(), State::Running);
            assert_eq!(svc.backoff_retry(), 0);
        }

        #[test]
        fn no_respawn_means_fail() {
            let mut svc = runnable("web");
            svc.respawn_on_fail = false;
            fake_up(&mut svc, 999901);
            svc.handle_exit(exited(255));
            assert_eq!(svc.state(), State::Fail);
            assert_eq!(svc.fail_reason(), Some("Exited with error 255"));
        }
    }

    mod running_failures {
        use super::*;

        #[test]
        fn running_failure_respawns_immediately() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            let later = SteadyTime::now() + time::Duration::seconds(60);
            svc.poll_timers(later);
            assert_eq!(svc.state(), State::Running);
            assert!(svc.handle_exit(exited(255)));
            assert_eq!(svc.state(), State::Fail);
        }

        #[test]
        fn wants_down_blocks_the_respawn() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            let later = SteadyTime::now() + time::Duration::seconds(60);
            svc.poll_timers(later);
            svc.stop(false).unwrap();
            assert!(!svc.handle_exit(signaled(libc::SIGKILL)));
            assert_eq!(svc.state(), State::Fail);
            assert_eq!(svc.fail_reason(), Some("Received signal 9"));
        }
    }

    mod stopping {
        use super::*;

        #[test]
        fn stop_on_a_down_service_is_an_error() {
            let mut svc = runnable("web");
            match svc.stop(false) {
                Err(Error::ServiceDown(_)) => (),
                other => panic!("expected ServiceDown, got {:?}", other),
            }
        }

        #[test]
        fn stop_from_backoff_lands_in_stopped() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            svc.handle_exit(exited(255));
            assert_eq!(svc.state(), State::Backoff);
            assert_eq!(svc.stop(false).unwrap(), StopOutcome::WasBackedOff);
            assert_eq!(svc.state(), State::Stopped);
            assert_eq!(svc.backoff_retry(), 0);
            // the stale backoff timer must not fire
            let later = SteadyTime::now() + time::Duration::seconds(60);
            assert!(svc.poll_timers(later).is_empty());
            assert_eq!(svc.state(), State::Stopped);
        }

        #[test]
        fn restart_poll_starts_once_down() {
            let mut svc = runnable("web");
            fake_up(&mut svc, 999901);
            svc.stop(false).unwrap();
            svc.arm_restart_poll();
            let later = SteadyTime::now() + time::Duration::seconds(60);
            // still stopping: the poll re-arms instead of starting
            assert!(svc.poll_timers(later).is_empty());
            svc.handle_exit(signaled(libc::SIGTERM));
            let even_later = later + time::Duration::seconds(60);
            assert_eq!(svc.poll_timers(even_later), vec![Followup::Start]);
        }
    }

    #[test]
    fn has_stopped_records_the_reason() {
        let mut svc = runnable("web");
        fake_up(&mut svc, 999901);
        svc.has_stopped("proxy stopped");
        assert_eq!(svc.state(), State::Fail);
        assert_eq!(svc.pid(), None);
        assert_eq!(svc.fail_reason(), Some("proxy stopped"));
    }

    #[test]
    fn backoff_delay_is_bounded() {
        for n in 1..6 {
            let delay = backoff_delay(n).num_milliseconds();
            assert!(delay >= BASE_BACKOFF_DELAY_MS);
            assert!(delay <= BASE_BACKOFF_DELAY_MS * (2 * n as i64 - 1));
        }
    }

    #[test]
    fn status_line_is_tab_separated() {
        let mut svc = runnable("web");
        svc.desc = Some(String::from("a web thing"));
        let line = svc.status_line("");
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], "web");
        assert_eq!(fields[1], "stopped");
        assert_eq!(fields[2], "");
        assert_eq!(fields[7], "sleep 1");
    }
}
