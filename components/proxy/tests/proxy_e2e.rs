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

//! Supervisor and proxy host end to end: services forked by `cfk-proxy`,
//! statuses and logs relayed over the three pipes.

extern crate controlfreak_sup as sup;
extern crate libc;
extern crate proxy_protocol as protocol;
extern crate tempfile;

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use protocol::Cmd;
use sup::manager::service::State;
use sup::manager::{Manager, ManagerConfig};
use tempfile::TempDir;

const PROXY_BIN: &'static str = env!("CARGO_BIN_EXE_cfk-proxy");

fn manager() -> (Manager, TempDir) {
    let dir = TempDir::new().unwrap();
    let cfg = ManagerConfig {
        home: dir.path().to_path_buf(),
        base: None,
        config_path: None,
    };
    (Manager::new(cfg), dir)
}

fn pump_until<F>(mgr: &mut Manager, timeout_ms: u64, pred: F) -> bool
where
    F: Fn(&Manager) -> bool,
{
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        mgr.tick();
        if pred(mgr) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn setup_proxy(mgr: &mut Manager, dir: &TempDir, name: &str) {
    let preload = dir.path().join("image.bin");
    fs::write(&preload, b"shared bytes the services fork with").unwrap();
    let proxy = mgr.find_or_create_proxy(name);
    proxy.cmd = Some(Cmd::Argv(vec![
        PROXY_BIN.to_string(),
        String::from("--preload"),
        preload.to_string_lossy().into_owned(),
    ]));
}

#[test]
fn auto_proxy_follows_its_service() {
    let (mut mgr, dir) = manager();
    setup_proxy(&mut mgr, &dir, "a");
    {
        let svc = mgr.find_or_create_service("somesvc");
        svc.proxy = Some(String::from("a"));
        svc.cmd = Some(Cmd::Shell(String::from("sleep 10")));
        svc.startwait_secs = 0.25;
    }
    mgr.attach_to_proxy("a", "somesvc");
    // starting the service drags the proxy up with it
    mgr.start_service("somesvc").unwrap();
    assert!(mgr.proxy("a").unwrap().is_up(), "proxy did not auto-start");
    let ok = pump_until(&mut mgr, 3000, |m| {
        m.service("somesvc").unwrap().state() == State::Running
            && m.service("somesvc").unwrap().pid().is_some()
    });
    assert!(ok, "service never ran under the proxy");
    // stopping the last service takes the proxy down too
    mgr.stop_service("somesvc").unwrap();
    let ok = pump_until(&mut mgr, 4000, |m| {
        m.service("somesvc").unwrap().is_down() && !m.proxy("a").unwrap().is_up()
    });
    assert!(ok, "proxy or service survived the stop");
}

#[test]
fn proxied_service_output_reaches_the_log_sink() {
    let (mut mgr, dir) = manager();
    let log_path = dir.path().join("sink.log");
    mgr.logger
        .configure("path", log_path.to_str().unwrap())
        .unwrap();
    setup_proxy(&mut mgr, &dir, "pool");
    {
        let svc = mgr.find_or_create_service("talker");
        svc.proxy = Some(String::from("pool"));
        svc.cmd = Some(Cmd::Shell(String::from(
            "echo out the front; echo err the back 1>&2; sleep 0.2",
        )));
        svc.startwait_secs = 0.1;
    }
    mgr.attach_to_proxy("pool", "talker");
    mgr.start_service("talker").unwrap();
    let ok = pump_until(&mut mgr, 4000, |m| {
        m.service("talker").unwrap().state() == State::Stopped
    });
    assert!(ok, "talker never finished");
    // the auto proxy follows it down
    assert!(pump_until(&mut mgr, 4000, |m| !m.proxy("pool").unwrap().is_up()));
    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(
        contents.contains("[talker:out] out the front"),
        "stdout line missing from sink: {}",
        contents
    );
    assert!(
        contents.contains("[talker:err] err the back"),
        "stderr line missing from sink: {}",
        contents
    );
}

#[test]
fn killed_proxy_fails_its_services() {
    let (mut mgr, dir) = manager();
    setup_proxy(&mut mgr, &dir, "doomed");
    {
        let svc = mgr.find_or_create_service("victim");
        svc.proxy = Some(String::from("doomed"));
        svc.cmd = Some(Cmd::Shell(String::from("sleep 10")));
        svc.startwait_secs = 0.25;
    }
    mgr.attach_to_proxy("doomed", "victim");
    mgr.start_service("victim").unwrap();
    assert!(pump_until(&mut mgr, 3000, |m| {
        m.service("victim").unwrap().state() == State::Running
    }));
    // simulate a proxy crash
    let proxy_pid = mgr.proxy("doomed").unwrap().pid().unwrap();
    unsafe {
        assert_eq!(libc::kill(proxy_pid, libc::SIGKILL), 0);
    }
    let ok = pump_until(&mut mgr, 4000, |m| {
        m.service("victim").unwrap().state() == State::Fail
    });
    assert!(ok, "service did not notice the proxy crash");
    assert_eq!(
        mgr.service("victim").unwrap().fail_reason(),
        Some("proxy stopped")
    );
    assert!(!mgr.proxy("doomed").unwrap().is_up());
}
