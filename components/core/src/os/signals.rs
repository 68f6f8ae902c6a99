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

//! Process-wide signal flags.
//!
//! Handlers only flip atomics; the event loop drains them between ticks so
//! every state transition still happens on the loop.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{self, c_int};

use crate::error::{Error, Result};

static CAUGHT_SHUTDOWN: AtomicBool = AtomicBool::new(false);
static CAUGHT_SIGCHLD: AtomicBool = AtomicBool::new(false);
static CAUGHT_USR1: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown(_: c_int) {
    CAUGHT_SHUTDOWN.store(true, Ordering::SeqCst);
}

extern "C" fn handle_sigchld(_: c_int) {
    CAUGHT_SIGCHLD.store(true, Ordering::SeqCst);
}

extern "C" fn handle_usr1(_: c_int) {
    CAUGHT_USR1.store(true, Ordering::SeqCst);
}

fn install(sig: c_int, handler: extern "C" fn(c_int), flags: c_int) -> Result<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = flags;
        libc::sigemptyset(&mut action.sa_mask);
        match libc::sigaction(sig, &action, ptr::null_mut()) {
            0 => Ok(()),
            _ => Err(Error::SignalHandler(io::Error::last_os_error())),
        }
    }
}

/// Install the supervisor's handlers: HUP/INT/TERM request a clean
/// shutdown, USR1 a log reinit, CHLD wakes the reaper.
pub fn init() -> Result<()> {
    install(libc::SIGHUP, handle_shutdown, libc::SA_RESTART)?;
    install(libc::SIGINT, handle_shutdown, libc::SA_RESTART)?;
    install(libc::SIGTERM, handle_shutdown, libc::SA_RESTART)?;
    install(libc::SIGUSR1, handle_usr1, libc::SA_RESTART)?;
    install(
        libc::SIGCHLD,
        handle_sigchld,
        libc::SA_RESTART | libc::SA_NOCLDSTOP,
    )?;
    // A dead admin client must not take the daemon down with it.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    Ok(())
}

/// Only TERM and CHLD matter to the proxy host; the controlling terminal's
/// HUP/INT are left on their default dispositions so an interactive run
/// behaves like any other program.
pub fn init_proxy() -> Result<()> {
    install(libc::SIGTERM, handle_shutdown, libc::SA_RESTART)?;
    install(
        libc::SIGCHLD,
        handle_sigchld,
        libc::SA_RESTART | libc::SA_NOCLDSTOP,
    )?;
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    Ok(())
}

pub fn pending_shutdown() -> bool {
    CAUGHT_SHUTDOWN.swap(false, Ordering::SeqCst)
}

pub fn take_sigchld() -> bool {
    CAUGHT_SIGCHLD.swap(false, Ordering::SeqCst)
}

pub fn take_reload_logs() -> bool {
    CAUGHT_USR1.swap(false, Ordering::SeqCst)
}
