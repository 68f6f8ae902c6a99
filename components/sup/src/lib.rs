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

//! The ControlFreak supervisor.
//!
//! A single-threaded daemon that launches, monitors, restarts and stops
//! user-defined services, routes their output into a log sink, shares
//! pre-bound listening sockets with them, and takes orders over a
//! line-oriented admin console. Services either run as direct children or
//! are forked out of a proxy host (`cfk-proxy`) so they share its
//! preloaded image.

extern crate ansi_term;
extern crate controlfreak_core as core;
extern crate libc;
#[macro_use]
extern crate log;
extern crate proxy_protocol as protocol;
extern crate rand;
extern crate serde_json;
#[cfg(test)]
extern crate tempfile;
extern crate time;

pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod logger;
pub mod manager;
pub mod sys;

pub use error::{Error, Result};

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Directory under the user's home that holds the admin socket by default.
pub const DEFAULT_HOME_DIR: &'static str = ".controlfreak";
/// Name of the admin socket inside the supervisor home.
pub const CONSOLE_SOCK: &'static str = "sock";
