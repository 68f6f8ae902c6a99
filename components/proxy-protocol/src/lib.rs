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

//! Wire protocol between the supervisor and the proxy host.
//!
//! Three byte-stream pipes are inherited by the proxy at well-known
//! descriptor numbers and announced through environment variables. Command
//! and status records are one JSON object per line; the log pipe carries
//! `<stream>:<service-or-"-">:<payload>` lines.

extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

pub mod message;

pub use message::{Cmd, Command, LogRecord, Spawn, Status, Stream};

/// Descriptor the proxy reads commands from.
pub const COMMAND_FD: i32 = 3;
/// Descriptor the proxy writes status records to.
pub const STATUS_FD: i32 = 4;
/// Descriptor the proxy writes captured service output to.
pub const LOG_FD: i32 = 5;

pub const COMMAND_FD_ENVVAR: &'static str = "_CFK_COMMAND_FD";
pub const STATUS_FD_ENVVAR: &'static str = "_CFK_STATUS_FD";
pub const LOG_FD_ENVVAR: &'static str = "_CFK_LOG_FD";

const SOCK_ENVVAR_PREFIX: &'static str = "_CFK_SOCK_";

/// Environment variable announcing an inherited listening socket to the
/// proxy host, e.g. `_CFK_SOCK_web=6`.
pub fn sock_env_var(socket_name: &str) -> String {
    format!("{}{}", SOCK_ENVVAR_PREFIX, socket_name)
}
