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

//! The proxy host: a long-lived child of the supervisor that forks and
//! execs services on demand so they share its preloaded image. Commands
//! arrive on an inherited pipe; exit statuses and captured service output
//! go back over two more.

extern crate controlfreak_core as core;
extern crate libc;
#[macro_use]
extern crate log;
extern crate proxy_protocol as protocol;
extern crate serde_json;
extern crate time;

pub mod error;
pub mod server;
pub mod service;

pub use error::{Error, Result};
