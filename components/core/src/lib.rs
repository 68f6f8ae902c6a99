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

//! OS plumbing shared by the ControlFreak supervisor and the proxy host:
//! signal dispositions, child reaping, fd flags and user lookups.

extern crate libc;
#[macro_use]
extern crate log;
#[cfg(not(windows))]
extern crate users as users_base;

pub mod error;
pub mod lineio;
pub mod os;

pub use error::{Error, Result};

/// Environment variable exporting the supervisor home directory to children.
pub const HOME_ENVVAR: &'static str = "CONTROL_FREAK_HOME";
/// Always injected into a service's environment at spawn time.
pub const ENABLED_ENVVAR: &'static str = "CONTROL_FREAK_ENABLED";
/// Carries the service name into the child's environment.
pub const SERVICE_ENVVAR: &'static str = "CONTROL_FREAK_SERVICE";
