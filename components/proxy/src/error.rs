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

use std::error;
use std::fmt;
use std::io;
use std::result;

use core;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Core(core::Error),
    /// One of the `_CFK_*_FD` variables was absent or unparsable.
    BadPipeEnv(String),
    /// A `tie_stdin_to` socket was not announced to this host.
    NoSuchSocket(String),
    Preload(String, io::Error),
    Spawn(io::Error),
    /// Writing to the status or log pipe failed; the supervisor is gone.
    PipeWrite(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Core(ref e) => write!(f, "{}", e),
            Error::BadPipeEnv(ref var) => {
                write!(f, "missing or invalid pipe descriptor in {}", var)
            }
            Error::NoSuchSocket(ref name) => {
                write!(f, "no inherited socket named '{}'", name)
            }
            Error::Preload(ref path, ref e) => {
                write!(f, "unable to preload {}, {}", path, e)
            }
            Error::Spawn(ref e) => write!(f, "unable to spawn service, {}", e),
            Error::PipeWrite(ref e) => write!(f, "unable to write to supervisor, {}", e),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::Core(_) => "os error",
            Error::BadPipeEnv(_) => "missing or invalid pipe descriptor",
            Error::NoSuchSocket(_) => "no such inherited socket",
            Error::Preload(..) => "unable to preload",
            Error::Spawn(_) => "unable to spawn service",
            Error::PipeWrite(_) => "unable to write to supervisor",
        }
    }
}

impl From<core::Error> for Error {
    fn from(err: core::Error) -> Error {
        Error::Core(err)
    }
}
