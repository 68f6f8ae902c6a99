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

use crate::os::process::Pid;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// `fcntl(2)` refused a flag change on the given descriptor.
    Fcntl(io::Error),
    /// A group name had no entry in the group database.
    GroupNotFound(String),
    /// `pipe(2)` failed.
    Pipe(io::Error),
    /// Delivering a signal to the given pid failed.
    SignalFailed(Pid, io::Error),
    /// Installing a signal handler failed.
    SignalHandler(io::Error),
    /// A user name had no entry in the password database.
    UserNotFound(String),
    /// `waitpid(2)` on the given pid failed.
    WaitFailed(Pid, io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Fcntl(ref e) => write!(f, "fcntl failed, {}", e),
            Error::GroupNotFound(ref g) => write!(f, "no gid for group '{}'", g),
            Error::Pipe(ref e) => write!(f, "unable to create pipe, {}", e),
            Error::SignalFailed(pid, ref e) => {
                write!(f, "unable to signal process {}, {}", pid, e)
            }
            Error::SignalHandler(ref e) => write!(f, "unable to install signal handler, {}", e),
            Error::UserNotFound(ref u) => write!(f, "no uid for user '{}'", u),
            Error::WaitFailed(pid, ref e) => write!(f, "unable to wait on process {}, {}", pid, e),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::Fcntl(_) => "fcntl failed",
            Error::GroupNotFound(_) => "group not found",
            Error::Pipe(_) => "unable to create pipe",
            Error::SignalFailed(..) => "unable to signal process",
            Error::SignalHandler(_) => "unable to install signal handler",
            Error::UserNotFound(_) => "user not found",
            Error::WaitFailed(..) => "unable to wait on process",
        }
    }
}
