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
use std::path::PathBuf;
use std::result;

use core;

pub type Result<T> = result::Result<T, Error>;

/// Everything that can go wrong, from user-visible command errors (surfaced
/// as `ERROR: <reason>` on the console) to daemon-level failures.
#[derive(Debug)]
pub enum Error {
    BadValue(String, String),
    ConfigIo(PathBuf, io::Error),
    ConsoleIo(io::Error),
    ConsoleStarted,
    Core(core::Error),
    EmptyCmd(String),
    HomeIo(PathBuf, io::Error),
    InvalidAssignment(String),
    InvalidProperty(String),
    InvalidServiceName(String),
    NoConfig,
    NotRunning(String),
    Privilege,
    ProxyDown(String),
    ProxyPipe(String, io::Error),
    ProxyUp(String),
    SelectorArity,
    ServiceDown(String),
    ServiceNotDown(String),
    ServiceStopping(String),
    ServiceUp(String),
    SocketBind(String, io::Error),
    SocketBound(String),
    SocketConfig(String),
    SocketNotBound(String),
    Spawn(String, io::Error),
    UnknownCommand(String),
    UnknownProxy(String),
    UnknownSelector(String),
    UnknownService(String),
    UnknownSocket(String),
    VoidCommand,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::BadValue(ref attr, ref value) => {
                write!(f, "invalid value '{}' for '{}'", value, attr)
            }
            Error::ConfigIo(ref path, ref e) => {
                write!(f, "unable to read config {}, {}", path.display(), e)
            }
            Error::ConsoleIo(ref e) => write!(f, "console error, {}", e),
            Error::ConsoleStarted => write!(f, "console is already started"),
            Error::Core(ref e) => write!(f, "{}", e),
            Error::EmptyCmd(ref name) => {
                write!(f, "'{}' has no command defined", name)
            }
            Error::HomeIo(ref path, ref e) => {
                write!(f, "unable to set up home {}, {}", path.display(), e)
            }
            Error::InvalidAssignment(ref raw) => {
                write!(f, "expected <attribute>=<value>, got '{}'", raw)
            }
            Error::InvalidProperty(ref attr) => write!(f, "invalid property '{}'", attr),
            Error::InvalidServiceName(ref name) => {
                write!(f, "invalid service name '{}'", name)
            }
            Error::NoConfig => write!(f, "no config file to reload"),
            Error::NotRunning(ref name) => write!(f, "service '{}' is not running", name),
            Error::Privilege => write!(f, "insufficient privilege"),
            Error::ProxyDown(ref name) => write!(f, "proxy '{}' is not running", name),
            Error::ProxyPipe(ref name, ref e) => {
                write!(f, "unable to talk to proxy '{}', {}", name, e)
            }
            Error::ProxyUp(ref name) => write!(f, "proxy '{}' is already up", name),
            Error::SelectorArity => write!(f, "wrong number of arguments for selector"),
            Error::ServiceDown(ref name) => write!(f, "service '{}' is already down", name),
            Error::ServiceNotDown(ref name) => {
                write!(f, "service '{}' must be down first", name)
            }
            Error::ServiceStopping(ref name) => {
                write!(f, "service '{}' is already stopping", name)
            }
            Error::ServiceUp(ref name) => write!(f, "service '{}' is already up", name),
            Error::SocketBind(ref name, ref e) => {
                write!(f, "unable to bind socket '{}', {}", name, e)
            }
            Error::SocketBound(ref name) => write!(f, "socket '{}' is already bound", name),
            Error::SocketConfig(ref name) => {
                write!(f, "socket '{}' has no address configured", name)
            }
            Error::SocketNotBound(ref name) => write!(f, "socket '{}' is not bound", name),
            Error::Spawn(ref name, ref e) => {
                write!(f, "unable to spawn service '{}', {}", name, e)
            }
            Error::UnknownCommand(ref verb) => write!(f, "unknown command '{}'", verb),
            Error::UnknownProxy(ref name) => write!(f, "unknown proxy '{}'", name),
            Error::UnknownSelector(ref sel) => write!(f, "unknown selector '{}'", sel),
            Error::UnknownService(ref name) => write!(f, "unknown service '{}'", name),
            Error::UnknownSocket(ref name) => write!(f, "unknown socket '{}'", name),
            Error::VoidCommand => write!(f, "command is void"),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::BadValue(..) => "invalid value",
            Error::ConfigIo(..) => "unable to read config",
            Error::ConsoleIo(_) => "console error",
            Error::ConsoleStarted => "console is already started",
            Error::Core(_) => "os error",
            Error::EmptyCmd(_) => "no command defined",
            Error::HomeIo(..) => "unable to set up home",
            Error::InvalidAssignment(_) => "invalid assignment",
            Error::InvalidProperty(_) => "invalid property",
            Error::InvalidServiceName(_) => "invalid service name",
            Error::NoConfig => "no config file to reload",
            Error::NotRunning(_) => "service is not running",
            Error::Privilege => "insufficient privilege",
            Error::ProxyDown(_) => "proxy is not running",
            Error::ProxyPipe(..) => "unable to talk to proxy",
            Error::ProxyUp(_) => "proxy is already up",
            Error::SelectorArity => "wrong number of arguments for selector",
            Error::ServiceDown(_) => "service is already down",
            Error::ServiceNotDown(_) => "service must be down first",
            Error::ServiceStopping(_) => "service is already stopping",
            Error::ServiceUp(_) => "service is already up",
            Error::SocketBind(..) => "unable to bind socket",
            Error::SocketBound(_) => "socket is already bound",
            Error::SocketConfig(_) => "socket has no address configured",
            Error::SocketNotBound(_) => "socket is not bound",
            Error::Spawn(..) => "unable to spawn service",
            Error::UnknownCommand(_) => "unknown command",
            Error::UnknownProxy(_) => "unknown proxy",
            Error::UnknownSelector(_) => "unknown selector",
            Error::UnknownService(_) => "unknown service",
            Error::UnknownSocket(_) => "unknown socket",
            Error::VoidCommand => "command is void",
        }
    }
}

impl From<core::Error> for Error {
    fn from(err: core::Error) -> Error {
        Error::Core(err)
    }
}
