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

use std::collections::HashMap;
use std::fmt;

/// How to run a service: either a shell string handed to `/bin/sh -c`, or
/// an argument vector executed directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cmd {
    Shell(String),
    Argv(Vec<String>),
}

impl Cmd {
    pub fn is_empty(&self) -> bool {
        match *self {
            Cmd::Shell(ref s) => s.trim().is_empty(),
            Cmd::Argv(ref v) => v.is_empty() || v[0].trim().is_empty(),
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Cmd::Shell(ref s) => write!(f, "{}", s),
            Cmd::Argv(ref v) => write!(f, "{}", v.join(" ")),
        }
    }
}

/// Everything the proxy host needs to fork and exec one service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Spawn {
    pub name: String,
    pub cmd: Cmd,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub ignore_stdout: bool,
    #[serde(default)]
    pub ignore_stderr: bool,
    #[serde(default)]
    pub tie_stdin_to: Option<String>,
    #[serde(default)]
    pub no_new_session: bool,
}

/// Supervisor → proxy, one record per line on the command pipe.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    Start(Spawn),
    Stop { name: String },
}

/// Proxy → supervisor, one record per line on the status pipe. `status` in
/// `Stopped` is the raw wait status of the exited child.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Started { name: String, pid: i32 },
    Stopped { name: String, status: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stream {
    Out,
    Err,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Stream::Out => "out",
            Stream::Err => "err",
        }
    }
}

/// One captured line of service output relayed over the log pipe.
///
/// Rendered as `<stream>:<service-or-"-">:<payload>`; a `-` service name
/// marks output the proxy could not attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub stream: Stream,
    pub name: Option<String>,
    pub line: String,
}

impl LogRecord {
    pub fn render(&self) -> String {
        format!(
            "{}:{}:{}",
            self.stream.as_str(),
            self.name.as_ref().map(|n| n.as_str()).unwrap_or("-"),
            self.line
        )
    }

    pub fn parse(raw: &str) -> Option<LogRecord> {
        let mut fields = raw.splitn(3, ':');
        let stream = match fields.next() {
            Some("out") => Stream::Out,
            Some("err") => Stream::Err,
            _ => return None,
        };
        let name = match fields.next() {
            Some("-") => None,
            Some(n) if !n.is_empty() => Some(n.to_string()),
            _ => return None,
        };
        let line = match fields.next() {
            Some(payload) => payload.to_string(),
            None => return None,
        };
        Some(LogRecord {
            stream: stream,
            name: name,
            line: line,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json;

    #[test]
    fn command_records_are_tagged_lines() {
        let stop = Command::Stop { name: "web".to_string() };
        assert_eq!(
            serde_json::to_string(&stop).unwrap(),
            r#"{"command":"stop","name":"web"}"#
        );
    }

    #[test]
    fn start_record_carries_the_spawn_fields() {
        let raw = r#"{"command":"start","name":"web","cmd":"sleep 5","ignore_stderr":true}"#;
        match serde_json::from_str::<Command>(raw).unwrap() {
            Command::Start(spawn) => {
                assert_eq!(spawn.name, "web");
                assert_eq!(spawn.cmd, Cmd::Shell("sleep 5".to_string()));
                assert!(spawn.ignore_stderr);
                assert!(!spawn.ignore_stdout);
                assert!(spawn.env.is_empty());
            }
            other => panic!("expected a start record, got {:?}", other),
        }
    }

    #[test]
    fn cmd_accepts_a_string_or_a_vector() {
        let shell: Cmd = serde_json::from_str(r#""echo hi""#).unwrap();
        assert_eq!(shell, Cmd::Shell("echo hi".to_string()));
        let argv: Cmd = serde_json::from_str(r#"["echo","hi"]"#).unwrap();
        assert_eq!(argv, Cmd::Argv(vec!["echo".to_string(), "hi".to_string()]));
    }

    #[test]
    fn status_records_parse() {
        let started: Status =
            serde_json::from_str(r#"{"status":"started","name":"web","pid":42}"#).unwrap();
        match started {
            Status::Started { ref name, pid } => {
                assert_eq!(name, "web");
                assert_eq!(pid, 42);
            }
            other => panic!("expected started, got {:?}", other),
        }
    }

    #[test]
    fn log_records_render_and_parse() {
        let rec = LogRecord {
            stream: Stream::Err,
            name: Some("web".to_string()),
            line: "boom: disk on fire".to_string(),
        };
        let raw = rec.render();
        assert_eq!(raw, "err:web:boom: disk on fire");
        assert_eq!(LogRecord::parse(&raw).unwrap(), rec);
    }

    #[test]
    fn anonymous_log_record_uses_a_dash() {
        let rec = LogRecord {
            stream: Stream::Out,
            name: None,
            line: "hello".to_string(),
        };
        assert_eq!(rec.render(), "out:-:hello");
        assert_eq!(LogRecord::parse("out:-:hello").unwrap().name, None);
    }

    #[test]
    fn garbage_log_lines_are_rejected() {
        assert!(LogRecord::parse("nope").is_none());
        assert!(LogRecord::parse("warn:web:line").is_none());
        assert!(LogRecord::parse("out:web").is_none());
    }
}
