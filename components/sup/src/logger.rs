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

//! The log sink: every captured line of service output lands here as a
//! `(kind, origin, stream, line)` tuple, tagged and written to a file or
//! to our stderr. Writes never block the event loop for long; the sink is
//! a plain buffered file.

use std::fs::OpenOptions;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use ansi_term::Colour;
use time;

use error::{Error, Result};
use protocol::{LogRecord, Stream};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match *self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    pub fn parse(raw: &str) -> Option<Level> {
        match raw.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }
}

/// Default mapping of a captured stream to a log level.
pub fn level_for_stream(stream: Stream) -> Level {
    match stream {
        Stream::Out => Level::Info,
        Stream::Err => Level::Error,
    }
}

pub struct Logger {
    path: Option<PathBuf>,
    level: Level,
    file: Option<File>,
    write_errored: bool,
}

impl Logger {
    pub fn new() -> Logger {
        Logger {
            path: None,
            level: Level::Info,
            file: None,
            write_errored: false,
        }
    }

    pub fn configure(&mut self, attr: &str, value: &str) -> Result<()> {
        match attr {
            "path" => {
                self.file = None;
                self.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
                Ok(())
            }
            "level" => match Level::parse(value) {
                Some(level) => {
                    self.level = level;
                    Ok(())
                }
                None => Err(Error::BadValue(attr.to_string(), value.to_string())),
            },
            _ => Err(Error::InvalidProperty(attr.to_string())),
        }
    }

    /// USR1 handler target: drop the open handle so the next emit reopens
    /// the (possibly rotated) file.
    pub fn reinit(&mut self) {
        info!("log sink reinit requested");
        self.file = None;
        self.write_errored = false;
    }

    pub fn output(&mut self, name: &str, stream: Stream, line: &str) {
        self.emit(level_for_stream(stream), name, Some(stream), line);
    }

    pub fn record(&mut self, record: &LogRecord) {
        let name = record.name.as_ref().map_or("-", |n| n.as_str());
        self.emit(
            level_for_stream(record.stream),
            name,
            Some(record.stream),
            &record.line,
        );
    }

    pub fn emit(&mut self, level: Level, name: &str, stream: Option<Stream>, line: &str) {
        if level < self.level {
            return;
        }
        let origin = match stream {
            Some(s) => format!("{}:{}", name, s.as_str()),
            None => name.to_string(),
        };
        let formatted = format_line(level, &origin, line);
        if self.path.is_some() {
            self.write_to_file(&formatted);
        } else {
            let out = if level >= Level::Error {
                format!("{}", Colour::Red.paint(formatted))
            } else {
                formatted
            };
            let _ = writeln!(io::stderr(), "{}", out);
        }
    }

    fn write_to_file(&mut self, formatted: &str) {
        if self.file.is_none() {
            let path = match self.path {
                Some(ref p) => p.clone(),
                None => return,
            };
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    self.file = Some(file);
                    self.write_errored = false;
                }
                Err(err) => {
                    if !self.write_errored {
                        error!("unable to open log file {}: {}", path.display(), err);
                        self.write_errored = true;
                    }
                    return;
                }
            }
        }
        if let Some(ref mut file) = self.file {
            if let Err(err) = writeln!(file, "{}", formatted) {
                if !self.write_errored {
                    error!("log write failed: {}", err);
                    self.write_errored = true;
                }
            }
        }
    }
}

fn format_line(level: Level, origin: &str, line: &str) -> String {
    let stamp = time::strftime("%Y-%m-%dT%H:%M:%S", &time::now())
        .unwrap_or_else(|_| String::from("-"));
    format!("{} {:<5} [{}] {}", stamp, level.as_str(), origin, line)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn streams_map_to_levels() {
        assert_eq!(level_for_stream(Stream::Out), Level::Info);
        assert_eq!(level_for_stream(Stream::Err), Level::Error);
    }

    #[test]
    fn levels_order_and_parse() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error < Level::Fatal);
        assert_eq!(Level::parse("WARN"), Some(Level::Warn));
        assert_eq!(Level::parse("bogus"), None);
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let mut logger = Logger::new();
        assert!(logger.configure("color", "on").is_err());
    }

    #[test]
    fn emits_to_the_configured_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let mut logger = Logger::new();
        logger
            .configure("path", path.to_str().unwrap())
            .unwrap();
        logger.output("web", Stream::Out, "hello there");
        logger.output("web", Stream::Err, "on fire");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("info  [web:out] hello there"));
        assert!(contents.contains("error [web:err] on fire"));
    }

    #[test]
    fn level_filter_suppresses_low_levels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let mut logger = Logger::new();
        logger.configure("path", path.to_str().unwrap()).unwrap();
        logger.configure("level", "error").unwrap();
        logger.output("web", Stream::Out, "chatter");
        logger.output("web", Stream::Err, "kaboom");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("chatter"));
        assert!(contents.contains("kaboom"));
    }

    #[test]
    fn reinit_reopens_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("svc.log");
        let mut logger = Logger::new();
        logger.configure("path", path.to_str().unwrap()).unwrap();
        logger.output("web", Stream::Out, "before");
        fs::remove_file(&path).unwrap();
        logger.reinit();
        logger.output("web", Stream::Out, "after");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("after"));
    }
}
