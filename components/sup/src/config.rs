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

//! Config files are just admin commands, one per line, applied with full
//! privilege. `logger` lines run first so nothing is captured into a
//! half-configured sink; everything else keeps file order. `${BASE}` is
//! replaced with the caller-supplied base directory.

use std::fs;
use std::path::Path;

use command;
use error::{Error, Result};
use manager::Manager;

pub fn apply_file(mgr: &mut Manager, path: &Path) -> Result<()> {
    let text =
        fs::read_to_string(path).map_err(|e| Error::ConfigIo(path.to_path_buf(), e))?;
    info!("applying config {}", path.display());
    apply_str(mgr, &text)
}

/// Apply a config document. Lines that fail are logged and skipped; the
/// first failure is reported once the whole document has been applied.
pub fn apply_str(mgr: &mut Manager, text: &str) -> Result<()> {
    let base = mgr.base.clone().unwrap_or_default();
    let mut logger_lines = Vec::new();
    let mut other_lines = Vec::new();
    for raw in text.lines() {
        let line = raw.replace("${BASE}", &base);
        match line.split_whitespace().next() {
            Some("logger") => logger_lines.push(line),
            _ => other_lines.push(line),
        }
    }
    let mut first_err = None;
    for line in logger_lines.into_iter().chain(other_lines.into_iter()) {
        match command::dispatch(mgr, &line, true, true) {
            Ok(_) => {}
            Err(err) => {
                error!("config line '{}': {}", line.trim(), err);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
