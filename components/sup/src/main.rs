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

extern crate clap;
extern crate controlfreak_sup as sup;
extern crate env_logger;

use std::path::PathBuf;
use std::process;

use clap::{App, Arg};

use sup::manager::{Manager, ManagerConfig};

fn main() {
    env_logger::init();
    if let Err(err) = start() {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn start() -> sup::Result<()> {
    let matches = cli().get_matches();
    let mut cfg = ManagerConfig::default();
    if let Some(home) = matches.value_of("home") {
        cfg.home = PathBuf::from(home);
    }
    if let Some(config) = matches.value_of("config") {
        cfg.config_path = Some(PathBuf::from(config));
    }
    if let Some(base) = matches.value_of("base") {
        cfg.base = Some(base.to_string());
    }
    let mut manager = Manager::new(cfg);
    if let Some(addr) = matches.value_of("console") {
        manager.console.set_address(addr);
    }
    if matches.is_present("restricted") {
        manager.console.full = false;
    }
    manager.run()
}

fn cli<'a, 'b>() -> App<'a, 'b> {
    App::new("cfk-sup")
        .about("ControlFreak process supervisor")
        .version(sup::VERSION)
        .arg(
            Arg::with_name("home")
                .long("home")
                .value_name("DIR")
                .takes_value(true)
                .help("Supervisor home directory [default: ~/.controlfreak]"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .short("c")
                .value_name("FILE")
                .takes_value(true)
                .help("File of admin commands applied at startup"),
        )
        .arg(
            Arg::with_name("base")
                .long("base")
                .value_name("DIR")
                .takes_value(true)
                .help("Directory substituted for ${BASE} in the config file"),
        )
        .arg(
            Arg::with_name("console")
                .long("console")
                .value_name("ADDR")
                .takes_value(true)
                .help("Admin console address, host:port or a socket path [default: <home>/sock]"),
        )
        .arg(
            Arg::with_name("restricted")
                .long("restricted")
                .help("Only accept unprivileged commands on the console"),
        )
}
