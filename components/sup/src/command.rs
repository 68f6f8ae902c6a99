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

//! The admin-command dispatcher.
//!
//! One text line in, either response lines out or an error out. The verb
//! set is closed; attribute assignment goes through a typed setter per
//! record so an unknown attribute is rejected instead of silently stored.

use serde_json;

use error::{Error, Result};
use manager::Manager;
use manager::proxy::Proxy;
use manager::service::Service;
use manager::socket::Socket;
use protocol::Cmd;

/// Dispatch one admin command line.
///
/// `has_priv` is true for trusted sources (config file, full consoles);
/// configuration verbs require it. With `ignore_void`, blank lines and
/// comments dissolve silently instead of erroring.
pub fn dispatch(
    mgr: &mut Manager,
    raw: &str,
    has_priv: bool,
    ignore_void: bool,
) -> Result<Vec<String>> {
    let line = strip_comment(raw);
    let line = line.trim();
    if line.is_empty() {
        if ignore_void {
            return Ok(Vec::new());
        }
        return Err(Error::VoidCommand);
    }
    let mut tokens = line.splitn(2, |c: char| c.is_whitespace());
    let verb = tokens.next().unwrap_or("");
    let rest = tokens.next().unwrap_or("").trim();
    match verb {
        "service" => {
            require_priv(has_priv)?;
            service_assignment(mgr, rest, None)?;
            Ok(Vec::new())
        }
        "socket" => {
            require_priv(has_priv)?;
            socket_assignment(mgr, rest)?;
            Ok(Vec::new())
        }
        "proxy" => {
            require_priv(has_priv)?;
            proxy_assignment(mgr, rest)?;
            Ok(Vec::new())
        }
        "console" => {
            require_priv(has_priv)?;
            let (attr, value) = split_assignment(rest)?;
            mgr.console.configure(attr, &unquote(value))?;
            Ok(Vec::new())
        }
        "logger" => {
            require_priv(has_priv)?;
            let (attr, value) = split_assignment(rest)?;
            mgr.logger.configure(attr, &unquote(value))?;
            Ok(Vec::new())
        }
        "command" => run_command(mgr, rest),
        unknown => Err(Error::UnknownCommand(unknown.to_string())),
    }
}

fn run_command(mgr: &mut Manager, rest: &str) -> Result<Vec<String>> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(Error::VoidCommand);
    }
    let args = &tokens[1..];
    match tokens[0] {
        "start" => {
            for name in services_from_args(mgr, args)? {
                mgr.start_service(&name)?;
            }
            Ok(Vec::new())
        }
        "stop" => {
            for name in services_from_args(mgr, args)? {
                mgr.stop_service(&name)?;
            }
            Ok(Vec::new())
        }
        "restart" => {
            for name in services_from_args(mgr, args)? {
                mgr.restart_service(&name)?;
            }
            Ok(Vec::new())
        }
        "up" => {
            for name in services_from_args(mgr, args)? {
                mgr.up_service(&name)?;
            }
            Ok(Vec::new())
        }
        "down" => {
            for name in services_from_args(mgr, args)? {
                mgr.down_service(&name)?;
            }
            Ok(Vec::new())
        }
        "destroy" => {
            for name in services_from_args(mgr, args)? {
                mgr.destroy_service(&name)?;
            }
            Ok(Vec::new())
        }
        "proxyup" => {
            if args.len() != 1 {
                return Err(Error::SelectorArity);
            }
            mgr.proxy_up(args[0])?;
            Ok(Vec::new())
        }
        "proxydown" => {
            if args.len() != 1 {
                return Err(Error::SelectorArity);
            }
            mgr.proxy_down(args[0])?;
            Ok(Vec::new())
        }
        "list" => Ok(mgr.list_services()),
        "status" => {
            let names = optional_selector(mgr, args)?;
            Ok(mgr.status_lines(&names))
        }
        "desc" => {
            let names = optional_selector(mgr, args)?;
            Ok(mgr.desc_lines(&names))
        }
        "pids" => {
            let names = optional_selector(mgr, args)?;
            Ok(mgr.pid_lines(&names))
        }
        "proxystatus" => Ok(mgr.proxy_status_lines()),
        "bind" => {
            if args.len() != 1 {
                return Err(Error::SelectorArity);
            }
            mgr.bind_socket(args[0])?;
            Ok(Vec::new())
        }
        "version" => Ok(vec![::VERSION.to_string()]),
        "shutdown" => {
            mgr.request_shutdown();
            Ok(Vec::new())
        }
        "reload_config" => {
            mgr.reload_config()?;
            Ok(Vec::new())
        }
        unknown => Err(Error::UnknownCommand(unknown.to_string())),
    }
}

/// Resolve a `<selector>` (`service <name>` | `tag <tag>` | `all`) into
/// service names, with explicit errors for arity mistakes and unknown
/// selectors.
pub fn services_from_args(mgr: &Manager, args: &[&str]) -> Result<Vec<String>> {
    match args.first() {
        Some(&"service") => {
            if args.len() != 2 {
                return Err(Error::SelectorArity);
            }
            if !mgr.has_service(args[1]) {
                return Err(Error::UnknownService(args[1].to_string()));
            }
            Ok(vec![args[1].to_string()])
        }
        Some(&"tag") => {
            if args.len() != 2 {
                return Err(Error::SelectorArity);
            }
            Ok(mgr.services_with_tag(args[1]))
        }
        Some(&"all") => {
            if args.len() != 1 {
                return Err(Error::SelectorArity);
            }
            Ok(mgr.service_names())
        }
        Some(other) => Err(Error::UnknownSelector(other.to_string())),
        None => Err(Error::SelectorArity),
    }
}

fn optional_selector(mgr: &Manager, args: &[&str]) -> Result<Vec<String>> {
    if args.is_empty() {
        Ok(mgr.service_names())
    } else {
        services_from_args(mgr, args)
    }
}

fn service_assignment(mgr: &mut Manager, rest: &str, attach_proxy: Option<&str>) -> Result<()> {
    let mut parts = rest.splitn(2, |c: char| c.is_whitespace());
    let name = parts.next().unwrap_or("");
    let assignment = parts.next().unwrap_or("").trim();
    if !is_valid_name(name) {
        return Err(Error::InvalidServiceName(name.to_string()));
    }
    let (attr, value) = split_assignment(assignment)?;
    let value = unquote(value);
    {
        let svc = mgr.find_or_create_service(name);
        if let Some(proxy) = attach_proxy {
            svc.proxy = Some(proxy.to_string());
        }
        apply_service_attr(svc, attr, &value)?;
    }
    if let Some(proxy) = attach_proxy {
        mgr.attach_to_proxy(proxy, name);
    }
    Ok(())
}

fn socket_assignment(mgr: &mut Manager, rest: &str) -> Result<()> {
    let mut parts = rest.splitn(2, |c: char| c.is_whitespace());
    let name = parts.next().unwrap_or("");
    let assignment = parts.next().unwrap_or("").trim();
    if !is_valid_name(name) {
        return Err(Error::InvalidServiceName(name.to_string()));
    }
    let (attr, value) = split_assignment(assignment)?;
    let value = unquote(value);
    let sock = mgr.find_or_create_socket(name);
    apply_socket_attr(sock, attr, &value)
}

fn proxy_assignment(mgr: &mut Manager, rest: &str) -> Result<()> {
    let mut parts = rest.splitn(2, |c: char| c.is_whitespace());
    let name = parts.next().unwrap_or("");
    let assignment = parts.next().unwrap_or("").trim();
    if !is_valid_name(name) {
        return Err(Error::InvalidServiceName(name.to_string()));
    }
    // `proxy <name> service <service-assignment>` attaches a service.
    if assignment == "service" || assignment.starts_with("service ")
        || assignment.starts_with("service\t")
    {
        let svc_part = assignment["service".len()..].trim();
        mgr.find_or_create_proxy(name);
        return service_assignment(mgr, svc_part, Some(name));
    }
    let (attr, value) = split_assignment(assignment)?;
    let value = unquote(value);
    let proxy = mgr.find_or_create_proxy(name);
    apply_proxy_attr(proxy, attr, &value)
}

pub fn apply_service_attr(svc: &mut Service, attr: &str, value: &str) -> Result<()> {
    match attr {
        "cmd" => {
            svc.cmd = parse_cmd_value(attr, value)?;
            Ok(())
        }
        "desc" => {
            svc.desc = opt_string(value);
            Ok(())
        }
        "cwd" => {
            svc.cwd = opt_string(value);
            Ok(())
        }
        "user" => {
            svc.user = opt_string(value);
            Ok(())
        }
        "group" => {
            svc.group = opt_string(value);
            Ok(())
        }
        "tie_stdin_to" => {
            svc.tie_stdin_to = opt_string(value);
            Ok(())
        }
        "tags" => {
            svc.tags = value
                .split(',')
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string())
                .collect();
            Ok(())
        }
        "priority" => {
            svc.priority = parse_opt_num(attr, value)?;
            Ok(())
        }
        "startwait_secs" => {
            svc.startwait_secs = parse_secs(attr, value)?;
            Ok(())
        }
        "stopwait_secs" => {
            svc.stopwait_secs = parse_secs(attr, value)?;
            Ok(())
        }
        "respawn_max_retries" => {
            svc.respawn_max_retries = value
                .parse::<u32>()
                .map_err(|_| Error::BadValue(attr.to_string(), value.to_string()))?;
            Ok(())
        }
        "ignore_stdout" => {
            svc.ignore_stdout = required_bool(attr, value)?;
            Ok(())
        }
        "ignore_stderr" => {
            svc.ignore_stderr = required_bool(attr, value)?;
            Ok(())
        }
        "respawn_on_fail" => {
            svc.respawn_on_fail = required_bool(attr, value)?;
            Ok(())
        }
        "respawn_on_stop" => {
            svc.respawn_on_stop = required_bool(attr, value)?;
            Ok(())
        }
        "no_new_session" => {
            svc.no_new_session = required_bool(attr, value)?;
            Ok(())
        }
        "env" => {
            if value.is_empty() {
                svc.env.clear();
                return Ok(());
            }
            let mut kv = value.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some(key), Some(val)) if !key.is_empty() => {
                    svc.env.insert(key.to_string(), val.to_string());
                    Ok(())
                }
                _ => Err(Error::BadValue(attr.to_string(), value.to_string())),
            }
        }
        unknown => Err(Error::InvalidProperty(unknown.to_string())),
    }
}

pub fn apply_socket_attr(sock: &mut Socket, attr: &str, value: &str) -> Result<()> {
    match attr {
        "host" => {
            sock.host = opt_string(value);
            Ok(())
        }
        "service" => {
            sock.service = opt_string(value);
            Ok(())
        }
        "nonblocking" => {
            sock.nonblocking = required_bool(attr, value)?;
            Ok(())
        }
        "listen_qsize" => {
            sock.listen_qsize = value
                .parse::<i32>()
                .map_err(|_| Error::BadValue(attr.to_string(), value.to_string()))?;
            Ok(())
        }
        unknown => Err(Error::InvalidProperty(unknown.to_string())),
    }
}

pub fn apply_proxy_attr(proxy: &mut Proxy, attr: &str, value: &str) -> Result<()> {
    match attr {
        "cmd" => {
            proxy.cmd = parse_cmd_value(attr, value)?;
            Ok(())
        }
        "auto" => {
            proxy.auto = required_bool(attr, value)?;
            Ok(())
        }
        "env" => {
            if value.is_empty() {
                proxy.env.clear();
                return Ok(());
            }
            let mut kv = value.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some(key), Some(val)) if !key.is_empty() => {
                    proxy.env.insert(key.to_string(), val.to_string());
                    Ok(())
                }
                _ => Err(Error::BadValue(attr.to_string(), value.to_string())),
            }
        }
        unknown => Err(Error::InvalidProperty(unknown.to_string())),
    }
}

/// A `[...]` RHS is a structured argv; anything else is a shell command.
fn parse_cmd_value(attr: &str, value: &str) -> Result<Option<Cmd>> {
    if value.is_empty() {
        return Ok(None);
    }
    if value.starts_with('[') {
        let argv: Vec<String> = serde_json::from_str(value)
            .map_err(|_| Error::BadValue(attr.to_string(), value.to_string()))?;
        if argv.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Cmd::Argv(argv)));
    }
    Ok(Some(Cmd::Shell(value.to_string())))
}

fn parse_secs(attr: &str, value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(secs) if secs > 0.0 => Ok(secs),
        _ => Err(Error::BadValue(attr.to_string(), value.to_string())),
    }
}

fn parse_opt_num(attr: &str, value: &str) -> Result<Option<i32>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i32>()
        .map(Some)
        .map_err(|_| Error::BadValue(attr.to_string(), value.to_string()))
}

fn required_bool(attr: &str, value: &str) -> Result<bool> {
    parse_bool(value).ok_or_else(|| Error::BadValue(attr.to_string(), value.to_string()))
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "on" | "enabled" | "yes" => Some(true),
        "0" | "false" | "off" | "disabled" | "no" => Some(false),
        _ => None,
    }
}

/// Service, socket and proxy names: alphanumerics plus `_` and `-`, and
/// never the bare `-` (it means "no name" in the log pipe format).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "-"
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    let eq = match raw.find('=') {
        Some(pos) => pos,
        None => return Err(Error::InvalidAssignment(raw.to_string())),
    };
    let attr = raw[..eq].trim();
    let value = raw[eq + 1..].trim();
    if attr.is_empty() || attr.contains(char::is_whitespace) {
        return Err(Error::InvalidAssignment(raw.to_string()));
    }
    Ok((attr, value))
}

fn strip_comment(raw: &str) -> &str {
    match raw.find('#') {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'\'' || first == b'"') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn require_priv(has_priv: bool) -> Result<()> {
    if has_priv {
        Ok(())
    } else {
        Err(Error::Privilege)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use manager::{Manager, ManagerConfig};
    use manager::service::State;
    use tempfile::TempDir;

    fn test_manager() -> (Manager, TempDir) {
        let dir = TempDir::new().unwrap();
        let cfg = ManagerConfig {
            home: dir.path().to_path_buf(),
            base: None,
            config_path: None,
        };
        (Manager::new(cfg), dir)
    }

    fn ok(mgr: &mut Manager, line: &str) -> Vec<String> {
        match dispatch(mgr, line, true, false) {
            Ok(lines) => lines,
            Err(err) => panic!("'{}' failed: {}", line, err),
        }
    }

    #[test]
    fn names_are_validated() {
        assert!(is_valid_name("web-1_a"));
        assert!(!is_valid_name("-"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a/b"));
    }

    #[test]
    fn bools_accept_the_documented_spellings() {
        for raw in &["1", "true", "on", "enabled", "yes", "TRUE", "On"] {
            assert_eq!(parse_bool(raw), Some(true), "{}", raw);
        }
        for raw in &["0", "false", "off", "disabled", "no"] {
            assert_eq!(parse_bool(raw), Some(false), "{}", raw);
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn comments_and_void_lines() {
        let (mut mgr, _dir) = test_manager();
        assert!(dispatch(&mut mgr, "# a comment", true, true).unwrap().is_empty());
        match dispatch(&mut mgr, "   # another", true, false) {
            Err(Error::VoidCommand) => (),
            other => panic!("expected VoidCommand, got {:?}", other),
        }
    }

    #[test]
    fn first_mention_creates_the_service() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web cmd=sleep 30");
        assert!(mgr.has_service("web"));
        assert_eq!(mgr.service("web").unwrap().state(), State::Stopped);
    }

    #[test]
    fn quoted_values_are_unquoted() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web desc='a quiet daemon'");
        assert_eq!(
            mgr.service("web").unwrap().desc,
            Some(String::from("a quiet daemon"))
        );
    }

    #[test]
    fn vector_cmd_parses_as_argv() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, r#"service web cmd=["/bin/sleep", "30"]"#);
        match mgr.service("web").unwrap().cmd {
            Some(Cmd::Argv(ref argv)) => {
                assert_eq!(argv, &vec!["/bin/sleep".to_string(), "30".to_string()])
            }
            ref other => panic!("expected argv, got {:?}", other),
        }
    }

    #[test]
    fn empty_rhs_unsets() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web cmd=sleep 30");
        ok(&mut mgr, "service web cmd=");
        assert!(mgr.service("web").unwrap().cmd.is_none());
    }

    #[test]
    fn env_entries_accumulate_and_clear() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web env=A=1");
        ok(&mut mgr, "service web env=B=two words");
        {
            let svc = mgr.service("web").unwrap();
            assert_eq!(svc.env.get("A"), Some(&String::from("1")));
            assert_eq!(svc.env.get("B"), Some(&String::from("two words")));
        }
        ok(&mut mgr, "service web env=");
        assert!(mgr.service("web").unwrap().env.is_empty());
    }

    #[test]
    fn unknown_attribute_is_invalid_property() {
        let (mut mgr, _dir) = test_manager();
        match dispatch(&mut mgr, "service web color=red", true, false) {
            Err(Error::InvalidProperty(ref attr)) => assert_eq!(attr, "color"),
            other => panic!("expected InvalidProperty, got {:?}", other),
        }
    }

    #[test]
    fn bad_service_name_is_rejected() {
        let (mut mgr, _dir) = test_manager();
        assert!(dispatch(&mut mgr, "service - cmd=x", true, false).is_err());
        assert!(dispatch(&mut mgr, "service a$b cmd=x", true, false).is_err());
    }

    #[test]
    fn unprivileged_configuration_is_refused() {
        let (mut mgr, _dir) = test_manager();
        match dispatch(&mut mgr, "service web cmd=sleep 1", false, false) {
            Err(Error::Privilege) => (),
            other => panic!("expected Privilege, got {:?}", other),
        }
        // command verbs stay available
        dispatch(&mut mgr, "command list", false, false).unwrap();
    }

    #[test]
    fn selectors_resolve() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web cmd=sleep 30");
        ok(&mut mgr, "service db cmd=sleep 30");
        ok(&mut mgr, "service web tags=frontend,edge");
        assert_eq!(
            services_from_args(&mgr, &["service", "web"]).unwrap(),
            vec!["web".to_string()]
        );
        assert_eq!(
            services_from_args(&mgr, &["tag", "edge"]).unwrap(),
            vec!["web".to_string()]
        );
        let mut all = services_from_args(&mgr, &["all"]).unwrap();
        all.sort();
        assert_eq!(all, vec!["db".to_string(), "web".to_string()]);
    }

    #[test]
    fn selector_mistakes_are_explicit() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web cmd=sleep 30");
        match services_from_args(&mgr, &["service"]) {
            Err(Error::SelectorArity) => (),
            other => panic!("expected SelectorArity, got {:?}", other),
        }
        match services_from_args(&mgr, &["group", "web"]) {
            Err(Error::UnknownSelector(_)) => (),
            other => panic!("expected UnknownSelector, got {:?}", other),
        }
        match services_from_args(&mgr, &["service", "nope"]) {
            Err(Error::UnknownService(_)) => (),
            other => panic!("expected UnknownService, got {:?}", other),
        }
    }

    #[test]
    fn unknown_verbs_are_rejected() {
        let (mut mgr, _dir) = test_manager();
        assert!(dispatch(&mut mgr, "frobnicate all", true, false).is_err());
        assert!(dispatch(&mut mgr, "command frobnicate all", true, false).is_err());
    }

    #[test]
    fn version_reports_the_crate_version() {
        let (mut mgr, _dir) = test_manager();
        let lines = ok(&mut mgr, "command version");
        assert_eq!(lines, vec![::VERSION.to_string()]);
    }

    #[test]
    fn proxy_service_attaches() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "proxy pool cmd=cfk-proxy");
        ok(&mut mgr, "proxy pool service web cmd=sleep 30");
        assert_eq!(
            mgr.service("web").unwrap().proxy,
            Some(String::from("pool"))
        );
        assert_eq!(
            mgr.proxy("pool").unwrap().service_names(),
            vec!["web".to_string()]
        );
    }

    #[test]
    fn socket_attributes_apply() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "socket listen host=127.0.0.1");
        ok(&mut mgr, "socket listen service=0");
        ok(&mut mgr, "socket listen nonblocking=yes");
        let sock = mgr.socket("listen").unwrap();
        assert_eq!(sock.host, Some(String::from("127.0.0.1")));
        assert!(sock.nonblocking);
    }

    #[test]
    fn status_after_config_lists_the_service() {
        let (mut mgr, _dir) = test_manager();
        ok(&mut mgr, "service web cmd=sleep 30");
        let lines = ok(&mut mgr, "command status service web");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("web\tstopped\t"));
    }
}
