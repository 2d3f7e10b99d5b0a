//! Active-container discovery via the host's machine registry.
//!
//! The launcher registers each container as a machine named
//! `<name>.hastur`; the suffix keeps manager-owned machines apart from
//! anything else `machinectl` knows about.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::exec;

/// Suffix appended to the launcher's machine names.
pub const CONTAINER_SUFFIX: &str = ".hastur";

fn machine_error(operation: impl Into<String>, err: exec::ExecError) -> Error {
    if err.is_spawn_failure() {
        return Error::HostPrereq {
            operation: operation.into(),
            reason: err.to_string(),
        };
    }

    Error::Launcher(format!("{}: {}", operation.into(), err))
}

/// Names of all active manager-owned containers, without the suffix.
pub fn list_active_containers() -> Result<HashSet<String>> {
    let output = exec::run_checked("machinectl", &["--no-legend"], &[])
        .map_err(|e| machine_error("list active machines", e))?;

    parse_machine_list(&output.stdout, CONTAINER_SUFFIX)
}

/// Parses `machinectl --no-legend` output, keeping only machines whose
/// first field carries `suffix`.
pub fn parse_machine_list(output: &str, suffix: &str) -> Result<HashSet<String>> {
    let mut containers = HashSet::new();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(Error::Launcher(format!(
                "invalid machine table line: '{}'",
                line
            )));
        }

        if let Some(name) = fields[0].strip_suffix(suffix) {
            containers.insert(name.to_string());
        }
    }

    Ok(containers)
}

/// PID of the container's namespace leader, from `machinectl show`.
pub fn leader_pid(name: &str) -> Result<i32> {
    let machine = format!("{}{}", name, CONTAINER_SUFFIX);

    let output = exec::run_checked("machinectl", &["show", &machine], &[])
        .map_err(|e| machine_error(format!("show machine '{}'", machine), e))?;

    parse_leader_pid(&output.stdout).ok_or_else(|| {
        Error::Launcher(format!("no Leader PID in machinectl show '{}'", machine))
    })
}

/// Extracts the `Leader=<pid>` value from `machinectl show` output.
pub fn parse_leader_pid(output: &str) -> Option<i32> {
    for line in output.lines() {
        if let Some(value) = line.strip_prefix("Leader=") {
            return value.trim().parse().ok();
        }
    }

    None
}
