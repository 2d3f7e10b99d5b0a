//! Process runner for external helper programs.
//!
//! The manager shells out to `mount`, `ip`, `brctl`, `iptables`, `zfs`,
//! `machinectl`, the package installer and the container launcher. This
//! module distinguishes three outcomes:
//!
//! - **spawn failure**: the helper binary is missing; callers surface this
//!   as a host-prerequisite error,
//! - **nonzero exit**: the helper ran and failed; stderr is captured so
//!   callers can inspect it,
//! - **benign expected failure**: the helper failed but its stderr matches
//!   a caller-supplied prefix ("already exists" and friends); reported as
//!   success because the observable state matches the request.

use std::process::{Command, Stdio};

use tracing::debug;

/// Captured result of a finished helper program.
#[derive(Debug)]
pub struct RunOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Exit status code; 0 on success.
    pub status: i32,
}

impl RunOutput {
    /// Returns true if the helper exited 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

impl ExecError {
    /// True when the helper binary could not be started at all, which
    /// callers report as a missing host prerequisite rather than an
    /// operation failure.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, ExecError::Spawn { .. })
    }
}

/// Errors from running a helper program.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The binary could not be spawned at all.
    #[error("can't run '{program}': {source}")]
    Spawn {
        /// Program that could not be started.
        program: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },

    /// The helper ran but exited nonzero.
    #[error("`{command}` exited with status {status}: {stderr}")]
    Exit {
        /// Rendered command line.
        command: String,
        /// Exit status code.
        status: i32,
        /// First line of captured stderr.
        stderr: String,
    },
}

fn render(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    // A signal-terminated helper reports 128+signal, matching shell behavior.
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(1)
}

/// Runs a helper, capturing stdout and stderr separately.
///
/// Only a spawn failure is an error; callers inspect `status` themselves.
pub fn run(program: &str, args: &[&str]) -> Result<RunOutput, ExecError> {
    debug!(command = %render(program, args), "exec");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: status_code(output.status),
    })
}

/// Runs a helper and requires exit 0.
///
/// Stderr prefixes listed in `benign` count as success: the tools the
/// manager drives report "already exists" conditions as failures even
/// though the observable state matches the request.
pub fn run_checked(program: &str, args: &[&str], benign: &[&str]) -> Result<RunOutput, ExecError> {
    let output = run(program, args)?;

    if output.success() {
        return Ok(output);
    }

    if benign.iter().any(|prefix| output.stderr.starts_with(prefix)) {
        debug!(
            command = %render(program, args),
            stderr = %first_line(&output.stderr),
            "expected failure, treating as success"
        );
        return Ok(output);
    }

    Err(ExecError::Exit {
        command: render(program, args),
        status: output.status,
        stderr: first_line(&output.stderr).to_string(),
    })
}

/// Runs a helper with stdout and stderr interleaved, requiring exit 0.
///
/// Used for chatty tools (package installer, `zfs`, `iptables`) whose
/// diagnostics may go to either stream.
pub fn run_combined(program: &str, args: &[&str]) -> Result<String, ExecError> {
    debug!(command = %render(program, args), "exec");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(ExecError::Exit {
            command: render(program, args),
            status: status_code(output.status),
            stderr: first_line(&combined).to_string(),
        })
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim_end()
}
