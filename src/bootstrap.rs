//! In-container bootstrap: the one-binary two-process pattern.
//!
//! The manager binary is copied into every container root as
//! `/.hastur.exec` and becomes the container's entrypoint. When the
//! process finds itself invoked under that name it runs the bootstrap
//! path instead of the CLI: it blocks on a named pipe until the host
//! finishes network setup, then replaces itself with the user command.
//!
//! The rendezvous relies on FIFO open semantics and its ordering is part
//! of the contract:
//!
//! 1. container opens the pipe for write (blocks until a reader appears),
//! 2. host reads the pipe to completion (observes the container's close),
//! 3. host configures the namespace, then writes an empty payload,
//! 4. container's read returns and it execs the user command.

use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Path of the bootstrap helper inside the container root.
pub const EXEC_HELPER: &str = "/.hastur.exec";

/// Name of the control FIFO, relative to the container root.
pub const CONTROL_PIPE: &str = "/.hastur.exec.control";

/// Command run when the caller supplied none.
const DEFAULT_SHELL: &str = "/bin/bash";

/// Returns true when this invocation is the in-container bootstrap.
///
/// Must be checked before any CLI parsing: argv[0] is the sentinel path
/// and argv[1] the control pipe.
pub fn is_bootstrap_invocation(argv: &[String]) -> bool {
    argv.len() >= 2 && argv[0] == EXEC_HELPER
}

/// Selects the command the container should exec.
///
/// No arguments means an interactive shell; a single argument containing
/// a space is handed to the shell as a command string.
pub fn bootstrap_command(argv: &[String]) -> Vec<String> {
    if argv.len() == 2 {
        return vec![DEFAULT_SHELL.to_string()];
    }

    if argv.len() == 3 && argv[2].contains(' ') {
        return vec![
            DEFAULT_SHELL.to_string(),
            "-c".to_string(),
            argv[2].clone(),
        ];
    }

    argv[2..].to_vec()
}

/// Runs the container side of the handshake, then execs the user command.
///
/// Returns only on failure: on success the process image is replaced.
pub fn run_bootstrap(argv: &[String]) -> Result<()> {
    let pipe = &argv[1];
    let command = bootstrap_command(argv);

    // Write-open blocks until the host opens the read side; the host's
    // read observes our close. The subsequent read blocks until the host
    // writes, which it does only after the network is configured.
    fs::write(pipe, b"")
        .map_err(|e| Error::Launcher(format!("can't open control pipe '{}': {}", pipe, e)))?;
    fs::read(pipe)
        .map_err(|e| Error::Launcher(format!("can't read control pipe '{}': {}", pipe, e)))?;

    let _ = fs::remove_file(pipe);

    exec_command(&command)
}

/// Replaces the current process with `command`, keeping the environment.
fn exec_command(command: &[String]) -> Result<()> {
    let program = CString::new(command[0].as_str())
        .map_err(|_| Error::Launcher(format!("command '{}' contains NUL", command[0])))?;

    let args: Vec<CString> = command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Launcher("command argument contains NUL".to_string()))?;

    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());

    // SAFETY: program and argv are NUL-terminated C strings that outlive
    // the call, and argv is terminated by a null pointer. execv only
    // returns on failure.
    unsafe {
        libc::execv(program.as_ptr(), argv.as_ptr());
    }

    Err(Error::Launcher(format!(
        "can't execute command {:?}: {}",
        command,
        std::io::Error::last_os_error()
    )))
}

// =============================================================================
// Host Side
// =============================================================================

/// Copies the running manager binary into the container root as the
/// bootstrap helper.
pub fn install_bootstrap_executable(root: &Path) -> Result<()> {
    let own_binary = fs::read_link("/proc/self/exe")
        .map_err(|e| Error::Launcher(format!("can't read link to /proc/self/exe: {}", e)))?;

    let target = helper_path(root);
    fs::copy(&own_binary, &target).map_err(|e| {
        Error::Launcher(format!(
            "can't install bootstrap executable at '{}': {}",
            target.display(),
            e
        ))
    })?;

    debug!(target = %target.display(), "bootstrap executable installed");
    Ok(())
}

/// Creates the control FIFO inside the container root, mode 0644.
pub fn create_control_pipe(root: &Path) -> Result<PathBuf> {
    let path = control_pipe_path(root);

    let path_c = CString::new(path.to_string_lossy().as_bytes())
        .map_err(|_| Error::Launcher("control pipe path contains NUL".to_string()))?;

    // SAFETY: path_c is a valid NUL-terminated path; mkfifo does not
    // retain the pointer.
    let ret = unsafe { libc::mkfifo(path_c.as_ptr(), 0o644) };
    if ret != 0 {
        return Err(Error::Launcher(format!(
            "can't create control pipe '{}': {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(path)
}

/// Host-side path of the bootstrap helper for a container root.
pub fn helper_path(root: &Path) -> PathBuf {
    root.join(EXEC_HELPER.trim_start_matches('/'))
}

/// Host-side path of the control FIFO for a container root.
pub fn control_pipe_path(root: &Path) -> PathBuf {
    root.join(CONTROL_PIPE.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bootstrap_detection_needs_sentinel_argv0() {
        assert!(is_bootstrap_invocation(&argv(&[
            "/.hastur.exec",
            "/.hastur.exec.control"
        ])));
        assert!(!is_bootstrap_invocation(&argv(&["hastur", "-S"])));
        assert!(!is_bootstrap_invocation(&argv(&["/.hastur.exec"])));
    }

    #[test]
    fn no_command_defaults_to_shell() {
        let command = bootstrap_command(&argv(&["/.hastur.exec", "pipe"]));
        assert_eq!(command, vec!["/bin/bash"]);
    }

    #[test]
    fn single_argument_with_space_goes_through_shell() {
        let command = bootstrap_command(&argv(&["/.hastur.exec", "pipe", "echo hi"]));
        assert_eq!(command, vec!["/bin/bash", "-c", "echo hi"]);
    }

    #[test]
    fn explicit_argv_is_passed_through() {
        let command = bootstrap_command(&argv(&["/.hastur.exec", "pipe", "/bin/echo", "hi"]));
        assert_eq!(command, vec!["/bin/echo", "hi"]);

        // A single argument without spaces is a bare program.
        let command = bootstrap_command(&argv(&["/.hastur.exec", "pipe", "/bin/true"]));
        assert_eq!(command, vec!["/bin/true"]);
    }

    #[test]
    fn host_side_paths() {
        let root = Path::new("/var/lib/hastur/containers/demo/.nspawn.root");
        assert_eq!(
            helper_path(root),
            root.join(".hastur.exec")
        );
        assert_eq!(
            control_pipe_path(root),
            root.join(".hastur.exec.control")
        );
    }

    #[test]
    fn control_pipe_is_a_fifo() {
        use std::os::unix::fs::FileTypeExt;

        let temp = tempfile::TempDir::new().unwrap();
        let path = create_control_pipe(temp.path()).unwrap();

        let file_type = fs::metadata(&path).unwrap().file_type();
        assert!(file_type.is_fifo());
    }
}
