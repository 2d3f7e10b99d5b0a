//! Tests for the in-container bootstrap path.
//!
//! The exec itself needs a container to be meaningful; these tests cover
//! invocation detection, command selection, and the host-side artifacts
//! (helper path, control FIFO).

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tempfile::TempDir;

use hastur::bootstrap::{
    bootstrap_command, control_pipe_path, create_control_pipe, helper_path,
    is_bootstrap_invocation, CONTROL_PIPE, EXEC_HELPER,
};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Invocation Detection
// =============================================================================

#[test]
fn sentinel_argv0_with_pipe_is_bootstrap() {
    assert!(is_bootstrap_invocation(&argv(&[EXEC_HELPER, CONTROL_PIPE])));
    assert!(is_bootstrap_invocation(&argv(&[
        EXEC_HELPER,
        CONTROL_PIPE,
        "/bin/echo",
        "hi"
    ])));
}

#[test]
fn cli_invocations_are_not_bootstrap() {
    assert!(!is_bootstrap_invocation(&argv(&["hastur", "-S", "--", "/bin/true"])));
    assert!(!is_bootstrap_invocation(&argv(&["/usr/bin/hastur", "-Q"])));
    // The sentinel alone, without a pipe argument, is not a bootstrap.
    assert!(!is_bootstrap_invocation(&argv(&[EXEC_HELPER])));
}

// =============================================================================
// Command Selection
// =============================================================================

#[test]
fn missing_command_becomes_interactive_shell() {
    assert_eq!(
        bootstrap_command(&argv(&[EXEC_HELPER, CONTROL_PIPE])),
        vec!["/bin/bash"]
    );
}

#[test]
fn one_argument_with_spaces_is_a_shell_command() {
    assert_eq!(
        bootstrap_command(&argv(&[EXEC_HELPER, CONTROL_PIPE, "echo hello world"])),
        vec!["/bin/bash", "-c", "echo hello world"]
    );
}

#[test]
fn one_argument_without_spaces_is_a_program() {
    assert_eq!(
        bootstrap_command(&argv(&[EXEC_HELPER, CONTROL_PIPE, "/bin/true"])),
        vec!["/bin/true"]
    );
}

#[test]
fn multiple_arguments_pass_through_verbatim() {
    assert_eq!(
        bootstrap_command(&argv(&[
            EXEC_HELPER,
            CONTROL_PIPE,
            "/bin/echo",
            "two words"
        ])),
        vec!["/bin/echo", "two words"]
    );
}

// =============================================================================
// Host-Side Artifacts
// =============================================================================

#[test]
fn helper_and_pipe_live_at_the_container_root() {
    let root = Path::new("/var/lib/hastur/containers/demo/.nspawn.root");

    assert_eq!(helper_path(root), root.join(".hastur.exec"));
    assert_eq!(control_pipe_path(root), root.join(".hastur.exec.control"));
}

#[test]
fn control_pipe_is_a_fifo_with_expected_name() {
    let temp = TempDir::new().unwrap();

    let pipe = create_control_pipe(temp.path()).unwrap();

    assert_eq!(pipe, temp.path().join(".hastur.exec.control"));
    assert!(fs::metadata(&pipe).unwrap().file_type().is_fifo());
}

#[test]
fn control_pipe_mode_is_0644() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let pipe = create_control_pipe(temp.path()).unwrap();

    let mode = fs::metadata(&pipe).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644 & !process_umask());
}

/// The process umask, which mkfifo subtracts from the requested mode.
fn process_umask() -> u32 {
    // SAFETY: umask is queried by setting and immediately restoring it.
    unsafe {
        let current = libc::umask(0);
        libc::umask(current);
        current as u32
    }
}
