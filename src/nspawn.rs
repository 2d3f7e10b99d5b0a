//! Container launch: drives `systemd-nspawn` through the bootstrap
//! handshake and wires the container's network namespace.
//!
//! From the container's perspective, by the time the user command runs
//! the rootfs is mounted, the control pipe has been drained, the netns
//! is bound under `/var/run/netns/<name>`, `host0` carries the assigned
//! address, and the default route points at the bridge gateway. From the
//! host's perspective, once [`launch`] returns no manager-owned mounts
//! for the container remain.

use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command};

use tracing::{debug, warn};

use crate::bootstrap;
use crate::cleanup::CleanupStack;
use crate::error::{Error, Result};
use crate::machine::{self, CONTAINER_SUFFIX};
use crate::mount;
use crate::network;
use crate::signals;
use crate::storage::Storage;

/// External container launcher binary.
const LAUNCHER: &str = "systemd-nspawn";

/// Everything [`launch`] needs to start one container.
pub struct LaunchConfig<'a> {
    /// Container name (without the machine suffix).
    pub name: &'a str,
    /// Bridge device carrying the container's traffic.
    pub bridge: &'a str,
    /// Address/prefix to assign on `host0`.
    pub container_address: &'a str,
    /// Bridge address/prefix; its bare IP becomes the default gateway.
    pub bridge_address: Option<&'a str>,
    /// Suppress launcher status messages.
    pub quiet: bool,
    /// User command; empty means an interactive shell.
    pub command: &'a [String],
}

/// Builds the launcher argument vector.
pub fn launcher_args(name: &str, root: &str, bridge: &str, quiet: bool, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "-M".to_string(),
        format!("{}{}", name, CONTAINER_SUFFIX),
        "-D".to_string(),
        root.to_string(),
        "-n".to_string(),
        "--network-bridge".to_string(),
        bridge.to_string(),
    ];

    if quiet {
        args.push("-q".to_string());
    }

    args.push(bootstrap::EXEC_HELPER.to_string());
    args.push(bootstrap::CONTROL_PIPE.to_string());
    args.extend(command.iter().cloned());

    args
}

/// Kills the launcher on early exit paths; disarmed once waited on.
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let mut child = self.0.take().expect("child waited on twice");
        child.wait()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Starts the container and blocks until its user command exits.
///
/// Every acquired resource is released in reverse order on all exit
/// paths. A nonzero user-command status is returned as
/// [`Error::LauncherExitNonzero`] so the caller can propagate it.
pub fn launch(storage: &dyn Storage, config: &LaunchConfig<'_>) -> Result<()> {
    let root = storage.container_root(config.name);
    let root_str = root.to_string_lossy().into_owned();

    let mut cleanups = CleanupStack::new();

    bootstrap::install_bootstrap_executable(&root)?;

    let pipe = bootstrap::create_control_pipe(&root)?;
    cleanups.push("control pipe", {
        let pipe = pipe.clone();
        move || remove_pipe(&pipe)
    });

    // Stale state from a previous run under the same name; the bind or
    // interface may not exist at all.
    let _ = mount::umount_netns(config.name);
    let _ = network::cleanup_veth(config.name);

    cleanups.push("veth interface", {
        let name = config.name.to_string();
        move || network::cleanup_veth(&name)
    });

    network::add_masquerade(config.bridge)?;
    cleanups.push("masquerade rule", {
        let bridge = config.bridge.to_string();
        move || network::remove_masquerade(&bridge)
    });

    let args = launcher_args(config.name, &root_str, config.bridge, config.quiet, config.command);
    debug!(launcher = LAUNCHER, ?args, "starting container");

    // The launcher gets a scrubbed environment and the manager's own
    // stdio so the user command talks straight to the terminal.
    let child = Command::new(LAUNCHER)
        .args(&args)
        .env_clear()
        .spawn()
        .map_err(|e| Error::Launcher(format!("can't start {}: {}", LAUNCHER, e)))?;

    let mut guard = ChildGuard(Some(child));

    // Blocks until the container-side bootstrap opens and closes the
    // write end; EOF means the container is live and waiting.
    fs::read(&pipe).map_err(|e| {
        interrupt_or(Error::Launcher(format!(
            "can't read control pipe '{}': {}",
            pipe.display(),
            e
        )))
    })?;

    let pid = machine::leader_pid(config.name)?;

    mount::mount_netns(pid, config.name)?;
    cleanups.push("netns bind", {
        let name = config.name.to_string();
        move || mount::umount_netns(&name)
    });

    network::setup_container_network(
        config.name,
        config.container_address,
        config.bridge_address,
    )?;

    // Wakes the container's read; it execs the user command from here.
    fs::write(&pipe, b"").map_err(|e| {
        Error::Launcher(format!(
            "can't write control pipe '{}': {}",
            pipe.display(),
            e
        ))
    })?;

    let status = guard
        .wait()
        .map_err(|e| Error::Launcher(format!("can't wait for {}: {}", LAUNCHER, e)))?;

    if signals::interrupted() {
        return Err(Error::Launcher("interrupted by signal".to_string()));
    }

    if !status.success() {
        return Err(Error::LauncherExitNonzero {
            code: exit_code(status),
        });
    }

    Ok(())
}

fn remove_pipe(pipe: &PathBuf) -> Result<()> {
    match fs::remove_file(pipe) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Cleanup {
            resource: format!("control pipe '{}'", pipe.display()),
            reason: e.to_string(),
        }),
    }
}

fn interrupt_or(err: Error) -> Error {
    if signals::interrupted() {
        warn!("interrupted, unwinding");
        Error::Launcher("interrupted by signal".to_string())
    } else {
        err
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_args_layout() {
        let command = vec!["/bin/echo".to_string(), "hi".to_string()];
        let args = launcher_args(
            "demo",
            "/var/lib/hastur/containers/demo/.nspawn.root",
            "br0",
            false,
            &command,
        );

        assert_eq!(
            args,
            vec![
                "-M",
                "demo.hastur",
                "-D",
                "/var/lib/hastur/containers/demo/.nspawn.root",
                "-n",
                "--network-bridge",
                "br0",
                "/.hastur.exec",
                "/.hastur.exec.control",
                "/bin/echo",
                "hi",
            ]
        );
    }

    #[test]
    fn launcher_args_quiet_inserts_flag_before_helper() {
        let args = launcher_args("demo", "/root", "br0", true, &[]);

        let q = args.iter().position(|a| a == "-q").unwrap();
        let helper = args.iter().position(|a| a == "/.hastur.exec").unwrap();
        assert!(q < helper);
        assert_eq!(args.last().unwrap(), "/.hastur.exec.control");
    }
}
