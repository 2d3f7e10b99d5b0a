//! Mount helpers: tmpfs, overlay, bind mounts, and network-namespace
//! bind files under `/var/run/netns/`.
//!
//! All mounts go through the `mount`/`umount` utilities rather than raw
//! syscalls so that behavior matches what an operator would do by hand
//! and `findmnt` sees every mount immediately.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec;

/// Directory holding named network-namespace bind files.
const NETNS_DIR: &str = "/var/run/netns";

fn mount_error(operation: impl Into<String>, err: impl ToString) -> Error {
    Error::Storage {
        operation: operation.into(),
        reason: err.to_string(),
    }
}

fn tool_error(operation: impl Into<String>, err: crate::exec::ExecError) -> Error {
    if err.is_spawn_failure() {
        return Error::HostPrereq {
            operation: operation.into(),
            reason: err.to_string(),
        };
    }

    mount_error(operation, err)
}

/// Mounts a tmpfs of the given size string (e.g. `1G`) at `target`.
pub fn mount_tmpfs(target: &Path, size: &str) -> Result<()> {
    let size_opt = format!("size={}", size);
    let target_str = target.to_string_lossy();

    exec::run_checked(
        "mount",
        &["-t", "tmpfs", "-o", &size_opt, "tmpfs", &target_str],
        &[],
    )
    .map_err(|e| tool_error(format!("mount tmpfs on '{}'", target.display()), e))?;

    Ok(())
}

/// Mounts an overlay at `target` from `lower`, `upper` and `work`.
///
/// All three source paths must canonicalise; the kernel rejects relative
/// paths in overlay options.
pub fn mount_overlay(lower: &Path, upper: &Path, work: &Path, target: &Path) -> Result<()> {
    let lower = absolute(lower)?;
    let upper = absolute(upper)?;
    let work = absolute(work)?;

    let options = format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        upper.display(),
        work.display()
    );
    let target_str = target.to_string_lossy();

    exec::run_checked(
        "mount",
        &["-t", "overlay", "-o", &options, "overlay", &target_str],
        &[],
    )
    .map_err(|e| tool_error(format!("mount overlay on '{}'", target.display()), e))?;

    Ok(())
}

/// Bind-mounts `source` onto `target`.
///
/// The target must already exist: a zero-byte regular file for namespace
/// bindings, a directory for tree bindings.
pub fn mount_bind(source: &Path, target: &Path) -> Result<()> {
    let source_str = source.to_string_lossy();
    let target_str = target.to_string_lossy();

    exec::run_checked("mount", &["--bind", &source_str, &target_str], &[])
        .map_err(|e| tool_error(format!("bind '{}' onto '{}'", source.display(), target.display()), e))?;

    Ok(())
}

/// Unmounts `target`.
pub fn umount(target: &Path) -> Result<()> {
    let target_str = target.to_string_lossy();

    exec::run_checked("umount", &[&target_str], &[])
        .map_err(|e| tool_error(format!("umount '{}'", target.display()), e))?;

    Ok(())
}

/// Recursively unmounts everything below (and including) `target`.
pub fn umount_recursive(target: &Path) -> Result<()> {
    let target_str = target.to_string_lossy();

    exec::run_checked("umount", &["-R", &target_str], &[])
        .map_err(|e| tool_error(format!("umount -R '{}'", target.display()), e))?;

    Ok(())
}

/// Path of the netns bind file for a container name.
pub fn netns_path(name: &str) -> PathBuf {
    Path::new(NETNS_DIR).join(name)
}

/// Binds `/proc/<pid>/ns/net` under `/var/run/netns/<name>` so the `ip -n`
/// family of commands can address the container's namespace.
pub fn mount_netns(pid: i32, name: &str) -> Result<()> {
    let netns_dir = Path::new(NETNS_DIR);
    if !netns_dir.exists() {
        fs::create_dir(netns_dir)
            .map_err(|e| mount_error(format!("create '{}'", netns_dir.display()), e))?;
    }

    let bind_target = netns_path(name);
    fs::write(&bind_target, b"")
        .map_err(|e| mount_error(format!("touch '{}'", bind_target.display()), e))?;

    let source = PathBuf::from(format!("/proc/{}/ns/net", pid));
    mount_bind(&source, &bind_target)
}

/// Unmounts and removes the netns bind file for `name`.
///
/// Idempotent: a missing bind file is success.
pub fn umount_netns(name: &str) -> Result<()> {
    let bind_target = netns_path(name);
    if !bind_target.exists() {
        return Ok(());
    }

    umount(&bind_target)?;

    fs::remove_file(&bind_target)
        .map_err(|e| mount_error(format!("remove '{}'", bind_target.display()), e))?;

    Ok(())
}

/// Returns the filesystem type hosting `path`, as reported by `findmnt`.
pub fn fs_type(path: &Path) -> Result<String> {
    let path_str = path.to_string_lossy();

    let output = exec::run_checked("findmnt", &["-o", "fstype", "-nfT", &path_str], &[])
        .map_err(|e| tool_error(format!("detect filesystem type of '{}'", path.display()), e))?;

    Ok(output.stdout.trim().to_string())
}

/// Returns true if `device` is mounted at `mountpoint`.
pub fn is_mounted(device: &str, mountpoint: &Path) -> Result<bool> {
    let abs = absolute(mountpoint)?;
    let abs_str = abs.to_string_lossy();

    let output = exec::run("findmnt", &[device, &abs_str])
        .map_err(|e| tool_error(format!("findmnt '{}'", mountpoint.display()), e))?;

    Ok(output.success())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| mount_error(format!("resolve '{}'", path.display()), e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netns_path_is_under_var_run() {
        assert_eq!(
            netns_path("demo"),
            PathBuf::from("/var/run/netns/demo")
        );
    }

    #[test]
    fn umount_netns_missing_is_success() {
        umount_netns("hastur-test-no-such-netns").unwrap();
    }

    #[test]
    fn absolute_keeps_absolute_paths() {
        let path = Path::new("/var/lib/hastur");
        assert_eq!(absolute(path).unwrap(), path);
    }

    #[test]
    fn absolute_resolves_relative_paths() {
        let abs = absolute(Path::new("some/dir")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("some/dir"));
    }
}
