//! Overlay-over-directory storage backend.
//!
//! Per-container layout under `containers/<name>/`:
//!
//! ```text
//! root/               overlay upperdir, the persistent diff
//! .overlay.workdir/   overlay internal scratch space
//! .nspawn.root/       merged view, the launcher's chroot
//! ```
//!
//! The base image is the overlay lowerdir and stays read-only to every
//! container derived from it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::mount;
use crate::storage::Storage;

/// Default tmpfs size for the unsupported-filesystem fallback.
const DEFAULT_TMPFS_SIZE: &str = "1G";

/// Filesystems that can host overlay upper layers directly.
const SUPPORTED_FS: &[&str] = &["tmpfs", "ext", "ext2", "ext3", "ext4", "btrfs"];

/// Overlay storage rooted at a host directory.
#[derive(Debug)]
pub struct OverlayFsStorage {
    root_dir: String,
    tmpfs_size: String,
}

impl OverlayFsStorage {
    /// Parses an `overlayfs` or `overlayfs:<size>` spec.
    pub fn from_spec(root_dir: &str, spec: &str) -> Result<Self> {
        let tmpfs_size = match spec.split_once(':') {
            Some((_, size)) if !size.is_empty() => size.to_string(),
            Some((_, _)) => {
                return Err(Error::Config(
                    "overlayfs spec has an empty size (expected overlayfs:<size>)".into(),
                ))
            }
            None => DEFAULT_TMPFS_SIZE.to_string(),
        };

        Ok(Self {
            root_dir: root_dir.to_string(),
            tmpfs_size,
        })
    }

    /// Mounts tmpfs on the root directory when the underlying filesystem
    /// cannot host overlay.
    fn fix_unsupported_fs(&self) -> Result<()> {
        let root = Path::new(&self.root_dir);

        if mount::is_mounted("tmpfs", root)? {
            return Ok(());
        }

        mount::mount_tmpfs(root, &self.tmpfs_size)
    }

    fn merged_root(&self, name: &str) -> PathBuf {
        fsutil::container_dir(&self.root_dir, name).join(".nspawn.root")
    }
}

impl Storage for OverlayFsStorage {
    fn init(&self) -> Result<()> {
        let root = Path::new(&self.root_dir);

        // The root directory is created on first use; the probe below
        // needs it to exist.
        fs::create_dir_all(root).map_err(|e| Error::Storage {
            operation: format!("create root directory '{}'", self.root_dir),
            reason: e.to_string(),
        })?;

        let fs_type = mount::fs_type(root)?;

        if SUPPORTED_FS.contains(&fs_type.as_str()) {
            return Ok(());
        }

        warn!(
            fs_type = %fs_type,
            root = %self.root_dir,
            "filesystem cannot host overlay; mounting tmpfs, containers will not persist across reboots"
        );

        self.fix_unsupported_fs()
    }

    fn init_image(&self, fingerprint: &str) -> Result<()> {
        let dir = fsutil::image_dir(&self.root_dir, fingerprint);

        fs::create_dir_all(&dir).map_err(|e| Error::Storage {
            operation: format!("create image directory '{}'", dir.display()),
            reason: e.to_string(),
        })
    }

    fn deinit_image(&self, fingerprint: &str) -> Result<()> {
        let dir = fsutil::image_dir(&self.root_dir, fingerprint);

        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                operation: format!("remove image directory '{}'", dir.display()),
                reason: e.to_string(),
            }),
        }
    }

    fn init_container(&self, fingerprint: &str, name: &str) -> Result<()> {
        let container_dir = fsutil::container_dir(&self.root_dir, name);

        for subdir in ["root", ".nspawn.root", ".overlay.workdir"] {
            let dir = container_dir.join(subdir);
            fs::create_dir_all(&dir).map_err(|e| Error::Storage {
                operation: format!("create '{}'", dir.display()),
                reason: e.to_string(),
            })?;
        }

        mount::mount_overlay(
            &fsutil::image_dir(&self.root_dir, fingerprint),
            &container_dir.join("root"),
            &container_dir.join(".overlay.workdir"),
            &self.merged_root(name),
        )
        .map_err(|e| Error::Storage {
            operation: format!("mount overlay [{}] for '{}'", fingerprint, name),
            reason: e.to_string(),
        })
    }

    fn deinit_container(&self, name: &str) -> Result<()> {
        mount::umount(&self.merged_root(name))
    }

    fn container_root(&self, name: &str) -> PathBuf {
        self.merged_root(name)
    }

    fn destroy_container(&self, name: &str) -> Result<()> {
        // The merged view may already be unmounted; removal is what matters.
        let _ = self.deinit_container(name);

        let dir = fsutil::container_dir(&self.root_dir, name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                operation: format!("remove container directory '{}'", dir.display()),
                reason: e.to_string(),
            }),
        }
    }

    fn destroy(&self) -> Result<()> {
        let root = Path::new(&self.root_dir);
        if !root.exists() {
            return Ok(());
        }

        // Unmount every overlay and tmpfs below the root before deleting
        // the tree; a busy mount would otherwise make removal fail.
        let _ = mount::umount_recursive(root);

        match fs::remove_dir_all(root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                operation: format!("remove root directory '{}'", root.display()),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn spec_without_size_uses_default() {
        let storage = OverlayFsStorage::from_spec("/var/lib/hastur", "overlayfs").unwrap();
        assert_eq!(storage.tmpfs_size, "1G");
    }

    #[test]
    fn spec_with_size() {
        let storage = OverlayFsStorage::from_spec("/var/lib/hastur", "overlayfs:512M").unwrap();
        assert_eq!(storage.tmpfs_size, "512M");
    }

    #[test]
    fn spec_with_empty_size_is_rejected() {
        let err = OverlayFsStorage::from_spec("/var/lib/hastur", "overlayfs:").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn container_root_is_merged_view() {
        let storage = OverlayFsStorage::from_spec("/var/lib/hastur", "overlayfs").unwrap();
        assert_eq!(
            storage.container_root("demo"),
            PathBuf::from("/var/lib/hastur/containers/demo/.nspawn.root")
        );
    }

    #[test]
    fn image_slots_are_directories() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().into_owned();
        let storage = OverlayFsStorage::from_spec(&root, "overlayfs").unwrap();

        storage.init_image("cafe").unwrap();
        assert!(fsutil::image_dir(&root, "cafe").is_dir());

        // Idempotent.
        storage.init_image("cafe").unwrap();

        storage.deinit_image("cafe").unwrap();
        assert!(!fsutil::image_dir(&root, "cafe").exists());

        // Removing a missing slot is success.
        storage.deinit_image("cafe").unwrap();
    }

    #[test]
    fn destroy_container_removes_state_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().into_owned();
        let storage = OverlayFsStorage::from_spec(&root, "overlayfs").unwrap();

        let dir = fsutil::container_dir(&root, "demo");
        fs::create_dir_all(dir.join("root")).unwrap();

        storage.destroy_container("demo").unwrap();
        assert!(!dir.exists());

        // Idempotent.
        storage.destroy_container("demo").unwrap();
    }
}
