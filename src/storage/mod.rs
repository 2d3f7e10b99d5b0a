//! Storage backends for base images and container root filesystems.
//!
//! A backend derives a writable per-container root from a read-only base
//! image. Two implementations exist:
//!
//! - [`OverlayFsStorage`]: overlay mounts over plain directories, with a
//!   tmpfs fallback when the root directory's filesystem cannot host
//!   overlay upper layers,
//! - [`ZfsStorage`]: snapshot/clone datasets on a ZFS pool.
//!
//! Exactly one backend is active per manager invocation, chosen from the
//! storage spec:
//!
//! ```text
//! autodetect | overlayfs | overlayfs:<size> | zfs:<pool>
//! ```

mod overlayfs;
mod zfs;

pub use self::overlayfs::OverlayFsStorage;
pub use self::zfs::ZfsStorage;

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Capability set every storage backend provides.
///
/// `init_container` must be callable repeatedly for different names
/// against the same image; `destroy_container` and `deinit_image` are
/// idempotent.
pub trait Storage: std::fmt::Debug {
    /// Prepares the root directory; may mount tmpfs on it.
    fn init(&self) -> Result<()>;

    /// Creates an empty image slot ready to receive a package install.
    fn init_image(&self, fingerprint: &str) -> Result<()>;

    /// Tears down an image slot (used when a stale image is reused).
    fn deinit_image(&self, fingerprint: &str) -> Result<()>;

    /// Derives a writable container rootfs from image `fingerprint`.
    fn init_container(&self, fingerprint: &str, name: &str) -> Result<()>;

    /// Releases per-container mounts but keeps data on disk.
    fn deinit_container(&self, name: &str) -> Result<()>;

    /// Absolute path of the rootfs the launcher should use.
    ///
    /// Pure function of the root directory and the container name.
    fn container_root(&self, name: &str) -> PathBuf;

    /// Releases mounts and removes all container state.
    fn destroy_container(&self, name: &str) -> Result<()>;

    /// Tears down the entire root directory.
    fn destroy(&self) -> Result<()>;
}

/// Creates and initialises the backend selected by `spec`.
pub fn from_spec(root_dir: &str, spec: &str) -> Result<Box<dyn Storage>> {
    let backend: Box<dyn Storage> = match spec {
        "autodetect" => Box::new(OverlayFsStorage::from_spec(root_dir, "overlayfs")?),
        _ if spec == "overlayfs" || spec.starts_with("overlayfs:") => {
            Box::new(OverlayFsStorage::from_spec(root_dir, spec)?)
        }
        _ if spec.starts_with("zfs:") || spec == "zfs" => {
            Box::new(ZfsStorage::from_spec(root_dir, spec)?)
        }
        other => {
            return Err(Error::Config(format!(
                "unknown storage spec '{}' (expected autodetect, overlayfs[:<size>] or zfs:<pool>)",
                other
            )))
        }
    };

    backend.init()?;

    Ok(backend)
}
