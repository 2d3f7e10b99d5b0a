//! Snapshot/clone storage backend over ZFS.
//!
//! Images are datasets under `<pool>/<root>/images/`; each container is a
//! clone of a per-container snapshot of its image dataset:
//!
//! ```text
//! <pool>/<root>/images/<fp>            base image dataset
//! <pool>/<root>/images/<fp>@<name>     snapshot backing one container
//! <pool>/<root>/containers/<name>      writable clone
//! ```
//!
//! Clones are stable once created, so releasing a container keeps no
//! per-invocation mounts and `deinit_container` is a no-op.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec;
use crate::fsutil;
use crate::storage::Storage;

/// ZFS-backed storage on a named pool.
#[derive(Debug)]
pub struct ZfsStorage {
    pool: String,
    root_dir: String,
}

impl ZfsStorage {
    /// Parses a `zfs:<pool>` spec.
    pub fn from_spec(root_dir: &str, spec: &str) -> Result<Self> {
        let pool = match spec.split_once(':') {
            Some((_, pool)) if !pool.is_empty() => pool.to_string(),
            _ => {
                return Err(Error::Config(
                    "zfs storage needs a pool name (expected zfs:<pool>)".into(),
                ))
            }
        };

        Ok(Self {
            pool,
            root_dir: root_dir.to_string(),
        })
    }

    /// Dataset name for a path under the root directory.
    ///
    /// Dataset names are pool-relative, so the leading `/` of the root
    /// directory is stripped before joining.
    fn dataset(&self, path: &Path) -> String {
        let relative = path.to_string_lossy();
        format!("{}/{}", self.pool, relative.trim_start_matches('/'))
    }

    fn image_dataset(&self, fingerprint: &str) -> String {
        self.dataset(&fsutil::image_dir(&self.root_dir, fingerprint))
    }

    fn container_dataset(&self, name: &str) -> String {
        self.dataset(&fsutil::container_dir(&self.root_dir, name))
    }

    fn zfs(&self, operation: &str, args: &[&str]) -> Result<()> {
        exec::run_combined("zfs", args).map_err(|e| {
            if e.is_spawn_failure() {
                return Error::HostPrereq {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                };
            }

            Error::Storage {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(())
    }
}

impl Storage for ZfsStorage {
    fn init(&self) -> Result<()> {
        let containers = self.dataset(&fsutil::containers_root(&self.root_dir));
        self.zfs(
            &format!("create containers dataset '{}'", containers),
            &["create", "-p", &containers],
        )?;

        let images = self.dataset(&fsutil::images_root(&self.root_dir));
        self.zfs(
            &format!("create images dataset '{}'", images),
            &["create", "-p", &images],
        )
    }

    fn init_image(&self, fingerprint: &str) -> Result<()> {
        let dataset = self.image_dataset(fingerprint);
        self.zfs(
            &format!("create image dataset '{}'", dataset),
            &["create", "-p", &dataset],
        )
    }

    fn deinit_image(&self, fingerprint: &str) -> Result<()> {
        let dataset = self.image_dataset(fingerprint);
        self.zfs(
            &format!("destroy image dataset '{}'", dataset),
            &["destroy", "-r", &dataset],
        )
    }

    fn init_container(&self, fingerprint: &str, name: &str) -> Result<()> {
        let snapshot = format!("{}@{}", self.image_dataset(fingerprint), name);
        self.zfs(
            &format!("snapshot '{}'", snapshot),
            &["snapshot", &snapshot],
        )?;

        let clone = self.container_dataset(name);
        self.zfs(
            &format!("clone '{}' to '{}'", snapshot, clone),
            &["clone", &snapshot, &clone],
        )
    }

    fn deinit_container(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn container_root(&self, name: &str) -> PathBuf {
        fsutil::container_dir(&self.root_dir, name)
    }

    fn destroy_container(&self, name: &str) -> Result<()> {
        let dataset = self.container_dataset(name);
        self.zfs(
            &format!("destroy container dataset '{}'", dataset),
            &["destroy", &dataset],
        )
    }

    fn destroy(&self) -> Result<()> {
        let dataset = self.dataset(Path::new(&self.root_dir));
        self.zfs(
            &format!("destroy root dataset '{}'", dataset),
            &["destroy", "-r", &dataset],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_requires_pool_name() {
        assert!(ZfsStorage::from_spec("/var/lib/hastur", "zfs:").is_err());
        assert!(ZfsStorage::from_spec("/var/lib/hastur", "zfs").is_err());

        let storage = ZfsStorage::from_spec("/var/lib/hastur", "zfs:tank").unwrap();
        assert_eq!(storage.pool, "tank");
    }

    #[test]
    fn dataset_names_are_pool_relative() {
        let storage = ZfsStorage::from_spec("/var/lib/hastur", "zfs:tank").unwrap();

        assert_eq!(
            storage.image_dataset("cafe"),
            "tank/var/lib/hastur/images/cafe"
        );
        assert_eq!(
            storage.container_dataset("demo"),
            "tank/var/lib/hastur/containers/demo"
        );
    }

    #[test]
    fn container_root_is_clone_mountpoint() {
        let storage = ZfsStorage::from_spec("/var/lib/hastur", "zfs:tank").unwrap();
        assert_eq!(
            storage.container_root("demo"),
            PathBuf::from("/var/lib/hastur/containers/demo")
        );
    }
}
