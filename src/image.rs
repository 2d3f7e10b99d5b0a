//! Base-image cache keyed by package-set fingerprint.
//!
//! A base image is a root filesystem with a package set installed into
//! it. The image directory name is the SHA-224 of the ordered package
//! list, so the same packages always resolve to the same cached image.
//! Two sentinel files prove an image is usable:
//!
//! - `.hastur`: zero bytes, written after the install completes; a
//!   directory without it is a stale half-install and is reinitialised,
//! - `.packages`: the explicit package list, one per line.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha224};
use tracing::info;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::storage::Storage;

/// Marker file proving the image finished installing.
pub const IMAGE_SENTINEL: &str = ".hastur";

/// Newline-separated list of the explicitly installed packages.
pub const PACKAGES_FILE: &str = ".packages";

/// Fingerprint of a package set: SHA-224 hex of the comma-joined list.
///
/// Insertion order matters; callers pass the list as given.
pub fn fingerprint(packages: &[String]) -> String {
    hex::encode(Sha224::digest(packages.join(",").as_bytes()))
}

/// Ensures the image slot for `packages` exists.
///
/// Returns `(hit, fingerprint)`. A directory missing the `.hastur`
/// sentinel is stale: it is deinitialised and treated as missing. On a
/// miss the slot is created empty and the caller runs the installer.
pub fn ensure_base_image(
    root_dir: &str,
    packages: &[String],
    storage: &dyn Storage,
) -> Result<(bool, String)> {
    let fp = fingerprint(packages);
    let image_dir = fsutil::image_dir(root_dir, &fp);

    if image_dir.exists() && !image_dir.join(IMAGE_SENTINEL).exists() {
        info!(fingerprint = %fp, "image has no sentinel, reinitialising");
        storage.deinit_image(&fp)?;
    }

    if !image_dir.exists() {
        storage.init_image(&fp)?;
        return Ok((false, fp));
    }

    Ok((true, fp))
}

/// Runs the package installer into `image_dir` and records the sentinels.
pub fn install_packages(image_dir: &Path, packages: &[String]) -> Result<()> {
    let dir = image_dir.to_string_lossy();

    let mut args: Vec<&str> = vec!["-d", &dir];
    args.extend(packages.iter().map(String::as_str));

    crate::exec::run_combined("pacstrap", &args).map_err(|e| {
        if e.is_spawn_failure() {
            return Error::HostPrereq {
                operation: "run package installer".to_string(),
                reason: e.to_string(),
            };
        }

        Error::PackageInstall {
            dir: image_dir.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    write_sentinels(image_dir, packages)
}

/// Writes the `.hastur` and `.packages` sentinels into `image_dir`.
pub fn write_sentinels(image_dir: &Path, packages: &[String]) -> Result<()> {
    fs::write(image_dir.join(IMAGE_SENTINEL), b"").map_err(|e| Error::PackageInstall {
        dir: image_dir.to_path_buf(),
        reason: format!("can't write sentinel: {}", e),
    })?;

    fs::write(image_dir.join(PACKAGES_FILE), packages.join("\n")).map_err(|e| {
        Error::PackageInstall {
            dir: image_dir.to_path_buf(),
            reason: format!("can't write package list: {}", e),
        }
    })?;

    Ok(())
}

/// Reads back the explicit package list recorded in an image directory.
pub fn list_explicitly_installed(image_dir: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(image_dir.join(PACKAGES_FILE))?;

    Ok(raw
        .trim()
        .lines()
        .map(|line| line.to_string())
        .collect())
}

/// Flattens repeatable comma-joined package groups into one list.
pub fn flatten_package_groups(groups: &[String]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|group| group.split(','))
        .map(|package| package.to_string())
        .collect()
}
