//! Root-directory layout and filesystem utilities.
//!
//! The root directory owns two subtrees:
//!
//! ```text
//! <root>/images/<fingerprint>/      package-installed base images
//! <root>/containers/<name>/         one directory per container
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory of the base image identified by `fingerprint`.
pub fn image_dir(root_dir: &str, fingerprint: &str) -> PathBuf {
    Path::new(root_dir).join("images").join(fingerprint)
}

/// Directory owning all state of the named container.
pub fn container_dir(root_dir: &str, name: &str) -> PathBuf {
    Path::new(root_dir).join("containers").join(name)
}

/// Root-relative counterparts for backends that address datasets rather
/// than directories.
pub fn images_root(root_dir: &str) -> PathBuf {
    Path::new(root_dir).join("images")
}

/// See [`images_root`].
pub fn containers_root(root_dir: &str) -> PathBuf {
    Path::new(root_dir).join("containers")
}

/// Lists the names of all container directories under `<root>/containers`.
///
/// A missing containers directory yields an empty list.
pub fn list_containers(root_dir: &str) -> Result<Vec<String>> {
    list_subdirs(&containers_root(root_dir))
}

/// Lists the fingerprints of all image directories under `<root>/images`.
pub fn list_images(root_dir: &str) -> Result<Vec<String>> {
    list_subdirs(&images_root(root_dir))
}

fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::Storage {
        operation: format!("list '{}'", dir.display()),
        reason: e.to_string(),
    })? {
        let entry = entry.map_err(|e| Error::Storage {
            operation: format!("list '{}'", dir.display()),
            reason: e.to_string(),
        })?;

        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    names.sort();
    Ok(names)
}

/// Recursively copies the entries of `src` into `dest`, preserving file
/// modes. Used to overlay a caller-supplied directory onto an image root.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    let src_meta = fs::metadata(src)?;
    if !src_meta.is_dir() {
        return Err(Error::Config(format!(
            "'{}' is not a directory",
            src.display()
        )));
    }

    fs::create_dir_all(dest)?;
    #[cfg(unix)]
    {
        fs::set_permissions(dest, src_meta.permissions())?;
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_entry = entry.path();
        let dest_entry = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir(&src_entry, &dest_entry)?;
        } else {
            copy_file(&src_entry, &dest_entry)?;
        }
    }

    Ok(())
}

/// Copies one file, preserving its mode.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest)?;

    let mode = fs::metadata(src)?.permissions();
    fs::set_permissions(dest, mode)?;

    Ok(())
}
