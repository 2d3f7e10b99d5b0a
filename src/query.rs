//! Container queries: enumeration joined with the launcher's machine
//! table, plus the single-value lookups used by scripts.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::image;
use crate::machine;
use crate::network;
use crate::storage::Storage;

/// One container as reported by `-Q`.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    /// Container name.
    pub name: String,
    /// `active` when the launcher currently runs it, else `inactive`.
    pub status: String,
    /// Rootfs path handed to the launcher.
    pub root: String,
    /// Current `host0` address, empty when inactive or unassigned.
    pub address: String,
}

/// Collects the state of every container under the root directory,
/// optionally restricted to the given names.
pub fn collect_containers(
    root_dir: &str,
    storage: &dyn Storage,
    filter: &[String],
) -> Result<Vec<ContainerInfo>> {
    let all = fsutil::list_containers(root_dir)?;
    let active = machine::list_active_containers()?;

    let mut containers = Vec::new();
    for name in all {
        if !filter.is_empty() && !filter.contains(&name) {
            continue;
        }

        let mut info = ContainerInfo {
            name: name.clone(),
            status: "inactive".to_string(),
            root: storage.container_root(&name).to_string_lossy().into_owned(),
            address: String::new(),
        };

        if active.contains(&name) {
            info.status = "active".to_string();
            match network::container_ipv4(&name) {
                Ok(address) => info.address = address,
                Err(err) => {
                    tracing::warn!(
                        container = %name,
                        error = %err,
                        "can't obtain container address"
                    );
                }
            }
        }

        containers.push(info);
    }

    Ok(containers)
}

/// Renders the container table, columns padded to their widest value.
pub fn render_table(containers: &[ContainerInfo]) -> String {
    let rows: Vec<[&str; 4]> = containers
        .iter()
        .map(|c| {
            [
                c.name.as_str(),
                c.status.as_str(),
                c.address.as_str(),
                c.root.as_str(),
            ]
        })
        .collect();

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < 3 {
                out.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
            } else {
                out.push_str(cell);
            }
        }
        out.push('\n');
    }

    out
}

/// Renders the container list as a JSON array.
pub fn render_json(containers: &[ContainerInfo]) -> Result<String> {
    serde_json::to_string_pretty(containers)
        .map_err(|e| Error::Config(format!("can't serialise container list: {}", e)))
}

/// Rootfs path of a container, for copying files in from outside.
pub fn container_rootfs(storage: &dyn Storage, name: &str) -> String {
    storage.container_root(name).to_string_lossy().into_owned()
}

/// Current address of an active container.
///
/// Errors when the container exists but is not running; an unknown name
/// yields an empty string, matching the enumeration behavior.
pub fn container_ip(root_dir: &str, name: &str) -> Result<String> {
    let containers = fsutil::list_containers(root_dir)?;
    let active = machine::list_active_containers()?;

    for candidate in containers {
        if candidate != name {
            continue;
        }

        if active.contains(name) {
            return network::container_ipv4(name);
        }

        return Err(Error::Config(format!("container '{}' is not active", name)));
    }

    Ok(String::new())
}

/// Lists every base image with its explicitly installed packages.
pub fn render_images(root_dir: &str) -> Result<String> {
    let mut out = String::new();

    for fingerprint in fsutil::list_images(root_dir)? {
        let image_dir = fsutil::image_dir(root_dir, &fingerprint);
        out.push_str(&image_dir.to_string_lossy());
        out.push('\n');

        match image::list_explicitly_installed(&image_dir) {
            Ok(packages) => {
                for package in packages {
                    out.push('\t');
                    out.push_str(&package);
                    out.push('\n');
                }
            }
            Err(err) => {
                tracing::warn!(
                    image = %fingerprint,
                    error = %err,
                    "can't list explicitly installed packages"
                );
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, status: &str, address: &str, root: &str) -> ContainerInfo {
        ContainerInfo {
            name: name.to_string(),
            status: status.to_string(),
            root: root.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn table_columns_are_aligned() {
        let containers = vec![
            info("demo", "active", "10.0.0.42/8", "/r/containers/demo/.nspawn.root"),
            info("irgep-atlopun-zod", "inactive", "", "/r/containers/irgep-atlopun-zod/.nspawn.root"),
        ];

        let table = render_table(&containers);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("demo              "));
        assert!(lines[1].starts_with("irgep-atlopun-zod  "));
    }

    #[test]
    fn json_has_all_fields() {
        let containers = vec![info(
            "demo",
            "active",
            "10.0.0.42/8",
            "/r/containers/demo/.nspawn.root",
        )];

        let json = render_json(&containers).unwrap();
        assert!(json.trim_start().starts_with('['));
        assert!(json.contains("\"name\": \"demo\""));
        assert!(json.contains("\"status\": \"active\""));
        assert!(json.contains("\"root\": \"/r/containers/demo/.nspawn.root\""));
        assert!(json.contains("\"address\": \"10.0.0.42/8\""));
    }

    #[test]
    fn empty_list_renders_empty_array() {
        assert_eq!(render_json(&[]).unwrap(), "[]");
        assert_eq!(render_table(&[]), "");
    }
}
