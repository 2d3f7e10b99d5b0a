//! Create-and-start orchestration, container destruction, and root
//! teardown.
//!
//! Create-and-start is one transaction: host networking, base image,
//! container rootfs, bootstrap handshake, launcher wait. Each step's
//! teardown is registered as it succeeds and runs in reverse on every
//! exit path; for persistent containers the container-data teardown is
//! never registered at all.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::fsutil;
use crate::image;
use crate::mount;
use crate::namegen;
use crate::network;
use crate::nspawn::{self, LaunchConfig};
use crate::storage::Storage;

/// Options for one create-and-start invocation.
pub struct StartOptions {
    /// Root directory holding images and containers.
    pub root_dir: String,
    /// Bridge spec, `dev` or `dev:address/prefix`.
    pub bridge: String,
    /// Package groups as given; each group is comma-joined.
    pub packages: Vec<String>,
    /// Container name; generated (and ephemeral) when absent.
    pub name: Option<String>,
    /// Container address/prefix; generated from 10.0.0.0/8 when absent.
    pub address: Option<String>,
    /// Host interface to enrol into the bridge.
    pub host_interface: Option<String>,
    /// Directory whose entries are copied over the image root.
    pub copy_dir: Option<PathBuf>,
    /// Keep the container even if its name was generated.
    pub keep: bool,
    /// Keep the container if the command failed.
    pub keep_failed: bool,
    /// Suppress status messages.
    pub quiet: bool,
    /// Reinstall packages even on a cache hit.
    pub force: bool,
    /// User command; empty means an interactive shell.
    pub command: Vec<String>,
}

/// Creates a container and runs its command to completion.
///
/// Returns [`crate::Error::LauncherExitNonzero`] when the user command
/// failed, so the binary can exit with the same status.
pub fn create_and_start(options: &StartOptions, storage: &dyn Storage) -> Result<()> {
    network::ensure_ipv4_forwarding()?;

    let (bridge_dev, bridge_address) = network::parse_bridge_spec(&options.bridge);
    network::ensure_bridge(&bridge_dev)?;
    network::ensure_bridge_up(&bridge_dev)?;

    if let Some(address) = &bridge_address {
        network::setup_bridge(&bridge_dev, address)?;
    }

    if let Some(iface) = &options.host_interface {
        network::add_interface_to_bridge(iface, &bridge_dev)?;
        network::copy_interface_address_to_bridge(iface, &bridge_dev)?;
        network::copy_interface_routes_to_bridge(iface, &bridge_dev)?;
    }

    let (name, ephemeral) = resolve_name(options);

    let packages = image::flatten_package_groups(&options.packages);
    let (hit, fingerprint) = image::ensure_base_image(&options.root_dir, &packages, storage)?;
    let image_dir = fsutil::image_dir(&options.root_dir, &fingerprint);

    if !hit || options.force {
        if !options.quiet {
            println!("Installing packages");
        }
        image::install_packages(&image_dir, &packages)?;
    }

    storage.init_container(&fingerprint, &name)?;

    let container_address = match &options.address {
        Some(address) => address.clone(),
        None => {
            let address = network::generate_random_network(Ipv4Addr::new(10, 0, 0, 0), 8);
            if !options.quiet {
                println!("Container will use IP: {}", address);
            }
            address
        }
    };

    if let Some(dir) = &options.copy_dir {
        fsutil::copy_dir(dir, &image_dir)?;
    }

    let result = nspawn::launch(
        storage,
        &LaunchConfig {
            name: &name,
            bridge: &bridge_dev,
            container_address: &container_address,
            bridge_address: bridge_address.as_deref(),
            quiet: options.quiet,
            command: &options.command,
        },
    );

    // Ephemeral containers vanish on every exit path, and a failed run
    // takes even a named container with it, unless the caller asked to
    // keep the wreckage for inspection.
    let failed = result.is_err();
    let destroy = (ephemeral && !(failed && options.keep_failed))
        || (failed && !options.keep_failed);

    if destroy {
        if let Err(destroy_err) = storage.destroy_container(&name) {
            // A destroy failure after a successful run is the primary
            // error; after a failed run it is secondary and only logged.
            if result.is_ok() {
                return Err(destroy_err);
            }
            warn!(
                container = %name,
                error = %destroy_err,
                "can't remove container"
            );
        } else {
            info!(container = %name, "container removed");
        }
    }

    result
}

fn resolve_name(options: &StartOptions) -> (String, bool) {
    if let Some(name) = &options.name {
        return (name.clone(), false);
    }

    let generated = namegen::generate();
    let ephemeral = !options.keep;

    if ephemeral && !options.keep_failed && !options.quiet {
        println!("Container is ephemeral and will be deleted after exit.");
    }
    println!("Container name: {}", generated);

    (generated, ephemeral)
}

/// Destroys one container: storage, namespace bind, veth pair.
///
/// With `force`, a storage failure (for example a container that never
/// fully initialised) does not abort the network cleanup result.
pub fn destroy_container(storage: &dyn Storage, name: &str, force: bool) -> Result<()> {
    let storage_result = storage.destroy_container(name);

    if let Err(err) = mount::umount_netns(name) {
        warn!(container = %name, error = %err, "can't unbind network namespace");
    }

    if let Err(err) = network::cleanup_veth(name) {
        warn!(container = %name, error = %err, "can't remove veth interface");
    }

    match storage_result {
        Err(err) if !force => Err(err),
        _ => Ok(()),
    }
}

/// Wipes the entire root directory: all containers and base images.
pub fn destroy_root(storage: &dyn Storage) -> Result<()> {
    storage.destroy()
}
