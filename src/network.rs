//! Network helpers: bridge management, address and route migration,
//! per-namespace configuration, masquerading, and the random container
//! address generator.
//!
//! Every mutation of shared host state is idempotent. The configuration
//! tools report "already present" conditions as failures on stderr, so
//! each helper passes the exact benign prefix to the process runner:
//!
//! | operation        | tolerated stderr prefix                  |
//! |------------------|------------------------------------------|
//! | bridge create    | `device <x> already exists;`             |
//! | interface enrol  | `device <x> is already a member`         |
//! | route/addr add   | `RTNETLINK answers: File exists`         |
//! | veth delete      | `Cannot find device`                     |

use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::exec;

/// Interface name inside the container namespace created by the launcher.
const CONTAINER_IFACE: &str = "host0";

/// `ip route`/`ip addr` "already exists" stderr prefix.
const RTNETLINK_EXISTS: &str = "RTNETLINK answers: File exists";

/// Kernel limit on interface name length.
const IFACE_NAME_MAX: usize = 14;

fn network_error(operation: impl Into<String>, err: exec::ExecError) -> Error {
    if err.is_spawn_failure() {
        return Error::HostPrereq {
            operation: operation.into(),
            reason: err.to_string(),
        };
    }

    Error::Network {
        operation: operation.into(),
        reason: err.to_string(),
    }
}

// =============================================================================
// Bridge Management
// =============================================================================

/// Parses a bridge spec of the form `dev` or `dev:address/prefix`.
pub fn parse_bridge_spec(spec: &str) -> (String, Option<String>) {
    match spec.split_once(':') {
        Some((dev, address)) => (dev.to_string(), Some(address.to_string())),
        None => (spec.to_string(), None),
    }
}

/// Creates the bridge if it does not exist yet.
pub fn ensure_bridge(bridge: &str) -> Result<()> {
    let benign = format!("device {} already exists;", bridge);

    exec::run_checked("brctl", &["addbr", bridge], &[benign.as_str()])
        .map_err(|e| network_error(format!("create bridge '{}'", bridge), e))?;

    Ok(())
}

/// Brings the bridge link up.
pub fn ensure_bridge_up(bridge: &str) -> Result<()> {
    exec::run_checked("ip", &["link", "set", "dev", bridge, "up"], &[])
        .map_err(|e| network_error(format!("set bridge '{}' up", bridge), e))?;

    Ok(())
}

/// Assigns an address to the bridge; already-assigned is success.
pub fn setup_bridge(bridge: &str, address: &str) -> Result<()> {
    ensure_address(None, address, bridge)
}

/// Enrols a host interface into the bridge.
pub fn add_interface_to_bridge(iface: &str, bridge: &str) -> Result<()> {
    let benign = format!("device {} is already a member", iface);

    exec::run_checked("brctl", &["addif", bridge, iface], &[benign.as_str()])
        .map_err(|e| network_error(format!("add '{}' to bridge '{}'", iface, bridge), e))?;

    Ok(())
}

/// Enables IPv4 forwarding if it is not already enabled.
pub fn ensure_ipv4_forwarding() -> Result<()> {
    let path = "/proc/sys/net/ipv4/ip_forward";

    let current = fs::read_to_string(path).map_err(|e| Error::Network {
        operation: format!("read '{}'", path),
        reason: e.to_string(),
    })?;

    if current.trim() != "1" {
        fs::write(path, "1\n").map_err(|e| Error::Network {
            operation: format!("write '1' to '{}'", path),
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

// =============================================================================
// Host Interface Migration
// =============================================================================

/// Copies every IPv4 address of `iface` onto `bridge`, recomputing the
/// broadcast from the interface's default classful mask.
///
/// An interface with no addresses left is success: the enrolment step may
/// already have migrated them.
pub fn copy_interface_address_to_bridge(iface: &str, bridge: &str) -> Result<()> {
    let output = exec::run_checked("ip", &["addr", "show", "dev", iface], &[])
        .map_err(|e| network_error(format!("list addresses of '{}'", iface), e))?;

    let addresses = parse_inet_cidrs(&output.stdout);
    if addresses.is_empty() {
        debug!(iface, "no IPv4 addresses to copy");
        return Ok(());
    }

    for cidr in addresses {
        let ip = match parse_cidr_ip(&cidr) {
            Some(IpAddr::V4(ip)) => ip,
            _ => continue,
        };

        let mask = match default_classful_mask(ip) {
            Some(mask) => mask,
            None => {
                warn!(address = %cidr, "no classful mask, skipping");
                continue;
            }
        };

        let bcast = match broadcast(&ip.octets(), &mask) {
            Some(addr) => addr.to_string(),
            None => continue,
        };

        exec::run_checked(
            "ip",
            &["addr", "add", "dev", bridge, &cidr, "broadcast", &bcast],
            &[RTNETLINK_EXISTS],
        )
        .map_err(|e| network_error(format!("copy address '{}' to '{}'", cidr, bridge), e))?;
    }

    Ok(())
}

/// Moves every route of `iface` onto `bridge`, preserving the route spec
/// verbatim. A missing route set is success.
pub fn copy_interface_routes_to_bridge(iface: &str, bridge: &str) -> Result<()> {
    let output = exec::run_checked("ip", &["route", "show", "dev", iface], &[])
        .map_err(|e| network_error(format!("list routes of '{}'", iface), e))?;

    for line in output.stdout.lines() {
        let route: Vec<&str> = line.split_whitespace().collect();
        if route.is_empty() {
            continue;
        }

        exec_ip_route("delete", iface, &route)?;
        exec_ip_route("add", bridge, &route)?;
    }

    Ok(())
}

fn exec_ip_route(action: &str, dev: &str, route: &[&str]) -> Result<()> {
    let mut args = vec!["route", action, "dev", dev];
    args.extend_from_slice(route);

    exec::run_checked("ip", &args, &[RTNETLINK_EXISTS])
        .map_err(|e| network_error(format!("route {} on '{}'", action, dev), e))?;

    Ok(())
}

// =============================================================================
// Container Namespace Configuration
// =============================================================================

/// Configures networking inside the named namespace: assigns `address`
/// on `host0`, brings the link up, and installs a default route via the
/// gateway (the bare IP of `gateway_cidr`).
///
/// Without a bridge address there is no gateway and the default route is
/// skipped; the container still reaches the bridge segment directly.
pub fn setup_container_network(
    namespace: &str,
    address: &str,
    gateway_cidr: Option<&str>,
) -> Result<()> {
    ensure_address(Some(namespace), address, CONTAINER_IFACE)?;
    up_interface(namespace, CONTAINER_IFACE)?;

    let gateway_cidr = match gateway_cidr {
        Some(cidr) => cidr,
        None => return Ok(()),
    };

    let gateway = parse_cidr_ip(gateway_cidr).ok_or_else(|| Error::Network {
        operation: format!("parse gateway '{}'", gateway_cidr),
        reason: "not an ip/prefix pair".to_string(),
    })?;

    add_default_route(namespace, gateway)
}

fn ensure_address(namespace: Option<&str>, address: &str, dev: &str) -> Result<()> {
    let mut args = Vec::new();
    if let Some(ns) = namespace {
        args.extend_from_slice(&["-n", ns]);
    }
    args.extend_from_slice(&["addr", "add", address, "dev", dev]);

    exec::run_checked("ip", &args, &[RTNETLINK_EXISTS])
        .map_err(|e| network_error(format!("assign '{}' on '{}'", address, dev), e))?;

    Ok(())
}

fn up_interface(namespace: &str, dev: &str) -> Result<()> {
    exec::run_checked("ip", &["-n", namespace, "link", "set", "up", dev], &[])
        .map_err(|e| network_error(format!("set '{}' up in netns '{}'", dev, namespace), e))?;

    Ok(())
}

fn add_default_route(namespace: &str, gateway: IpAddr) -> Result<()> {
    let gateway = gateway.to_string();

    exec::run_checked(
        "ip",
        &["-n", namespace, "route", "add", "default", "via", &gateway],
        &[RTNETLINK_EXISTS],
    )
    .map_err(|e| network_error(format!("add default route via '{}'", gateway), e))?;

    Ok(())
}

/// Reads the first IPv4 address of `host0` inside netns `name`.
///
/// Returns an empty string when no address is assigned.
pub fn container_ipv4(name: &str) -> Result<String> {
    let output = exec::run_checked("ip", &["-n", name, "addr", "show", CONTAINER_IFACE], &[])
        .map_err(|e| network_error(format!("show '{}' in netns '{}'", CONTAINER_IFACE, name), e))?;

    Ok(parse_inet_cidrs(&output.stdout)
        .into_iter()
        .next()
        .unwrap_or_default())
}

// =============================================================================
// Veth and Masquerade Cleanup
// =============================================================================

/// Host-side veth name for a container, truncated to the kernel's
/// interface-name limit.
pub fn veth_name(container: &str) -> String {
    let mut name = format!("vb-{}", container);
    name.truncate(IFACE_NAME_MAX);
    name
}

/// Deletes the container's host-side veth; a missing device is success.
pub fn cleanup_veth(container: &str) -> Result<()> {
    let iface = veth_name(container);

    exec::run_checked("ip", &["link", "delete", &iface], &["Cannot find device"])
        .map_err(|e| network_error(format!("delete interface '{}'", iface), e))?;

    Ok(())
}

/// Installs a POSTROUTING masquerade rule for traffic egressing `bridge`.
pub fn add_masquerade(bridge: &str) -> Result<()> {
    exec::run_combined(
        "iptables",
        &["-t", "nat", "-A", "POSTROUTING", "-o", bridge, "-j", "MASQUERADE"],
    )
    .map_err(|e| network_error(format!("add masquerade for '{}'", bridge), e))?;

    Ok(())
}

/// Removes the POSTROUTING masquerade rule for `bridge`.
pub fn remove_masquerade(bridge: &str) -> Result<()> {
    exec::run_combined(
        "iptables",
        &["-t", "nat", "-D", "POSTROUTING", "-o", bridge, "-j", "MASQUERADE"],
    )
    .map_err(|e| network_error(format!("remove masquerade for '{}'", bridge), e))?;

    Ok(())
}

// =============================================================================
// Address Arithmetic
// =============================================================================

/// Computes the broadcast address for `ip` and `mask`.
///
/// Accepts addresses in 4- or 16-byte form and masks that may be IPv4 or
/// IPv4-mapped IPv6; both are normalised to 4 bytes before combining.
/// Returns `None` when the lengths still disagree after normalisation.
pub fn broadcast(ip: &[u8], mask: &[u8]) -> Option<IpAddr> {
    const V4_IN_V6_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

    let mask = if mask.len() == 16 && ip.len() == 4 && mask[..12].iter().all(|b| *b == 0xff) {
        &mask[12..]
    } else {
        mask
    };

    let ip = if ip.len() == 16 && mask.len() == 4 && ip[..12] == V4_IN_V6_PREFIX {
        &ip[12..]
    } else {
        ip
    };

    if ip.len() != mask.len() {
        return None;
    }

    match ip.len() {
        4 => {
            let mut out = [0u8; 4];
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = ip[i] | !mask[i];
            }
            Some(IpAddr::V4(Ipv4Addr::from(out)))
        }
        16 => {
            let mut out = [0u8; 16];
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = ip[i] | !mask[i];
            }
            Some(IpAddr::V6(Ipv6Addr::from(out)))
        }
        _ => None,
    }
}

/// Default classful netmask for an IPv4 address; `None` for class D/E.
pub fn default_classful_mask(ip: Ipv4Addr) -> Option<[u8; 4]> {
    let first = ip.octets()[0];
    match first {
        0..=127 => Some([0xff, 0, 0, 0]),
        128..=191 => Some([0xff, 0xff, 0, 0]),
        192..=223 => Some([0xff, 0xff, 0xff, 0]),
        _ => None,
    }
}

/// Generates a container address inside `base`/`prefix` from the current
/// time.
///
/// The millisecond tick is reduced modulo the network's slot count and
/// split into octets by repeated division by 255. The divisor is 255, not
/// 256: the distribution is non-uniform but operators have tooling that
/// assumes it, so it is part of the contract. Collisions are tolerated by
/// upstream idempotence.
pub fn generate_random_network(base: Ipv4Addr, prefix: u8) -> String {
    let tick = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    generate_network_at(base, prefix, tick)
}

/// Deterministic core of [`generate_random_network`].
pub fn generate_network_at(base: Ipv4Addr, prefix: u8, tick: u64) -> String {
    let zeros = 32 - u32::from(prefix.min(32));
    let slots: u64 = 1 << zeros;

    let mut x = tick % slots;

    let octet4 = (x % 255) as u8;
    x /= 255;
    let octet3 = (x % 255) as u8;
    x /= 255;
    let octet2 = (x % 255) as u8;
    x /= 255;
    let octet1 = x as u8;

    let base = base.octets();
    let ip = Ipv4Addr::new(
        octet1 | base[0],
        octet2 | base[1],
        octet3 | base[2],
        octet4 | base[3],
    );

    format!("{}/{}", ip, prefix)
}

// =============================================================================
// Output Parsing
// =============================================================================

/// Extracts the CIDR of every `inet` line from `ip addr show` output,
/// skipping `inet6` entries.
pub fn parse_inet_cidrs(output: &str) -> Vec<String> {
    let mut cidrs = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("inet ") {
            continue;
        }

        if let Some(cidr) = trimmed.split_whitespace().nth(1) {
            cidrs.push(cidr.to_string());
        }
    }

    cidrs
}

/// Parses the address part of an `ip/prefix` pair.
pub fn parse_cidr_ip(cidr: &str) -> Option<IpAddr> {
    let (ip, _prefix) = cidr.split_once('/')?;
    ip.parse().ok()
}
