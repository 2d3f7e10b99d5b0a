//! Tests for network helpers.
//!
//! Validates broadcast normalisation, the random address generator's
//! documented split-by-255 behavior, veth naming, and the parsers that
//! scrape the configuration tools' output.

use std::net::{IpAddr, Ipv4Addr};

use hastur::network::{
    broadcast, default_classful_mask, generate_network_at, generate_random_network,
    parse_bridge_spec, parse_cidr_ip, parse_inet_cidrs, veth_name,
};

// =============================================================================
// Broadcast Computation
// =============================================================================

#[test]
fn broadcast_class_a() {
    let bcast = broadcast(&[10, 0, 0, 1], &[255, 0, 0, 0]).unwrap();
    assert_eq!(bcast, IpAddr::V4(Ipv4Addr::new(10, 255, 255, 255)));
}

#[test]
fn broadcast_is_pure() {
    let first = broadcast(&[192, 168, 1, 7], &[255, 255, 255, 0]).unwrap();
    let second = broadcast(&[192, 168, 1, 7], &[255, 255, 255, 0]).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 255)));
}

#[test]
fn broadcast_accepts_v4_mapped_ip() {
    // ::ffff:10.0.0.1 with a plain /8 mask normalises to 10.255.255.255.
    let mapped: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 10, 0, 0, 1];

    let bcast = broadcast(&mapped, &[255, 0, 0, 0]).unwrap();
    assert_eq!(bcast, IpAddr::V4(Ipv4Addr::new(10, 255, 255, 255)));
}

#[test]
fn broadcast_accepts_v4_mapped_mask() {
    let mask: [u8; 16] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 255, 0, 0, 0,
    ];

    let bcast = broadcast(&[10, 0, 0, 1], &mask).unwrap();
    assert_eq!(bcast, IpAddr::V4(Ipv4Addr::new(10, 255, 255, 255)));
}

#[test]
fn broadcast_length_mismatch_fails() {
    assert!(broadcast(&[10, 0, 0, 1], &[255, 255]).is_none());

    // A 16-byte mask whose prefix is not all-ones does not normalise.
    let mask: [u8; 16] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 255, 0, 0, 0,
    ];
    assert!(broadcast(&[10, 0, 0, 1], &mask).is_none());
}

#[test]
fn broadcast_per_byte_formula() {
    // broadcast[i] = ip[i] | !mask[i] for every accepted width.
    let ip = [172, 16, 3, 9];
    let mask = [255, 255, 0, 0];

    let IpAddr::V4(bcast) = broadcast(&ip, &mask).unwrap() else {
        panic!("expected an IPv4 broadcast");
    };

    for (i, octet) in bcast.octets().iter().enumerate() {
        assert_eq!(*octet, ip[i] | !mask[i]);
    }
}

// =============================================================================
// Classful Masks
// =============================================================================

#[test]
fn classful_mask_boundaries() {
    assert_eq!(default_classful_mask(Ipv4Addr::new(0, 0, 0, 1)), Some([255, 0, 0, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(127, 0, 0, 1)), Some([255, 0, 0, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(128, 0, 0, 1)), Some([255, 255, 0, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(191, 255, 0, 1)), Some([255, 255, 0, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(192, 0, 0, 1)), Some([255, 255, 255, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(223, 255, 255, 1)), Some([255, 255, 255, 0]));
    assert_eq!(default_classful_mask(Ipv4Addr::new(224, 0, 0, 1)), None);
    assert_eq!(default_classful_mask(Ipv4Addr::new(255, 255, 255, 255)), None);
}

// =============================================================================
// Random Address Generation
// =============================================================================

#[test]
fn generated_address_carries_base_bits() {
    let base = Ipv4Addr::new(10, 0, 0, 0);

    // Every octet ORs the base in, so the base's bits always survive;
    // the split-by-255 carry may set extra bits beyond them.
    for tick in [0u64, 1, 254, 255, 65_535, 16_777_215, u32::MAX as u64] {
        let address = generate_network_at(base, 8, tick);
        assert!(address.ends_with("/8"), "tick {}: {}", tick, address);

        let IpAddr::V4(ip) = parse_cidr_ip(&address).unwrap() else {
            panic!("generated address is not IPv4: {}", address);
        };
        assert_eq!(ip.octets()[0] & 10, 10, "tick {}: {}", tick, address);
    }
}

#[test]
fn generation_splits_tick_by_255() {
    let base = Ipv4Addr::new(10, 0, 0, 0);

    // The divisor is 255, not 256: 255 lands in the third octet.
    assert_eq!(generate_network_at(base, 8, 254), "10.0.0.254/8");
    assert_eq!(generate_network_at(base, 8, 255), "10.0.1.0/8");
    assert_eq!(generate_network_at(base, 8, 256), "10.0.1.1/8");
    // 65_025 = 255 * 255.
    assert_eq!(generate_network_at(base, 8, 65_025), "10.1.0.0/8");
}

#[test]
fn generation_reduces_tick_modulo_slots() {
    let base = Ipv4Addr::new(192, 168, 0, 0);
    let slots = 1u64 << (32 - 24);

    for tick in [3u64, 77, 200] {
        assert_eq!(
            generate_network_at(base, 24, tick),
            generate_network_at(base, 24, tick + 5 * slots),
        );
    }
}

#[test]
fn generation_ors_base_octets() {
    let base = Ipv4Addr::new(10, 0, 0, 0);
    // tick 1 → last octet 1, OR'd over 10.0.0.0.
    assert_eq!(generate_network_at(base, 8, 1), "10.0.0.1/8");
}

#[test]
fn wall_clock_generation_is_well_formed() {
    let address = generate_random_network(Ipv4Addr::new(10, 0, 0, 0), 8);
    let ip = parse_cidr_ip(&address).expect("generated address parses");
    assert!(matches!(ip, IpAddr::V4(v4) if v4.octets()[0] & 10 == 10));
}

// =============================================================================
// Veth Naming
// =============================================================================

#[test]
fn veth_names_are_truncated_to_14_bytes() {
    assert_eq!(veth_name("demo"), "vb-demo");
    assert_eq!(veth_name("irgep-atlopun-zod"), "vb-irgep-atlop");

    for name in ["a", "abcdefghijk", "abcdefghijkl", "much-longer-container-name"] {
        assert!(veth_name(name).len() <= 14, "veth for '{}' too long", name);
    }
}

// =============================================================================
// Parsers
// =============================================================================

#[test]
fn bridge_spec_forms() {
    assert_eq!(
        parse_bridge_spec("br0:10.0.0.1/8"),
        ("br0".to_string(), Some("10.0.0.1/8".to_string()))
    );
    assert_eq!(parse_bridge_spec("br0"), ("br0".to_string(), None));
}

#[test]
fn inet_parser_takes_all_v4_lines() {
    let output = "\
3: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500
    inet 192.168.1.10/24 brd 192.168.1.255 scope global eth0
    inet 10.8.0.3/16 scope global eth0
    inet6 2001:db8::1/64 scope global
";
    assert_eq!(
        parse_inet_cidrs(output),
        vec!["192.168.1.10/24", "10.8.0.3/16"]
    );
}

#[test]
fn inet_parser_handles_empty_output() {
    assert!(parse_inet_cidrs("").is_empty());
    assert!(parse_inet_cidrs("2: host0: <NO-CARRIER> mtu 1500\n").is_empty());
}
