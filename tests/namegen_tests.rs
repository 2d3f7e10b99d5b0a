//! Tests for the container name generator.
//!
//! Generated names follow the shape `T R - T R T - A` where `T` is a
//! two-letter syllable, `R` a three-letter syllable, and `A` either.

use hastur::namegen;

const TUPLES: &[&str] = &["ir", "oh", "at", "op", "un", "ed"];
const TRIPLES: &[&str] = &["gep", "vin", "kut", "lop", "man", "zod"];

/// Checks one name against the generator's grammar, the moral equivalent
/// of `^(T)(R)-(T)(R)(T)-[a-z]{2,3}$`.
fn matches_grammar(name: &str) -> bool {
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() != 3 {
        return false;
    }

    let tuple_of = |s: &str| TUPLES.iter().find(|t| s.starts_with(**t)).copied();
    let triple_of = |s: &str| TRIPLES.iter().find(|t| s.starts_with(**t)).copied();

    // First segment: tuple + triple.
    let Some(t1) = tuple_of(parts[0]) else { return false };
    let rest = &parts[0][t1.len()..];
    if !TRIPLES.contains(&rest) {
        return false;
    }

    // Second segment: tuple + triple + tuple.
    let Some(t2) = tuple_of(parts[1]) else { return false };
    let rest = &parts[1][t2.len()..];
    let Some(r2) = triple_of(rest) else { return false };
    let tail = &rest[r2.len()..];
    if !TUPLES.contains(&tail) {
        return false;
    }

    // Third segment: any syllable.
    TUPLES.contains(&parts[2]) || TRIPLES.contains(&parts[2])
}

#[test]
fn generated_names_match_the_grammar() {
    for _ in 0..500 {
        let name = namegen::generate();
        assert!(matches_grammar(&name), "bad name: {}", name);
    }
}

#[test]
fn example_name_matches() {
    assert!(matches_grammar("irgep-atlopun-zod"));
    assert!(matches_grammar("ohvin-edkutir-at"));
}

#[test]
fn malformed_names_do_not_match() {
    assert!(!matches_grammar("demo"));
    assert!(!matches_grammar("irgep-atlopun"));
    assert!(!matches_grammar("xxgep-atlopun-zod"));
    assert!(!matches_grammar("irgep-atlopun-zod-extra"));
}

#[test]
fn names_are_not_constant() {
    let first = namegen::generate();
    let varied = (0..64).any(|_| namegen::generate() != first);
    assert!(varied, "65 identical generated names");
}

#[test]
fn generated_names_fit_common_limits() {
    // Longest shape: 5 + 1 + 8 + 1 + 3 = 18 bytes, well under the
    // 64-byte hostname limit the launcher applies.
    for _ in 0..100 {
        assert!(namegen::generate().len() <= 18);
    }
}
