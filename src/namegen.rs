//! Pronounceable container name generator.
//!
//! Names are built from a fixed syllable alphabet and joined with dashes
//! at fixed positions, e.g. `irgep-atlopun-zod`. A generated name marks
//! the container as ephemeral unless the caller asks to keep it.

use rand::seq::SliceRandom;
use rand::Rng;

/// Two-letter syllables.
const TUPLES: &[&str] = &["ir", "oh", "at", "op", "un", "ed"];

/// Three-letter syllables.
const TRIPLES: &[&str] = &["gep", "vin", "kut", "lop", "man", "zod"];

/// Generates a random container name.
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

/// Generator core, parameterised over the randomness source.
pub fn generate_with<R: Rng>(rng: &mut R) -> String {
    let tuple = |rng: &mut R| *TUPLES.choose(rng).unwrap_or(&TUPLES[0]);
    let triple = |rng: &mut R| *TRIPLES.choose(rng).unwrap_or(&TRIPLES[0]);
    let any = |rng: &mut R| {
        if rng.gen_bool(0.5) {
            tuple(rng)
        } else {
            triple(rng)
        }
    };

    [
        tuple(rng),
        triple(rng),
        "-",
        tuple(rng),
        triple(rng),
        tuple(rng),
        "-",
        any(rng),
    ]
    .concat()
}
