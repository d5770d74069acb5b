//! Password generation: `misc/pwgen.py`'s ambiguity-free alphabet, sampled
//! with `rand` instead of the original's manual rejection loop over
//! `os.urandom`.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789_?!-";

pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
