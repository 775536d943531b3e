// Path: crates/crypto/src/rand.rs

//! CSPRNG generation of token handles, job identifiers, and challenge codes.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use tally_types::ids::{JobId, TokenId};

/// Generates a fresh 128-bit authentication token handle.
pub fn new_token() -> TokenId {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    TokenId(raw)
}

/// Generates a fresh job identifier.
pub fn new_job_id() -> JobId {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    JobId(raw)
}

/// Generates a uniformly random 6-digit challenge code, zero-padded.
pub fn new_otp() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:06}", n)
}
