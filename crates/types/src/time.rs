// Path: crates/types/src/time.rs

//! Wall-clock helpers.
//!
//! All persisted timestamps are unix milliseconds. Millisecond resolution is
//! required because the per-address send throttle defaults to one second and
//! tests exercise it with much shorter intervals.

use std::time::{SystemTime, UNIX_EPOCH};

/// A unix timestamp in milliseconds.
pub type UnixMillis = u64;

/// Returns the current wall-clock time as unix milliseconds.
pub fn now_ms() -> UnixMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
