// Path: crates/test-utils/src/lib.rs

//! # Tally CSP Test Utilities
//!
//! In-memory backends and fixtures shared by unit and integration tests:
//! a [`MemCensusStore`] implementing the full persistence contract with the
//! same conditional-update semantics as the durable store, and a
//! [`RecordingNotifier`] capturing every delivery instead of sending it.

pub mod fixtures;
pub mod mem_store;
pub mod notifier;

pub use mem_store::MemCensusStore;
pub use notifier::RecordingNotifier;
