// Path: crates/types/src/config/mod.rs

//! Shared configuration structures for the CSP runtime.
//!
//! Every tunable the engines consume lives here with a serde default, so a
//! deployment only states what it overrides. Secret material is wrapped in
//! [`SecretBytes`], which redacts its `Debug`/`Display` output and zeroizes
//! on drop; neither the salt nor the signing key can reach logs or serialized
//! responses through a formatting path.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret byte material loaded once at startup.
///
/// Deserializes from a hex string; serializes as a redaction marker so a
/// round-tripped config never carries the secret back out.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    /// Wraps raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the secret bytes.
    pub fn reveal(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if no material was configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(<redacted>)")
    }
}

impl fmt::Display for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

impl Serialize for SecretBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for SecretBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        Ok(Self(raw))
    }
}

fn default_otp_validity_ms() -> u64 {
    5 * 60 * 1000
}
fn default_otp_attempts() -> u32 {
    5
}
fn default_throttle_ms() -> u64 {
    1_000
}
fn default_cooldown_ms() -> u64 {
    5_000
}
fn default_token_ttl_pending_ms() -> u64 {
    10 * 60 * 1000
}
fn default_token_ttl_verified_ms() -> u64 {
    60 * 60 * 1000
}
fn default_token_sweep_interval_ms() -> u64 {
    60 * 1000
}
fn default_notifier_timeout_ms() -> u64 {
    10 * 1000
}
fn default_job_workers() -> usize {
    4
}
fn default_job_gc_delay_ms() -> u64 {
    60 * 1000
}
fn default_job_batch_size() -> usize {
    500
}
fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

/// Configuration for the CSP core.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CspConfig {
    /// Process-global salt for password hashing.
    #[serde(default = "SecretBytes::default")]
    pub salt: SecretBytes,
    /// The CSP's long-lived secp256k1 private key.
    #[serde(default = "SecretBytes::default")]
    pub csp_private_key: SecretBytes,
    /// How long an issued challenge code stays valid.
    #[serde(default = "default_otp_validity_ms")]
    pub otp_validity_ms: u64,
    /// Verification attempts before a challenge record is deleted.
    #[serde(default = "default_otp_attempts")]
    pub otp_attempts: u32,
    /// Minimum interval between two sends to the same address.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Minimum interval between two successful `initiate_auth` calls for the
    /// same `(bundle, member)` key.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// TTL of a pending token.
    #[serde(default = "default_token_ttl_pending_ms")]
    pub token_ttl_pending_ms: u64,
    /// TTL of a verified token.
    #[serde(default = "default_token_ttl_verified_ms")]
    pub token_ttl_verified_ms: u64,
    /// Interval of the expired-token sweeper.
    #[serde(default = "default_token_sweep_interval_ms")]
    pub token_sweep_interval_ms: u64,
    /// Per-request deadline for notifier sends.
    #[serde(default = "default_notifier_timeout_ms")]
    pub notifier_timeout_ms: u64,
    /// Size of the background job worker pool.
    #[serde(default = "default_job_workers")]
    pub job_workers: usize,
    /// How long a completed job row lingers before garbage collection.
    #[serde(default = "default_job_gc_delay_ms")]
    pub job_gc_delay_ms: u64,
    /// Members streamed per batch during census materialization.
    #[serde(default = "default_job_batch_size")]
    pub job_batch_size: usize,
    /// Public base URL used to build published census URIs.
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            salt: SecretBytes::default(),
            csp_private_key: SecretBytes::default(),
            otp_validity_ms: default_otp_validity_ms(),
            otp_attempts: default_otp_attempts(),
            throttle_ms: default_throttle_ms(),
            cooldown_ms: default_cooldown_ms(),
            token_ttl_pending_ms: default_token_ttl_pending_ms(),
            token_ttl_verified_ms: default_token_ttl_verified_ms(),
            token_sweep_interval_ms: default_token_sweep_interval_ms(),
            notifier_timeout_ms: default_notifier_timeout_ms(),
            job_workers: default_job_workers(),
            job_gc_delay_ms: default_job_gc_delay_ms(),
            job_batch_size: default_job_batch_size(),
            server_url: default_server_url(),
        }
    }
}

impl Default for SecretBytes {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl CspConfig {
    /// Challenge validity as a [`Duration`].
    pub fn otp_validity(&self) -> Duration {
        Duration::from_millis(self.otp_validity_ms)
    }

    /// Per-address send throttle as a [`Duration`].
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Per-key auth cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Notifier send deadline as a [`Duration`].
    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }
}

/// Configuration for the telemetry endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// Listen address for the `/metrics` server; disabled when unset.
    #[serde(default)]
    pub listen_address: Option<String>,
}
