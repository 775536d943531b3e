// Path: crates/api/src/notifier.rs

//! Abstract challenge delivery.
//!
//! The CSP never talks to a mail or SMS provider directly; it hands a
//! [`Notification`] to whatever [`Notifier`] was injected and enforces its
//! own throttle and cooldown before doing so. Delivery backends, templates,
//! and language coverage are the notifier's concern; the core only forwards
//! the language hint.

use async_trait::async_trait;
use tally_types::auth::ContactChannel;
use thiserror::Error;

/// Errors surfaced by a delivery backend.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The send did not complete within the caller's deadline.
    #[error("notification send timed out")]
    Timeout,
    /// The caller's context was cancelled while the send was in flight.
    #[error("notification send cancelled")]
    Cancelled,
    /// The backend rejected or failed the send.
    #[error("notification send failed: {0}")]
    Send(String),
}

/// A single challenge delivery.
///
/// `Debug` skips the body: the body carries the challenge code, and
/// notification values routinely end up in log fields.
#[derive(Clone)]
pub struct Notification {
    /// The out-of-band channel to deliver over.
    pub channel: ContactChannel,
    /// The destination address: an email address or a phone number.
    pub address: String,
    /// The message subject, unused for SMS.
    pub subject: String,
    /// The rendered message body.
    pub body: String,
    /// Language hint forwarded from the voter's request, when any.
    pub lang: Option<String>,
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("channel", &self.channel)
            .field("address", &self.address)
            .field("subject", &self.subject)
            .field("lang", &self.lang)
            .finish_non_exhaustive()
    }
}

/// The delivery contract.
///
/// Implementations are stateless from the CSP's point of view; retries and
/// provider failover happen behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. The CSP wraps each call in its configured
    /// deadline; implementations should surface cancellation promptly.
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_skips_body() {
        let n = Notification {
            channel: ContactChannel::Email,
            address: "j@x".into(),
            subject: "Your code".into(),
            body: "code: 123456".into(),
            lang: Some("ca".into()),
        };
        let debug = format!("{:?}", n);
        assert!(!debug.contains("123456"));
        assert!(debug.contains("j@x"));
    }
}
