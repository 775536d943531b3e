// Path: crates/test-utils/src/notifier.rs

//! A notifier that records deliveries instead of sending them.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally_api::notifier::{Notification, Notifier, NotifyError};

#[derive(Default)]
struct Inner {
    sent: Vec<Notification>,
    fail_next: bool,
    delay: Option<Duration>,
}

/// Records every notification handed to it; can be told to fail or stall the
/// next send to exercise error and deadline paths.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All notifications recorded so far, in send order.
    pub fn sent(&self) -> Vec<Notification> {
        self.lock().sent.clone()
    }

    /// The most recent notification, when any.
    pub fn last(&self) -> Option<Notification> {
        self.lock().sent.last().cloned()
    }

    /// How many notifications were recorded.
    pub fn count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Makes the next send fail with a backend error.
    pub fn fail_next(&self) {
        self.lock().fail_next = true;
    }

    /// Makes every send stall for `delay` before completing, to exercise the
    /// caller's deadline.
    pub fn stall(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let delay = {
            let mut inner = self.lock();
            if inner.fail_next {
                inner.fail_next = false;
                return Err(NotifyError::Send("simulated failure".to_string()));
            }
            inner.delay
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.lock().sent.push(notification);
        Ok(())
    }
}
