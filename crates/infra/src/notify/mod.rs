//! Outbound email.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget email dispatch.
pub trait Notifier: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        (**self).send(email)
    }
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "email"
        );
        Ok(())
    }
}

/// Keeps every email it is asked to send. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Email>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Deliveries attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|a| *a).unwrap_or(0)
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if let Ok(mut a) = self.attempts.lock() {
            *a += 1;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("smtp connection refused".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("recorder lock poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}
