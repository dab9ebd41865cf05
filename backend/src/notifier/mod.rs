//! Email notifications
//!
//! Services enqueue messages on a [`Notifier`] and return immediately. A
//! single worker task drains the queue and hands each message to a
//! [`Mailer`]. Delivery failures are logged and counted; they never reach
//! the operation that produced the message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod mailer;
pub mod templates;

pub use mailer::{LogMailer, Mailer, SmtpMailer, SmtpSettings};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid address {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A rendered message waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

impl OutgoingEmail {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        text_body: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: html_body.into(),
        }
    }
}

/// Cloneable handle onto the notification queue
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<OutgoingEmail>,
    failures: Arc<AtomicU64>,
}

impl Notifier {
    /// Start the delivery worker and return a handle to it
    pub fn spawn(mailer: Arc<dyn Mailer>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run_worker(rx, mailer, failures.clone()));
        (Self { tx, failures }, worker)
    }

    /// Handle over a caller-owned channel; nothing is delivered
    pub fn from_sender(tx: mpsc::UnboundedSender<OutgoingEmail>) -> Self {
        Self {
            tx,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a message. Never fails from the caller's point of view.
    pub fn notify(&self, email: OutgoingEmail) {
        let subject = email.subject.clone();
        if let Err(err) = self.tx.send(email) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                to = %err.0.to,
                subject = %subject,
                "Notification queue closed, message dropped"
            );
        }
    }

    /// Messages that could not be queued or delivered so far
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<OutgoingEmail>,
    mailer: Arc<dyn Mailer>,
    failures: Arc<AtomicU64>,
) {
    tracing::info!("Notification worker started");

    while let Some(email) = rx.recv().await {
        match mailer.send(&email).await {
            Ok(()) => {
                tracing::debug!(to = %email.to, subject = %email.subject, "Email delivered");
            }
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    to = %email.to,
                    subject = %email.subject,
                    error = %e,
                    "Email delivery failed"
                );
            }
        }
    }

    tracing::info!("Notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    fn sample() -> OutgoingEmail {
        OutgoingEmail::new("a@example.com", "Subject", "text", "<p>html</p>")
    }

    #[tokio::test]
    async fn test_worker_delivers_in_order() {
        let mailer = Arc::new(RecordingMailer::default());
        let (notifier, worker) = Notifier::spawn(mailer.clone());

        notifier.notify(OutgoingEmail::new("a@example.com", "one", "", ""));
        notifier.notify(OutgoingEmail::new("a@example.com", "two", "", ""));
        drop(notifier);
        worker.await.unwrap();

        let sent = mailer.sent.lock().await;
        let subjects: Vec<&str> = sent.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_counted_not_raised() {
        let (notifier, worker) = Notifier::spawn(Arc::new(FailingMailer));
        let observer = notifier.clone();

        notifier.notify(sample());
        drop(notifier);
        // the observer clone keeps the channel open; close it too
        let failures = observer.failures.clone();
        drop(observer);
        worker.await.unwrap();

        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = Notifier::from_sender(tx);
        notifier.notify(sample());
        assert_eq!(notifier.failure_count(), 1);
    }
}
