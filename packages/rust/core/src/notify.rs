//! User-facing notifications.
//!
//! Status transitions are plain values; anything the user should be told
//! about is emitted separately as a [`Notification`] on a broadcast channel
//! that the presentation layer subscribes to.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered notifications per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 64;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A message meant to be shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Fan-out sender for notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Receive every notification emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Error, message.into());
    }

    fn emit(&self, level: NotificationLevel, message: String) {
        let notification = Notification {
            level,
            message,
            at: Utc::now(),
        };
        // No subscribers is fine: headless callers read the status instead.
        if self.tx.send(notification).is_err() {
            debug!(?level, "notification dropped, no subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_order() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.error("Crawling failed: refused");
        notifier.success("Dataset exported successfully!");

        let first = rx.try_recv().expect("first");
        assert_eq!(first.level, NotificationLevel::Error);
        assert_eq!(first.message, "Crawling failed: refused");

        let second = rx.try_recv().expect("second");
        assert_eq!(second.level, NotificationLevel::Success);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let notifier = Notifier::new();
        notifier.success("nobody listening");

        // Late subscribers only see what comes after they subscribed.
        let mut rx = notifier.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
