//! User-facing notifications.
//!
//! Some push events deserve more than an activity feed line: a newly
//! discovered device or a device dropping offline is surfaced as a toast.
//! The engine publishes these on a broadcast channel; any number of view
//! components may subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Visual weight of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    #[default]
    Default,
    /// Something the operator should look at (a device went offline).
    Destructive,
}

/// A transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NotificationLevel::Default,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: NotificationLevel) -> Self {
        self.level = level;
        self
    }
}

/// Sender for notifications.
pub type NotificationSender = broadcast::Sender<Notification>;

/// Receiver for notifications.
pub type NotificationReceiver = broadcast::Receiver<Notification>;

/// Create a new notification channel with the given capacity.
pub fn notification_channel(capacity: usize) -> (NotificationSender, NotificationReceiver) {
    broadcast::channel(capacity)
}
