//! Uniform user-facing notification surface.
//!
//! Sending is a channel send and never blocks. Every notification is also
//! emitted as a `tracing` event so a disabled notifier still leaves a trail.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    sender: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A notifier that only logs.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn notify(&self, level: NotifyLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotifyLevel::Info | NotifyLevel::Success => info!(notification = %message),
            NotifyLevel::Warn => warn!(notification = %message),
            NotifyLevel::Error => error!(notification = %message),
        }
        if let Some(sender) = &self.sender {
            // If the receiver is gone, silently drop.
            let _ = sender.send(Notification {
                level,
                message,
                at: Utc::now(),
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Success, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotifyLevel::Error, message);
    }
}
