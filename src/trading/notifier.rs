//! Transient operator notifications.

use std::time::{Duration, Instant};

use tracing::{info, warn};

/// How long a notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "INFO",
            NotificationKind::Success => "SUCCESS",
            NotificationKind::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    expires_at: Instant,
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// Holds at most one notification; a newer one always replaces the current.
#[derive(Debug)]
pub struct Notifier {
    current: Option<Notification>,
    ttl: Duration,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_ttl(NOTIFICATION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            current: None,
            ttl,
        }
    }

    pub fn emit(&mut self, kind: NotificationKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            NotificationKind::Error => warn!(kind = kind.as_str(), "{}", message),
            _ => info!(kind = kind.as_str(), "{}", message),
        }

        self.current = Some(Notification {
            kind,
            message,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(NotificationKind::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.emit(NotificationKind::Success, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(NotificationKind::Error, message);
    }

    /// The visible notification, if it has not expired.
    pub fn current(&self) -> Option<&Notification> {
        self.current
            .as_ref()
            .filter(|n| Instant::now() < n.expires_at)
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }

    /// Drop the notification once its display time is over.
    pub fn clear_expired(&mut self) {
        if self.current.is_some() && self.current().is_none() {
            self.current = None;
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
