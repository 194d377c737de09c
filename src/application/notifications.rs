// src/application/notifications.rs
// User-facing notifications raised by queries and mutations

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::domain::errors::ApiError;

const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotificationLevel::Info => write!(f, "INFO"),
            NotificationLevel::Success => write!(f, "SUCCESS"),
            NotificationLevel::Warning => write!(f, "WARNING"),
            NotificationLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: &str, message: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn success(title: &str, message: &str) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    /// Error notification carrying the backend's message or the generic fallback
    pub fn from_api_error(title: &str, error: &ApiError) -> Self {
        Self::new(NotificationLevel::Error, title, &error.user_message())
    }
}

/// Keeps a bounded history and fans notifications out to listeners
pub struct NotificationCenter {
    history: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);

        Self {
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn push(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                log::error!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Warning => {
                log::warn!("{}: {}", notification.title, notification.message)
            }
            _ => log::info!("{}: {}", notification.title, notification.message),
        }

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == MAX_HISTORY {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No receivers is fine, the history still has it
        let _ = self.tx.send(notification);
    }

    /// Most recent first
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
