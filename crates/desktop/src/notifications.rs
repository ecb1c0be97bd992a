//! Non-blocking operator notifications (toasts).

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Queue of notices waiting to be shown.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    queue: Vec<Notice>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        };
        match level {
            NoticeLevel::Error => tracing::warn!("notice: {}", notice.message),
            _ => tracing::debug!("notice: {}", notice.message),
        }
        self.queue.push(notice);
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.queue.last()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Hand every queued notice to the view, oldest first.
    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.queue)
    }
}
