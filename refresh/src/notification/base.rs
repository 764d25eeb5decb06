use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RefreshResult;

/// How urgently an operator needs to act on a notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => f.write_str("low"),
            Priority::Medium => f.write_str("medium"),
            Priority::High => f.write_str("high"),
        }
    }
}

/// An operational alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub summary: String,
    pub detail: String,
    pub priority: Priority,
}

impl Notification {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>, priority: Priority) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            priority,
        }
    }

    pub fn high(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(summary, detail, Priority::High)
    }

    pub fn low(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(summary, detail, Priority::Low)
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> RefreshResult<()>;
}
