use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::RefreshResult;
use crate::notification::base::{Notification, NotificationSender, Priority};

/// Sender that only writes notifications to the log.
///
/// Used when no alerting channel is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotificationSender;

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send(&self, notification: Notification) -> RefreshResult<()> {
        match notification.priority {
            Priority::Low | Priority::Medium => info!(
                priority = %notification.priority,
                detail = %notification.detail,
                "{}",
                notification.summary
            ),
            Priority::High => warn!(
                priority = %notification.priority,
                detail = %notification.detail,
                "{}",
                notification.summary
            ),
        }

        Ok(())
    }
}
