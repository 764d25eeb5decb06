pub mod base;
pub mod logging;

pub use base::{Notification, NotificationSender, Priority};
pub use logging::LoggingNotificationSender;
