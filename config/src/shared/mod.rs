//! Shared configuration types for the data refresh services.

mod base;
mod connection;
mod history_store;
mod notification;
mod refresh;
mod refresher;
mod schedule;
mod services;

pub use base::ValidationError;
pub use connection::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
pub use history_store::HistoryStoreConfig;
pub use notification::NotificationConfig;
pub use refresh::RefreshConfig;
pub use refresher::RefresherConfig;
pub use schedule::ScheduleConfig;
pub use services::ServicesConfig;
