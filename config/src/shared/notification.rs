use secrecy::SecretString;
use serde::Deserialize;

/// Configuration for delivering operational alerts to a webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// URL receiving a JSON payload for every alert.
    pub webhook_url: String,
    /// Optional key sent in the `apikey` header.
    pub api_key: Option<SecretString>,
    /// Request timeout in milliseconds.
    ///
    /// Default: 10000 (10 seconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl NotificationConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
}

fn default_timeout_ms() -> u64 {
    NotificationConfig::DEFAULT_TIMEOUT_MS
}
