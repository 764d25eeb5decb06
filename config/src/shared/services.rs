use secrecy::SecretString;
use serde::Deserialize;

/// Location of the data services that perform the refresh stage work.
///
/// Version lookups, database resizing, stage workers and the donor import trigger are all
/// reached through this service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the data services API.
    pub base_url: String,
    /// Optional key sent in the `apikey` header.
    pub api_key: Option<SecretString>,
    /// Request timeout in milliseconds, stage work is long-running so this is generous.
    ///
    /// Default: 21600000 (6 hours)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ServicesConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 6 * 60 * 60 * 1_000;
}

fn default_timeout_ms() -> u64 {
    ServicesConfig::DEFAULT_TIMEOUT_MS
}
