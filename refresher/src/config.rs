use config::load_config;
use config::shared::RefresherConfig;

use crate::error::{RefresherError, RefresherResult};

/// Loads and validates the refresher configuration.
pub fn load_refresher_config() -> RefresherResult<RefresherConfig> {
    let config = load_config::<RefresherConfig>().map_err(RefresherError::config)?;
    config.validate().map_err(RefresherError::config)?;

    Ok(config)
}
