use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Where refresh history records are persisted.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStoreConfig {
    /// Records are kept in memory and lost on restart, useful for development only.
    #[default]
    Memory,
    /// Records are persisted in a Postgres database.
    Postgres {
        connection: PgConnectionConfig,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl HistoryStoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            HistoryStoreConfig::Memory => Ok(()),
            HistoryStoreConfig::Postgres {
                connection,
                max_connections,
            } => {
                if *max_connections == 0 {
                    return Err(ValidationError::InvalidFieldValue {
                        field: "max_connections",
                        constraint: "must be greater than zero",
                    });
                }

                connection.validate()
            }
        }
    }
}

fn default_max_connections() -> u32 {
    HistoryStoreConfig::DEFAULT_MAX_CONNECTIONS
}
