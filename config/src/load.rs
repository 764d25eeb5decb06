use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory holding `base.yaml` and the per-environment files, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

const BASE_FILE_STEM: &str = "base";

/// Environment variable overrides look like `APP_REFRESH__ACTIVE_TIER`.
const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to read configuration for the {environment} environment: {source}")]
    Build {
        environment: Environment,
        #[source]
        source: rust_cli_config::ConfigError,
    },

    #[error("invalid configuration: {0}")]
    Deserialize(#[source] rust_cli_config::ConfigError),
}

/// Loads the service configuration for the environment selected by `APP_ENVIRONMENT`.
///
/// `configuration/base` is required and `configuration/{environment}` is layered on top when
/// present. Both may be yaml or json. `APP_`-prefixed environment variables win over files.
pub fn load_config<T: DeserializeOwned>() -> Result<T, LoadConfigError> {
    let current_dir = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&current_dir.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration from an explicit directory and environment.
pub fn load_config_from<T: DeserializeOwned>(
    configuration_dir: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError> {
    let overrides = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    load_layers(configuration_dir, environment, overrides)
}

fn load_layers<T: DeserializeOwned>(
    configuration_dir: &Path,
    environment: Environment,
    overrides: rust_cli_config::Environment,
) -> Result<T, LoadConfigError> {
    if !configuration_dir.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_dir.to_path_buf(),
        ));
    }

    let base_file = configuration_dir.join(BASE_FILE_STEM);
    let environment_file = configuration_dir.join(environment.as_str());

    let settings = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::with_name(&base_file.to_string_lossy()))
        .add_source(
            rust_cli_config::File::with_name(&environment_file.to_string_lossy()).required(false),
        )
        .add_source(overrides)
        .build()
        .map_err(|source| LoadConfigError::Build {
            environment,
            source,
        })?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialize)
}
