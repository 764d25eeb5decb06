//! Configuration types and loading for the data refresh services.

pub mod environment;
pub mod load;
pub mod shared;

pub use load::{LoadConfigError, load_config, load_config_from};
