pub mod parse;
pub mod types;

pub use parse::{load_config, ConfigError};
pub use types::{DistributorConfig, SinkConfig};
