use super::types::DistributorConfig;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Load and validate a distributor config from a JSON file. The total
/// weight is computed here; the returned config is ready to share.
pub fn load_config(path: &Path) -> Result<DistributorConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut config: DistributorConfig = serde_json::from_str(&data)?;
    validate_config(&mut config)?;

    Ok(config)
}

fn validate_config(config: &mut DistributorConfig) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::Validation("invalid port number: 0".to_string()));
    }

    if config.analyzers.is_empty() {
        return Err(ConfigError::Validation("no analyzers configured".to_string()));
    }

    if config.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "max_concurrency must be positive".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for sink in &config.analyzers {
        if !ids.insert(sink.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate analyzer id '{}'",
                sink.id
            )));
        }
        if sink.weight < 0.0 {
            return Err(ConfigError::Validation(format!(
                "analyzer '{}' has negative weight {}",
                sink.id, sink.weight
            )));
        }
    }

    config.total_weight = config.analyzers.iter().map(|s| s.weight).sum();
    if config.total_weight <= 0.0 {
        return Err(ConfigError::Validation(
            "no analyzers with positive weights".to_string(),
        ));
    }

    Ok(())
}
