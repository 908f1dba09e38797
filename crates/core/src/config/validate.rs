use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Server port is not 0
/// - Adapter timeout is within a sane range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // One slow upstream must not be able to stall an aggregation for long;
    // the adapter timeout is the only bound.
    if config.intel.timeout_secs == 0 || config.intel.timeout_secs > 120 {
        return Err(ConfigError::ValidationError(
            "intel.timeout_secs must be between 1 and 120".to_string(),
        ));
    }

    Ok(())
}
