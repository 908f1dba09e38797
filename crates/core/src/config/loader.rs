use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// `ARGUS_`-prefixed variables override file values (double underscore as
/// the section separator, e.g. `ARGUS_SERVER__PORT=9000`); missing service
/// credentials are then filled from their canonical environment variables.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let mut config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("ARGUS_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.intel.apply_env_credentials();

    Ok(config)
}

/// Load configuration from TOML string (useful for testing).
///
/// No environment lookups are applied; the string is taken as-is.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
