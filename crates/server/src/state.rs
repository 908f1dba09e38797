use std::sync::Arc;

use argus_core::{Authenticator, Config, IntelAggregator, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    aggregator: Arc<IntelAggregator>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        aggregator: Arc<IntelAggregator>,
    ) -> Self {
        Self {
            config,
            authenticator,
            aggregator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn aggregator(&self) -> &IntelAggregator {
        self.aggregator.as_ref()
    }
}
