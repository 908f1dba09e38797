pub mod auth;
pub mod classify;
pub mod config;
pub mod intel;
pub mod metrics;
pub mod testing;

pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use classify::{classify, Detection, HashAlgo, IndicatorKind};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, IntelConfig, SanitizedConfig, ServerConfig, ServiceSettings,
};
pub use intel::{
    services_for, IntelAggregator, IntelResponse, IntelService, LookupError, RateLimit,
    RateLimiter, ServiceError, ServiceKey, ServiceReport, ServiceStatus,
};
