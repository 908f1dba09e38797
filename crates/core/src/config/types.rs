use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::intel::ServiceKey;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub intel: IntelConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when method = "api_key".
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Intelligence engine configuration: shared adapter timeout plus one
/// credential section per upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntelConfig {
    /// Per-call HTTP timeout applied to every adapter (default: 15).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub shodan: ServiceSettings,
    #[serde(default)]
    pub greynoise: ServiceSettings,
    #[serde(default)]
    pub abuseipdb: ServiceSettings,
    #[serde(default)]
    pub otx: ServiceSettings,
    #[serde(default)]
    pub crtsh: ServiceSettings,
    #[serde(default)]
    pub securitytrails: ServiceSettings,
    #[serde(default)]
    pub virustotal: ServiceSettings,
    #[serde(default)]
    pub threatfox: ServiceSettings,
    #[serde(default)]
    pub urlhaus: ServiceSettings,
    #[serde(default)]
    pub urlscan: ServiceSettings,
    #[serde(default)]
    pub hibp: ServiceSettings,
    #[serde(default)]
    pub emailrep: ServiceSettings,
    #[serde(default)]
    pub github: ServiceSettings,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            shodan: ServiceSettings::default(),
            greynoise: ServiceSettings::default(),
            abuseipdb: ServiceSettings::default(),
            otx: ServiceSettings::default(),
            crtsh: ServiceSettings::default(),
            securitytrails: ServiceSettings::default(),
            virustotal: ServiceSettings::default(),
            threatfox: ServiceSettings::default(),
            urlhaus: ServiceSettings::default(),
            urlscan: ServiceSettings::default(),
            hibp: ServiceSettings::default(),
            emailrep: ServiceSettings::default(),
            github: ServiceSettings::default(),
        }
    }
}

fn default_timeout_secs() -> u32 {
    15
}

/// Per-service settings: credential and optional base URL override (the
/// override is mainly for tests against a local mock upstream).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ServiceSettings {
    /// The credential, with empty strings treated as absent.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty())
    }

    /// The base URL override, or the service's well-known default.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default.to_string())
    }
}

impl IntelConfig {
    pub fn settings(&self, key: ServiceKey) -> &ServiceSettings {
        match key {
            ServiceKey::Shodan => &self.shodan,
            ServiceKey::GreyNoise => &self.greynoise,
            ServiceKey::AbuseIpdb => &self.abuseipdb,
            ServiceKey::Otx => &self.otx,
            ServiceKey::CrtSh => &self.crtsh,
            ServiceKey::SecurityTrails => &self.securitytrails,
            ServiceKey::VirusTotal => &self.virustotal,
            ServiceKey::ThreatFox => &self.threatfox,
            ServiceKey::UrlHaus => &self.urlhaus,
            ServiceKey::UrlScan => &self.urlscan,
            ServiceKey::Hibp => &self.hibp,
            ServiceKey::EmailRep => &self.emailrep,
            ServiceKey::GitHub => &self.github,
        }
    }

    fn settings_mut(&mut self, key: ServiceKey) -> &mut ServiceSettings {
        match key {
            ServiceKey::Shodan => &mut self.shodan,
            ServiceKey::GreyNoise => &mut self.greynoise,
            ServiceKey::AbuseIpdb => &mut self.abuseipdb,
            ServiceKey::Otx => &mut self.otx,
            ServiceKey::CrtSh => &mut self.crtsh,
            ServiceKey::SecurityTrails => &mut self.securitytrails,
            ServiceKey::VirusTotal => &mut self.virustotal,
            ServiceKey::ThreatFox => &mut self.threatfox,
            ServiceKey::UrlHaus => &mut self.urlhaus,
            ServiceKey::UrlScan => &mut self.urlscan,
            ServiceKey::Hibp => &mut self.hibp,
            ServiceKey::EmailRep => &mut self.emailrep,
            ServiceKey::GitHub => &mut self.github,
        }
    }

    /// Fill missing credentials from each service's canonical environment
    /// variable (`SHODAN_API_KEY`, `VT_API_KEY`, ...). Values already set in
    /// the config file win.
    pub fn apply_env_credentials(&mut self) {
        for key in ServiceKey::ALL {
            let Some(var) = key.credential_env_var() else {
                continue;
            };
            let settings = self.settings_mut(key);
            if settings.resolved_api_key().is_some() {
                continue;
            }
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    settings.api_key = Some(value);
                }
            }
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub intel: SanitizedIntelConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

/// Sanitized intel config (credentials reduced to booleans)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIntelConfig {
    pub timeout_secs: u32,
    pub services: Vec<SanitizedServiceConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServiceConfig {
    pub service: String,
    pub requires_api_key: bool,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let services = ServiceKey::ALL
            .iter()
            .map(|key| {
                let settings = config.intel.settings(*key);
                SanitizedServiceConfig {
                    service: key.name().to_string(),
                    requires_api_key: key.requires_api_key(),
                    api_key_configured: settings.resolved_api_key().is_some(),
                }
            })
            .collect();

        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.is_empty()),
            },
            server: config.server.clone(),
            intel: SanitizedIntelConfig {
                timeout_secs: config.intel.timeout_secs,
                services,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_valid_config_with_none_auth() {
        let toml = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.auth.method, AuthMethod::None));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_with_default_server() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_intel_section() {
        let toml = r#"
[auth]
method = "none"

[intel]
timeout_secs = 20

[intel.shodan]
api_key = "shodan-key"

[intel.crtsh]
base_url = "http://localhost:9999/"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.intel.timeout_secs, 20);
        assert_eq!(
            config.intel.shodan.resolved_api_key().as_deref(),
            Some("shodan-key")
        );
        // Trailing slash is stripped so adapters can join paths.
        assert_eq!(
            config.intel.crtsh.base_url_or("https://crt.sh"),
            "http://localhost:9999"
        );
        assert!(config.intel.virustotal.resolved_api_key().is_none());
    }

    #[test]
    fn test_intel_defaults() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.intel.timeout_secs, 15);
        assert!(config.intel.shodan.api_key.is_none());
    }

    #[test]
    fn test_empty_api_key_is_treated_as_absent() {
        let settings = ServiceSettings {
            api_key: Some(String::new()),
            base_url: None,
        };
        assert!(settings.resolved_api_key().is_none());
    }

    #[test]
    fn test_apply_env_credentials_fills_missing_keys_only() {
        std::env::set_var("SHODAN_API_KEY", "from-env");

        let mut intel = IntelConfig {
            virustotal: ServiceSettings {
                api_key: Some("from-file".to_string()),
                base_url: None,
            },
            ..IntelConfig::default()
        };
        intel.apply_env_credentials();

        assert_eq!(
            intel.shodan.resolved_api_key().as_deref(),
            Some("from-env")
        );
        assert_eq!(
            intel.virustotal.resolved_api_key().as_deref(),
            Some("from-file")
        );

        std::env::remove_var("SHODAN_API_KEY");
    }

    #[test]
    fn test_sanitized_config_redacts_credentials() {
        let mut config = Config {
            auth: AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some("caller-secret".to_string()),
            },
            server: ServerConfig::default(),
            intel: IntelConfig::default(),
        };
        config.intel.shodan.api_key = Some("shodan-secret".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "api_key");
        assert!(sanitized.auth.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("caller-secret"));
        assert!(!json.contains("shodan-secret"));

        let shodan = sanitized
            .intel
            .services
            .iter()
            .find(|s| s.service == "shodan")
            .unwrap();
        assert!(shodan.api_key_configured);

        let crtsh = sanitized
            .intel
            .services
            .iter()
            .find(|s| s.service == "crt-sh")
            .unwrap();
        assert!(!crtsh.requires_api_key);
        assert!(!crtsh.api_key_configured);
    }
}
