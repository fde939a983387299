use serde::Deserialize;
use session_core::config as core_config;
use session_core::config::get_env;
use session_core::error::CoreError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub backend: BackendConfig,
    pub logout_flag_prefix: String,
    pub broadcast_channel: String,
    pub landing_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| CoreError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SyncConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("session-sync"), is_prod)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(common.log_level),
            backend: BackendConfig {
                base_url: get_env(
                    "SESSION_BACKEND_URL",
                    Some("http://localhost:3000"),
                    is_prod,
                )?,
            },
            logout_flag_prefix: get_env("LOGOUT_FLAG_PREFIX", Some("logoutFlags"), is_prod)?,
            broadcast_channel: get_env("BROADCAST_CHANNEL", Some("firebase-logout-css3d"), is_prod)?,
            landing_url: get_env("LANDING_URL", Some("/"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.backend.base_url.is_empty() {
            return Err(CoreError::ConfigError(anyhow::anyhow!(
                "SESSION_BACKEND_URL must not be empty"
            )));
        }

        if self.logout_flag_prefix.is_empty() {
            return Err(CoreError::ConfigError(anyhow::anyhow!(
                "LOGOUT_FLAG_PREFIX must not be empty"
            )));
        }

        if self.broadcast_channel.is_empty() {
            return Err(CoreError::ConfigError(anyhow::anyhow!(
                "BROADCAST_CHANNEL must not be empty"
            )));
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            service_name: "session-sync".to_string(),
            log_level: "info".to_string(),
            backend: BackendConfig {
                base_url: "http://localhost:3000".to_string(),
            },
            logout_flag_prefix: "logoutFlags".to_string(),
            broadcast_channel: "firebase-logout-css3d".to_string(),
            landing_url: "/".to_string(),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broadcast_channel, "firebase-logout-css3d");
        assert_eq!(config.logout_flag_prefix, "logoutFlags");
    }

    #[test]
    fn empty_backend_url_is_rejected() {
        let mut config = SyncConfig::default();
        config.backend.base_url = String::new();
        assert!(config.validate().is_err());
    }
}
