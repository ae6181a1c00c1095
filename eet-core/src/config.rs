//! Configuration and environment selection.
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use thiserror::Error;

use crate::receipt::codes::BkpCase;

/// EET environment selection for the submission endpoint.
/// - Playground: the public test service. Confirmations carry `test="true"`
///   and no receipt is legally registered.
/// - Production: the live registration service.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use eet_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("playground")?;
/// assert_eq!(env, EnvironmentType::Playground);
/// # Ok::<(), eet_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentType {
    Playground,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.to_ascii_lowercase().as_str() {
            "playground" => Ok(EnvironmentType::Playground),
            "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Playground => "playground",
            EnvironmentType::Production => "production",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Playground => "https://pg.eet.cz/eet/services/EETServiceSOAP/v3",
            EnvironmentType::Production => "https://prod.eet.cz/eet/services/EETServiceSOAP/v3",
        }
    }

    /// The value the server must echo in `Potvrzeni@test`.
    pub fn is_playground(&self) -> bool {
        matches!(self, EnvironmentType::Playground)
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Environment variable consulted when no explicit endpoint is configured.
pub const ENDPOINT_ENV_VAR: &str = "EET_ENDPOINT_URL";

/// Options for the submission client.
///
/// # Examples
/// ```rust
/// use std::time::Duration;
/// use eet_core::config::{Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Playground)
///     .with_timeout(Duration::from_secs(5))
///     .with_offline(true);
/// assert!(config.offline());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: EnvironmentType,
    timeout: Duration,
    offline: bool,
    user_agent: Option<String>,
    max_response_bytes: usize,
    endpoint: Option<String>,
    bkp_case: BkpCase,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            timeout: DEFAULT_TIMEOUT,
            offline: false,
            user_agent: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            endpoint: None,
            bkp_case: BkpCase::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Return locally computed codes instead of failing when the server
    /// cannot be reached or its reply is unusable.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_bkp_case(mut self, bkp_case: BkpCase) -> Self {
        self.bkp_case = bkp_case;
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    pub fn bkp_case(&self) -> BkpCase {
        self.bkp_case
    }

    /// Explicit endpoint, then `EET_ENDPOINT_URL`, then the environment default.
    pub fn resolve_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .or_else(|| {
                std::env::var(ENDPOINT_ENV_VAR)
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            })
            .unwrap_or_else(|| self.env.endpoint_url().to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(EnvironmentType::Playground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(
            EnvironmentType::from_str("PRODUCTION").unwrap(),
            EnvironmentType::Production
        );
        assert_eq!(
            EnvironmentType::from_str("Playground").unwrap(),
            EnvironmentType::Playground
        );
        let err = EnvironmentType::from_str("staging").unwrap_err();
        assert_eq!(
            err,
            EnvironmentParseError::Invalid {
                input: "staging".into()
            }
        );
    }

    #[test]
    fn defaults_match_original_client() {
        let config = Config::default();
        assert_eq!(config.env(), EnvironmentType::Playground);
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert!(!config.offline());
        assert_eq!(config.max_response_bytes(), 64 * 1024);
        assert_eq!(config.bkp_case(), BkpCase::Lower);
        assert!(config.user_agent().is_none());
    }

    #[test]
    fn explicit_endpoint_wins() {
        let config = Config::new(EnvironmentType::Production).with_endpoint("http://localhost:1/");
        assert_eq!(config.resolve_endpoint(), "http://localhost:1/");
    }

    #[test]
    fn only_playground_expects_test_flag() {
        assert!(EnvironmentType::Playground.is_playground());
        assert!(!EnvironmentType::Production.is_playground());
        assert!(EnvironmentType::Production.endpoint_url().starts_with("https://prod."));
    }
}
