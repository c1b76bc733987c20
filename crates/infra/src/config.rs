//! Client configuration, loaded from `MARKETO_*` environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::jobs::RetryPolicy;

pub const ENV_ENDPOINT: &str = "MARKETO_ENDPOINT";
pub const ENV_IDENTITY: &str = "MARKETO_IDENTITY";
pub const ENV_CLIENT_ID: &str = "MARKETO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MARKETO_CLIENT_SECRET";
pub const ENV_TIMEOUT_SECS: &str = "MARKETO_TIMEOUT_SECS";
pub const ENV_EXPORT_MAX_RETRIES: &str = "MARKETO_EXPORT_MAX_RETRIES";
pub const ENV_EXPORT_INITIAL_DELAY_MS: &str = "MARKETO_EXPORT_INITIAL_DELAY_MS";
pub const ENV_EXPORT_MAX_DELAY_MS: &str = "MARKETO_EXPORT_MAX_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for one Marketo instance.
#[derive(Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `https://123-ABC-456.mktorest.com/rest`
    pub endpoint: String,
    /// Identity base, e.g. `https://123-ABC-456.mktorest.com/identity`
    pub identity: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Polling policy for export status checks
    pub export_retry: RetryPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("export_retry", &self.export_retry)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        identity: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: identity.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            export_retry: RetryPolicy::default(),
        }
    }

    pub fn with_export_retry(mut self, policy: RetryPolicy) -> Self {
        self.export_retry = policy;
        self
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let endpoint = require(ENV_ENDPOINT)?;
        let identity = require(ENV_IDENTITY)?;
        for (key, value) in [(ENV_ENDPOINT, &endpoint), (ENV_IDENTITY, &identity)] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.clone(),
                    reason: "expected an http(s) URL".to_string(),
                });
            }
        }

        let mut config = Self::new(
            endpoint,
            identity,
            require(ENV_CLIENT_ID)?,
            require(ENV_CLIENT_SECRET)?,
        );

        if let Some(secs) = parse_u64(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS))? {
            config.timeout = Duration::from_secs(secs);
        }

        let mut retry = RetryPolicy::default();
        if let Some(n) = parse_u64(ENV_EXPORT_MAX_RETRIES, get(ENV_EXPORT_MAX_RETRIES))? {
            retry.max_retries = u32::try_from(n).map_err(|_| ConfigError::Invalid {
                key: ENV_EXPORT_MAX_RETRIES,
                value: n.to_string(),
                reason: "too large".to_string(),
            })?;
        }
        if let Some(ms) = parse_u64(ENV_EXPORT_INITIAL_DELAY_MS, get(ENV_EXPORT_INITIAL_DELAY_MS))? {
            retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(ENV_EXPORT_MAX_DELAY_MS, get(ENV_EXPORT_MAX_DELAY_MS))? {
            retry.max_delay = Duration::from_millis(ms);
        }
        if retry.max_delay < retry.initial_delay {
            return Err(ConfigError::Invalid {
                key: ENV_EXPORT_MAX_DELAY_MS,
                value: retry.max_delay.as_millis().to_string(),
                reason: "must not be below the initial delay".to_string(),
            });
        }
        config.export_retry = retry;

        Ok(config)
    }
}

fn parse_u64(key: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
