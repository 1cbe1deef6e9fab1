use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Connection settings for the remote progress endpoint.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    base_url: Url,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl RemoteConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

    /// Builds a config for `base_url` with the default timeout and no token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRemoteUrl` if the URL does not parse or
    /// cannot carry path segments.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRemoteUrl {
            raw: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url.trim()).map_err(|err| invalid(err.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("url cannot have path segments".into()));
        }
        Ok(Self {
            base_url: parsed,
            bearer_token: None,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.trim().is_empty()).then_some(token);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `MARATHON_REMOTE_URL`, `MARATHON_REMOTE_TOKEN` and
    /// `MARATHON_REMOTE_TIMEOUT_MS`.
    ///
    /// Returns `Ok(None)` when no URL is set, which means offline mode.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(url) = non_empty_var("MARATHON_REMOTE_URL") else {
            return Ok(None);
        };
        let mut config = Self::new(&url)?;
        if let Some(token) = non_empty_var("MARATHON_REMOTE_TOKEN") {
            config = config.with_bearer_token(token);
        }
        if let Some(timeout) = millis_var("MARATHON_REMOTE_TIMEOUT_MS")? {
            config = config.with_timeout(timeout);
        }
        Ok(Some(config))
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Timing knobs for the sync protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last toggle before the remote save is sent.
    pub debounce: Duration,
    /// Upper bound for the remote part of the initial load, capped at
    /// [`SyncConfig::MAX_LOAD_BUDGET`].
    pub load_budget: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            load_budget: Duration::from_millis(3_000),
        }
    }
}

impl SyncConfig {
    /// Longest load budget honoured; larger values are clamped to it.
    pub const MAX_LOAD_BUDGET: Duration = Duration::from_secs(60);

    /// The load budget actually applied, capped at [`Self::MAX_LOAD_BUDGET`].
    #[must_use]
    pub fn effective_load_budget(&self) -> Duration {
        self.load_budget.min(Self::MAX_LOAD_BUDGET)
    }

    /// Defaults overridden by `MARATHON_DEBOUNCE_MS` and
    /// `MARATHON_LOAD_BUDGET_MS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMillis` for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(debounce) = millis_var("MARATHON_DEBOUNCE_MS")? {
            config.debounce = debounce;
        }
        if let Some(budget) = millis_var("MARATHON_LOAD_BUDGET_MS")? {
            config.load_budget = budget;
        }
        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn millis_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    non_empty_var(name)
        .map(|raw| parse_millis(name, &raw))
        .transpose()
}

pub(crate) fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis {
            var,
            raw: raw.to_string(),
        })
}
