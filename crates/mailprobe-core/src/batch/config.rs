//! Batch configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::stop::StopCondition;
use crate::check::Protocol;
use crate::{Error, Result};

/// Pool used when a batch does not name one.
pub const DEFAULT_POOL_NAME: &str = "checks";

/// Reachability targets for SOCKS batches.
pub const DEFAULT_SOCKS_TARGETS: &[&str] = &["smtp.gmail.com:587", "smtp.office365.com:587"];

/// Options recognised by [`BatchOrchestrator::start`](super::BatchOrchestrator::start).
///
/// Deserializes from JSON with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// What the batch verifies.
    pub protocol: Protocol,
    /// Per-candidate connect and auth timeout.
    pub timeout_seconds: u64,
    /// Wall-clock limit.
    pub max_duration_seconds: Option<u64>,
    /// Cap on submitted tasks.
    pub max_attempts: Option<u64>,
    /// Error-rate stop rule.
    pub max_error_rate_pct: Option<f64>,
    /// Success-rate stop rule.
    pub min_success_rate_pct: Option<f64>,
    /// Completions required before rate rules apply.
    pub min_sample_size: u64,
    /// Pool size when this batch creates the pool.
    pub max_concurrent: Option<usize>,
    /// Pool to run in.
    pub pool_name: String,
    /// Stop rules are checked after this many completions.
    pub evaluate_every: u64,
    /// Period of the duration check.
    pub check_interval_ms: u64,
    /// `host:port` targets for SOCKS batches.
    pub socks_targets: Vec<String>,
    /// Name sent in EHLO.
    pub ehlo_name: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Smtp,
            timeout_seconds: 10,
            max_duration_seconds: None,
            max_attempts: None,
            max_error_rate_pct: None,
            min_success_rate_pct: None,
            min_sample_size: 10,
            max_concurrent: None,
            pool_name: DEFAULT_POOL_NAME.to_string(),
            evaluate_every: 1,
            check_interval_ms: 1000,
            socks_targets: DEFAULT_SOCKS_TARGETS
                .iter()
                .map(|target| (*target).to_string())
                .collect(),
            ehlo_name: "localhost".to_string(),
        }
    }
}

impl BatchConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(Error::Config("timeout_seconds must be positive".into()));
        }
        if self.evaluate_every == 0 {
            return Err(Error::Config("evaluate_every must be positive".into()));
        }
        if self.check_interval_ms == 0 {
            return Err(Error::Config("check_interval_ms must be positive".into()));
        }
        if self.max_concurrent == Some(0) {
            return Err(Error::Config("max_concurrent must be positive".into()));
        }
        if self.pool_name.trim().is_empty() {
            return Err(Error::Config("pool_name must not be empty".into()));
        }
        for (name, pct) in [
            ("max_error_rate_pct", self.max_error_rate_pct),
            ("min_success_rate_pct", self.min_success_rate_pct),
        ] {
            if pct.is_some_and(|p| !(0.0..=100.0).contains(&p)) {
                return Err(Error::Config(format!("{name} must be within 0..=100")));
            }
        }
        if self.protocol == Protocol::Socks {
            let targets = self.parsed_socks_targets()?;
            if targets.is_empty() {
                return Err(Error::Config("socks_targets must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Per-candidate timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Duration check period.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Stop rules of this batch.
    #[must_use]
    pub const fn stop_condition(&self) -> StopCondition {
        StopCondition {
            max_duration_seconds: self.max_duration_seconds,
            max_attempts: self.max_attempts,
            max_error_rate_pct: self.max_error_rate_pct,
            min_success_rate_pct: self.min_success_rate_pct,
            min_sample_size: self.min_sample_size,
        }
    }

    /// Splits `socks_targets` into host and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an entry without a valid port.
    pub fn parsed_socks_targets(&self) -> Result<Vec<(String, u16)>> {
        self.socks_targets
            .iter()
            .map(|target| {
                target
                    .rsplit_once(':')
                    .and_then(|(host, port)| {
                        let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
                        (!host.is_empty()).then(|| (host.to_ascii_lowercase(), port))
                    })
                    .ok_or_else(|| Error::Config(format!("invalid socks target: {target}")))
            })
            .collect()
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug, Clone, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl From<BatchConfig> for BatchConfigBuilder {
    /// Starts from an existing configuration, e.g. one loaded from JSON.
    fn from(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl BatchConfigBuilder {
    /// Sets the protocol.
    #[must_use]
    pub const fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Sets the per-candidate timeout.
    #[must_use]
    pub const fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn max_duration_seconds(mut self, seconds: u64) -> Self {
        self.config.max_duration_seconds = Some(seconds);
        self
    }

    /// Caps the number of tasks.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u64) -> Self {
        self.config.max_attempts = Some(attempts);
        self
    }

    /// Sets the error-rate stop rule.
    #[must_use]
    pub const fn max_error_rate_pct(mut self, pct: f64) -> Self {
        self.config.max_error_rate_pct = Some(pct);
        self
    }

    /// Sets the success-rate stop rule.
    #[must_use]
    pub const fn min_success_rate_pct(mut self, pct: f64) -> Self {
        self.config.min_success_rate_pct = Some(pct);
        self
    }

    /// Sets the sample size rate rules wait for.
    #[must_use]
    pub const fn min_sample_size(mut self, size: u64) -> Self {
        self.config.min_sample_size = size;
        self
    }

    /// Applies every rule of `condition`.
    #[must_use]
    pub fn stop_condition(mut self, condition: StopCondition) -> Self {
        self.config.max_duration_seconds = condition.max_duration_seconds;
        self.config.max_attempts = condition.max_attempts;
        self.config.max_error_rate_pct = condition.max_error_rate_pct;
        self.config.min_success_rate_pct = condition.min_success_rate_pct;
        self.config.min_sample_size = condition.min_sample_size;
        self
    }

    /// Sets the pool size used if this batch creates the pool.
    #[must_use]
    pub const fn max_concurrent(mut self, workers: usize) -> Self {
        self.config.max_concurrent = Some(workers);
        self
    }

    /// Sets the pool name.
    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.config.pool_name = name.into();
        self
    }

    /// Sets how often stop rules are evaluated.
    #[must_use]
    pub const fn evaluate_every(mut self, completions: u64) -> Self {
        self.config.evaluate_every = completions;
        self
    }

    /// Sets the duration check period.
    #[must_use]
    pub const fn check_interval_ms(mut self, millis: u64) -> Self {
        self.config.check_interval_ms = millis;
        self
    }

    /// Replaces the SOCKS reachability targets.
    #[must_use]
    pub fn socks_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.socks_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn ehlo_name(mut self, name: impl Into<String>) -> Self {
        self.config.ehlo_name = name.into();
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an option is out of range.
    pub fn build(self) -> Result<BatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let config = BatchConfig::from_json("{}").unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.pool_name, DEFAULT_POOL_NAME);
        assert_eq!(config.stop_condition(), StopCondition::default());
    }

    #[test]
    fn partial_json() {
        let config = BatchConfig::from_json(
            r#"{"protocol": "imap", "max_error_rate_pct": 25.5, "max_concurrent": 8}"#,
        )
        .unwrap();
        assert_eq!(config.protocol, Protocol::Imap);
        assert_eq!(config.max_error_rate_pct, Some(25.5));
        assert_eq!(config.max_concurrent, Some(8));
        assert_eq!(config.evaluate_every, 1);
    }

    #[test]
    fn builder() {
        let config = BatchConfig::builder()
            .protocol(Protocol::Socks)
            .socks_targets(["mx.example.com:25"])
            .max_attempts(100)
            .stop_condition(StopCondition::recommended())
            .build()
            .unwrap();
        assert_eq!(
            config.parsed_socks_targets().unwrap(),
            vec![("mx.example.com".to_string(), 25)]
        );
        // stop_condition replaces every rule
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.max_error_rate_pct, Some(10.0));
    }

    #[test]
    fn validation() {
        assert!(BatchConfig::builder().timeout_seconds(0).build().is_err());
        assert!(BatchConfig::builder().evaluate_every(0).build().is_err());
        assert!(BatchConfig::builder().max_error_rate_pct(120.0).build().is_err());
        assert!(BatchConfig::builder().max_concurrent(0).build().is_err());
        assert!(
            BatchConfig::builder()
                .protocol(Protocol::Socks)
                .socks_targets(["no-port"])
                .build()
                .is_err()
        );
        assert!(BatchConfig::from_json(r#"{"protocol": "pop3"}"#).is_err());
    }
}
