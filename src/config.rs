//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid configuration.

use crate::error::VitalsError;
use crate::types::MetricName;
use serde::{Deserialize, Serialize};

/// Upper bound for the idle callback before it is forced to run
pub const DEFAULT_IDLE_TIMEOUT_MS: f64 = 500.0;

/// Delay used when the host has no idle callback facility
pub const DEFAULT_FALLBACK_DELAY_MS: f64 = 100.0;

/// Event timing entries shorter than this are not delivered
pub const DEFAULT_INTERACTION_DURATION_THRESHOLD_MS: f64 = 40.0;

/// Configuration for a [`crate::session::VitalsSession`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    /// Emit warnings for unsupported capabilities and missing data
    pub debug: bool,
    /// Metrics to compute
    pub metrics: Vec<MetricName>,
    pub idle_timeout_ms: f64,
    pub fallback_delay_ms: f64,
    pub interaction_duration_threshold_ms: f64,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            debug: false,
            metrics: MetricName::ALL.to_vec(),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            fallback_delay_ms: DEFAULT_FALLBACK_DELAY_MS,
            interaction_duration_threshold_ms: DEFAULT_INTERACTION_DURATION_THRESHOLD_MS,
        }
    }
}

impl VitalsConfig {
    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        let config: VitalsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Restrict computation to the given metrics
    pub fn with_metrics(mut self, metrics: &[MetricName]) -> Self {
        self.metrics = metrics.to_vec();
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout_ms: f64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    pub fn with_fallback_delay(mut self, fallback_delay_ms: f64) -> Self {
        self.fallback_delay_ms = fallback_delay_ms;
        self
    }

    pub fn is_enabled(&self, name: MetricName) -> bool {
        self.metrics.contains(&name)
    }

    pub fn any_enabled(&self, names: &[MetricName]) -> bool {
        names.iter().any(|n| self.is_enabled(*n))
    }

    /// Idle scheduling timings derived from this configuration
    pub fn idle_policy(&self) -> IdlePolicy {
        IdlePolicy {
            idle_timeout_ms: self.idle_timeout_ms,
            fallback_delay_ms: self.fallback_delay_ms,
        }
    }

    pub fn validate(&self) -> Result<(), VitalsError> {
        let timings = [
            ("idle_timeout_ms", self.idle_timeout_ms),
            ("fallback_delay_ms", self.fallback_delay_ms),
            (
                "interaction_duration_threshold_ms",
                self.interaction_duration_threshold_ms,
            ),
        ];
        for (field, value) in timings {
            if !value.is_finite() || value < 0.0 {
                return Err(VitalsError::InvalidConfig(format!(
                    "{} must be a finite, non-negative number (got {})",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

/// Timings for [`crate::finalize::when_idle_or_hidden`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdlePolicy {
    pub idle_timeout_ms: f64,
    pub fallback_delay_ms: f64,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            fallback_delay_ms: DEFAULT_FALLBACK_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VitalsConfig::default();
        assert!(!config.debug);
        assert_eq!(config.metrics.len(), 10);
        assert_eq!(config.idle_timeout_ms, 500.0);
        assert_eq!(config.fallback_delay_ms, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = VitalsConfig::from_json(r#"{"debug": true, "metrics": ["CLS", "INP"]}"#).unwrap();
        assert!(config.debug);
        assert!(config.is_enabled(MetricName::Cls));
        assert!(!config.is_enabled(MetricName::Lcp));
        assert_eq!(config.interaction_duration_threshold_ms, 40.0);
    }

    #[test]
    fn test_from_json_rejects_negative_timing() {
        let result = VitalsConfig::from_json(r#"{"idle_timeout_ms": -1}"#);
        assert!(matches!(result, Err(VitalsError::InvalidConfig(_))));
    }

    #[test]
    fn test_builders() {
        let config = VitalsConfig::default()
            .with_debug(true)
            .with_metrics(&[MetricName::Dns, MetricName::Load])
            .with_idle_timeout(250.0)
            .with_fallback_delay(50.0);
        assert!(config.any_enabled(&[MetricName::Tcp, MetricName::Load]));
        assert!(!config.any_enabled(&[MetricName::Cls]));
        assert_eq!(
            config.idle_policy(),
            IdlePolicy {
                idle_timeout_ms: 250.0,
                fallback_delay_ms: 50.0
            }
        );
    }
}
