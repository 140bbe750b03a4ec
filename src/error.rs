//! Error types for pagevitals

use crate::types::{EntryCategory, MetricName};
use thiserror::Error;

/// Errors that can occur while observing or computing page metrics
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("Unsupported entry category: {0}")]
    UnsupportedCapability(EntryCategory),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Metric {0} already has a writer")]
    DuplicateWriter(MetricName),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid trace event: {0}")]
    InvalidTraceEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VitalsError::UnsupportedCapability(EntryCategory::LargestContentfulPaint);
        assert_eq!(
            err.to_string(),
            "Unsupported entry category: largest-contentful-paint"
        );

        let err = VitalsError::DuplicateWriter(MetricName::Cls);
        assert_eq!(err.to_string(), "Metric CLS already has a writer");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: VitalsError = json_err.into();
        assert!(matches!(err, VitalsError::JsonError(_)));
    }
}
