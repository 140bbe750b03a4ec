//! Parsing and validation of pagevitals.trace.v1 input

use crate::error::VitalsError;
use crate::schema::trace::*;

/// Parses traces from JSON arrays or NDJSON
pub struct TraceAdapter;

impl TraceAdapter {
    /// Parse a JSON string containing an array of trace events
    pub fn parse_array(json: &str) -> Result<Vec<TraceEvent>, VitalsError> {
        let events: Vec<TraceEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing trace events
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<TraceEvent>, VitalsError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(VitalsError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse either format, picking the array form when the input starts with `[`
    pub fn parse(input: &str) -> Result<Vec<TraceEvent>, VitalsError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Validate a batch of events, including that lifecycle timestamps never go backwards
    pub fn validate_events(events: &[TraceEvent]) -> Vec<ValidationResult> {
        let mut previous: Option<f64> = None;
        events
            .iter()
            .enumerate()
            .filter_map(|(index, event)| {
                let mut error = event.validate().err();
                if let Some(at) = event.at() {
                    match previous {
                        Some(prev) if at < prev => {
                            error = error.or(Some(ValidationError::TimeWentBackwards {
                                at,
                                previous: prev,
                            }));
                        }
                        _ => previous = Some(at),
                    }
                }
                error.map(|error| ValidationResult {
                    index,
                    kind: event.kind(),
                    error,
                })
            })
            .collect()
    }

    /// Parse and validate, failing on the first invalid event
    pub fn load(input: &str) -> Result<Vec<TraceEvent>, VitalsError> {
        let events = Self::parse(input)?;
        if let Some(first) = Self::validate_events(&events).into_iter().next() {
            return Err(VitalsError::InvalidTraceEvent(format!(
                "event {} ({}): {}",
                first.index, first.kind, first.error
            )));
        }
        Ok(events)
    }
}

/// A failed event in a validated batch
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub kind: &'static str,
    pub error: ValidationError,
}
