//! pagevitals.trace.v1 schema definition
//!
//! A trace is an ordered list of host events: entries entering the
//! performance timeline, lifecycle signals and scheduler steps. Replaying it
//! against a [`crate::session::VitalsSession`] reproduces a page session
//! deterministically.

use crate::types::{EntryCategory, NavigationTiming, RawEntry};
use serde::{Deserialize, Serialize};

/// Current trace schema version
pub const TRACE_SCHEMA_VERSION: &str = "pagevitals.trace.v1";

/// One step of a recorded page session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Navigation timing record becomes available
    Navigation { timing: NavigationTiming },
    /// Entry added to the performance timeline; delivered at once unless `queued`
    Entry {
        entry: RawEntry,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        queued: bool,
    },
    /// Deliver queued entries to observers
    Deliver,
    Hidden {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<f64>,
    },
    Visible {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<f64>,
    },
    PrerenderingChange,
    /// Page shown again from the back/forward cache
    Restore {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<f64>,
    },
    Load,
    KeyDown,
    Click,
    /// Move the clock forward
    Advance { ms: f64 },
    /// The host went idle
    Idle,
    /// An animation frame
    Frame,
    /// Run every pending task
    Flush,
}

impl TraceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TraceEvent::Navigation { .. } => "navigation",
            TraceEvent::Entry { .. } => "entry",
            TraceEvent::Deliver => "deliver",
            TraceEvent::Hidden { .. } => "hidden",
            TraceEvent::Visible { .. } => "visible",
            TraceEvent::PrerenderingChange => "prerendering_change",
            TraceEvent::Restore { .. } => "restore",
            TraceEvent::Load => "load",
            TraceEvent::KeyDown => "key_down",
            TraceEvent::Click => "click",
            TraceEvent::Advance { .. } => "advance",
            TraceEvent::Idle => "idle",
            TraceEvent::Frame => "frame",
            TraceEvent::Flush => "flush",
        }
    }

    /// Timestamp carried by lifecycle events, if any
    pub fn at(&self) -> Option<f64> {
        match self {
            TraceEvent::Hidden { at } | TraceEvent::Visible { at } | TraceEvent::Restore { at } => {
                *at
            }
            _ => None,
        }
    }

    /// Entry shorthand, delivered immediately
    pub fn entry(entry: RawEntry) -> Self {
        TraceEvent::Entry {
            entry,
            queued: false,
        }
    }

    /// Entry shorthand, left queued until the next deliver or drain
    pub fn queued(entry: RawEntry) -> Self {
        TraceEvent::Entry {
            entry,
            queued: true,
        }
    }

    /// Check the event on its own (ordering is checked by the adapter)
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TraceEvent::Navigation { timing } => validate_navigation(timing),
            TraceEvent::Entry { entry, .. } => validate_entry(entry),
            TraceEvent::Advance { ms } => check_time("ms", *ms),
            other => match other.at() {
                Some(at) => check_time("at", at),
                None => Ok(()),
            },
        }
    }
}

fn check_time(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidNumber {
            field: field.to_string(),
            value,
        })
    }
}

fn check_optional(field: &str, value: Option<f64>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| check_time(field, v))
}

fn require(
    category: EntryCategory,
    field: &'static str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check_time(field, v),
        None => Err(ValidationError::MissingField { category, field }),
    }
}

fn validate_entry(entry: &RawEntry) -> Result<(), ValidationError> {
    check_time("start_time", entry.start_time)?;
    check_optional("duration", entry.duration)?;
    check_optional("value", entry.value)?;
    check_optional("processing_start", entry.processing_start)?;

    match entry.category {
        EntryCategory::LayoutShift => require(entry.category, "value", entry.value),
        EntryCategory::Event | EntryCategory::FirstInput => {
            require(entry.category, "duration", entry.duration)
        }
        EntryCategory::Paint if entry.name.is_none() => Err(ValidationError::MissingField {
            category: entry.category,
            field: "name",
        }),
        EntryCategory::Navigation => Err(ValidationError::MisplacedNavigation),
        _ => Ok(()),
    }
}

fn validate_navigation(nav: &NavigationTiming) -> Result<(), ValidationError> {
    let fields = [
        ("start_time", nav.start_time),
        ("domain_lookup_start", nav.domain_lookup_start),
        ("domain_lookup_end", nav.domain_lookup_end),
        ("connect_start", nav.connect_start),
        ("connect_end", nav.connect_end),
        ("response_start", nav.response_start),
        ("response_end", nav.response_end),
        ("dom_content_loaded_event_end", nav.dom_content_loaded_event_end),
        ("load_event_end", nav.load_event_end),
    ];
    for (field, value) in fields {
        check_time(field, value)?;
    }
    check_optional("activation_start", nav.activation_start)
}

/// Trace validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field {field} must be a finite, non-negative number (got {value})")]
    InvalidNumber { field: String, value: f64 },

    #[error("{category} entry is missing {field}")]
    MissingField {
        category: EntryCategory,
        field: &'static str,
    },

    #[error("Navigation timing must use a navigation event, not an entry")]
    MisplacedNavigation,

    #[error("Timestamp {at} is earlier than the previous timestamp {previous}")]
    TimeWentBackwards { at: f64, previous: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tagged_serialization() {
        let event = TraceEvent::queued(RawEntry::layout_shift(120.0, 0.04, false));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "entry");
        assert_eq!(json["queued"], true);
        assert_eq!(json["entry"]["category"], "layout-shift");

        let hidden: TraceEvent = serde_json::from_str(r#"{"type":"hidden","at":900}"#).unwrap();
        assert_eq!(hidden, TraceEvent::Hidden { at: Some(900.0) });
        let key: TraceEvent = serde_json::from_str(r#"{"type":"key_down"}"#).unwrap();
        assert_eq!(key.kind(), "key_down");
    }

    #[test]
    fn test_entry_defaults_to_delivered() {
        let event: TraceEvent = serde_json::from_str(
            r#"{"type":"entry","entry":{"category":"largest-contentful-paint","start_time":800}}"#,
        )
        .unwrap();
        assert_eq!(event, TraceEvent::entry(RawEntry::largest_paint(800.0)));
    }

    #[test]
    fn test_validate_entry_shapes() {
        assert!(TraceEvent::entry(RawEntry::layout_shift(1.0, 0.1, false))
            .validate()
            .is_ok());

        let mut shift = RawEntry::layout_shift(1.0, 0.1, false);
        shift.value = None;
        assert_eq!(
            TraceEvent::entry(shift).validate(),
            Err(ValidationError::MissingField {
                category: EntryCategory::LayoutShift,
                field: "value"
            })
        );

        let mut paint = RawEntry::paint("first-paint", 10.0);
        paint.name = None;
        assert!(TraceEvent::entry(paint).validate().is_err());

        let mut event = RawEntry::interaction(1, 10.0, 80.0);
        event.duration = Some(f64::NAN);
        assert!(matches!(
            TraceEvent::entry(event).validate(),
            Err(ValidationError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_validate_times() {
        assert!(TraceEvent::Advance { ms: 16.0 }.validate().is_ok());
        assert!(TraceEvent::Advance { ms: -1.0 }.validate().is_err());
        assert!(TraceEvent::Restore {
            at: Some(f64::INFINITY)
        }
        .validate()
        .is_err());
        assert!(TraceEvent::Navigation {
            timing: NavigationTiming {
                response_start: -5.0,
                ..Default::default()
            }
        }
        .validate()
        .is_err());
    }
}
