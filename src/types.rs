//! Core data types for pagevitals
//!
//! These types describe the entries delivered by the host's performance timeline,
//! the navigation timing record, and the metric record that collaborators read.
//! All timestamps are milliseconds relative to navigation start.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "the page has never been hidden"
pub const NEVER_HIDDEN: f64 = f64::INFINITY;

/// Name of the paint entry that marks first contentful paint
pub const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

/// The fixed set of metrics computed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricName {
    Lcp,
    Fid,
    Cls,
    Fcp,
    Ttfb,
    Inp,
    Dns,
    Tcp,
    Dom,
    Load,
}

impl MetricName {
    pub const ALL: [MetricName; 10] = [
        MetricName::Lcp,
        MetricName::Fid,
        MetricName::Cls,
        MetricName::Fcp,
        MetricName::Ttfb,
        MetricName::Inp,
        MetricName::Dns,
        MetricName::Tcp,
        MetricName::Dom,
        MetricName::Load,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Lcp => "LCP",
            MetricName::Fid => "FID",
            MetricName::Cls => "CLS",
            MetricName::Fcp => "FCP",
            MetricName::Ttfb => "TTFB",
            MetricName::Inp => "INP",
            MetricName::Dns => "DNS",
            MetricName::Tcp => "TCP",
            MetricName::Dom => "DOM",
            MetricName::Load => "LOAD",
        }
    }

    /// Parse a metric name, case-insensitively
    pub fn parse(name: &str) -> Option<MetricName> {
        MetricName::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance timeline entry categories the engine observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryCategory {
    LayoutShift,
    Paint,
    LargestContentfulPaint,
    /// Event timing (interactions)
    Event,
    /// Legacy single first-input entry
    FirstInput,
    Navigation,
}

impl EntryCategory {
    pub const ALL: [EntryCategory; 6] = [
        EntryCategory::LayoutShift,
        EntryCategory::Paint,
        EntryCategory::LargestContentfulPaint,
        EntryCategory::Event,
        EntryCategory::FirstInput,
        EntryCategory::Navigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryCategory::LayoutShift => "layout-shift",
            EntryCategory::Paint => "paint",
            EntryCategory::LargestContentfulPaint => "largest-contentful-paint",
            EntryCategory::Event => "event",
            EntryCategory::FirstInput => "first-input",
            EntryCategory::Navigation => "navigation",
        }
    }

    pub fn parse(name: &str) -> Option<EntryCategory> {
        EntryCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for EntryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry delivered by the performance timeline.
///
/// Immutable once delivered; which optional fields are present depends on the category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub category: EntryCategory,
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Layout shift score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub had_recent_input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When event handlers started running (input entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start: Option<f64>,
}

impl RawEntry {
    fn bare(category: EntryCategory, start_time: f64) -> Self {
        Self {
            category,
            start_time,
            duration: None,
            value: None,
            had_recent_input: None,
            interaction_id: None,
            name: None,
            processing_start: None,
        }
    }

    /// Layout shift with the given score
    pub fn layout_shift(start_time: f64, value: f64, had_recent_input: bool) -> Self {
        Self {
            value: Some(value),
            had_recent_input: Some(had_recent_input),
            ..Self::bare(EntryCategory::LayoutShift, start_time)
        }
    }

    /// Paint timing entry (`first-paint`, `first-contentful-paint`)
    pub fn paint(name: &str, start_time: f64) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::bare(EntryCategory::Paint, start_time)
        }
    }

    /// Largest-contentful-paint candidate
    pub fn largest_paint(start_time: f64) -> Self {
        Self::bare(EntryCategory::LargestContentfulPaint, start_time)
    }

    /// Event timing entry belonging to an interaction
    pub fn interaction(interaction_id: u64, start_time: f64, duration: f64) -> Self {
        Self {
            duration: Some(duration),
            interaction_id: Some(interaction_id),
            ..Self::bare(EntryCategory::Event, start_time)
        }
    }

    /// Legacy first-input entry
    pub fn first_input(start_time: f64, processing_start: f64, duration: f64) -> Self {
        Self {
            duration: Some(duration),
            processing_start: Some(processing_start),
            ..Self::bare(EntryCategory::FirstInput, start_time)
        }
    }

    /// Layout shift score, zero when absent
    pub fn shift_value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    pub fn is_input_driven(&self) -> bool {
        self.had_recent_input.unwrap_or(false)
    }
}

/// Navigation timing record for the current document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationTiming {
    pub start_time: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
    /// Present only for prerendered pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_start: Option<f64>,
}

/// Latest value per metric.
///
/// Each field has exactly one writer; see [`crate::store::MetricStore::claim`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(rename = "LCP", default, skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,
    #[serde(rename = "FID", default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<f64>,
    #[serde(rename = "CLS", default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    #[serde(rename = "FCP", default, skip_serializing_if = "Option::is_none")]
    pub fcp: Option<f64>,
    #[serde(rename = "TTFB", default, skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,
    #[serde(rename = "INP", default, skip_serializing_if = "Option::is_none")]
    pub inp: Option<f64>,
    #[serde(rename = "DNS", default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<f64>,
    #[serde(rename = "TCP", default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<f64>,
    #[serde(rename = "DOM", default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<f64>,
    #[serde(rename = "LOAD", default, skip_serializing_if = "Option::is_none")]
    pub load: Option<f64>,
}

impl MetricsRecord {
    pub fn get(&self, name: MetricName) -> Option<f64> {
        match name {
            MetricName::Lcp => self.lcp,
            MetricName::Fid => self.fid,
            MetricName::Cls => self.cls,
            MetricName::Fcp => self.fcp,
            MetricName::Ttfb => self.ttfb,
            MetricName::Inp => self.inp,
            MetricName::Dns => self.dns,
            MetricName::Tcp => self.tcp,
            MetricName::Dom => self.dom,
            MetricName::Load => self.load,
        }
    }

    pub(crate) fn set(&mut self, name: MetricName, value: Option<f64>) {
        let field = match name {
            MetricName::Lcp => &mut self.lcp,
            MetricName::Fid => &mut self.fid,
            MetricName::Cls => &mut self.cls,
            MetricName::Fcp => &mut self.fcp,
            MetricName::Ttfb => &mut self.ttfb,
            MetricName::Inp => &mut self.inp,
            MetricName::Dns => &mut self.dns,
            MetricName::Tcp => &mut self.tcp,
            MetricName::Dom => &mut self.dom,
            MetricName::Load => &mut self.load,
        };
        *field = value;
    }

    /// Metrics that currently hold a value
    pub fn present(&self) -> Vec<(MetricName, f64)> {
        MetricName::ALL
            .into_iter()
            .filter_map(|name| self.get(name).map(|v| (name, v)))
            .collect()
    }
}

/// One `on_metric` notification as seen by a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub name: MetricName,
    pub value: f64,
}

/// Round half toward positive infinity, matching host `Math.round` semantics
pub fn round_ms(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

/// Round to three decimal places (layout shift scores)
pub fn round_score(value: f64) -> f64 {
    round_ms(value * 1000.0) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name_serialization() {
        let json = serde_json::to_string(&MetricName::Ttfb).unwrap();
        assert_eq!(json, "\"TTFB\"");
        let parsed: MetricName = serde_json::from_str("\"INP\"").unwrap();
        assert_eq!(parsed, MetricName::Inp);
        assert_eq!(MetricName::parse("lcp"), Some(MetricName::Lcp));
        assert_eq!(MetricName::parse("nope"), None);
    }

    #[test]
    fn test_entry_category_serialization() {
        let json = serde_json::to_string(&EntryCategory::LargestContentfulPaint).unwrap();
        assert_eq!(json, "\"largest-contentful-paint\"");
        let parsed: EntryCategory = serde_json::from_str("\"first-input\"").unwrap();
        assert_eq!(parsed, EntryCategory::FirstInput);
        assert_eq!(EntryCategory::parse("layout-shift"), Some(EntryCategory::LayoutShift));
    }

    #[test]
    fn test_raw_entry_defaults() {
        let entry: RawEntry =
            serde_json::from_str(r#"{"category": "layout-shift", "start_time": 12.5}"#).unwrap();
        assert_eq!(entry.shift_value(), 0.0);
        assert!(!entry.is_input_driven());
        assert_eq!(entry.interaction_id, None);
    }

    #[test]
    fn test_metrics_record_serializes_present_fields_only() {
        let mut record = MetricsRecord::default();
        record.set(MetricName::Cls, Some(0.125));
        record.set(MetricName::Ttfb, Some(120.0));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, serde_json::json!({"CLS": 0.125, "TTFB": 120.0}));
        assert_eq!(
            record.present(),
            vec![(MetricName::Cls, 0.125), (MetricName::Ttfb, 120.0)]
        );

        record.set(MetricName::Cls, None);
        assert_eq!(record.get(MetricName::Cls), None);
    }

    #[test]
    fn test_round_ms_matches_host_rounding() {
        assert_eq!(round_ms(2.5), 3.0);
        assert_eq!(round_ms(2.4), 2.0);
        assert_eq!(round_ms(-2.5), -2.0);
        assert_eq!(round_ms(-2.6), -3.0);
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.12345), 0.123);
        assert_eq!(round_score(0.1236), 0.124);
        assert_eq!(round_score(0.0), 0.0);
    }
}
