//! Prerender activation offset

use crate::observer::EntrySource;
use crate::types::NavigationTiming;

/// Time at which a prerendered page was activated, 0 for regular navigations
/// or when the navigation record is unavailable.
pub fn activation_start(entries: &EntrySource) -> f64 {
    activation_offset(entries.navigation_timing().as_ref())
}

pub fn activation_offset(navigation: Option<&NavigationTiming>) -> f64 {
    navigation
        .and_then(|nav| nav.activation_start)
        .filter(|start| !start.is_nan())
        .unwrap_or(0.0)
}

/// Subtract the activation offset, clamping at zero
pub fn since_activation(timestamp: f64, activation_start: f64) -> f64 {
    (timestamp - activation_start).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_navigation_record() {
        let entries = EntrySource::new();
        assert_eq!(activation_start(&entries), 0.0);
    }

    #[test]
    fn test_regular_navigation() {
        let entries = EntrySource::new();
        entries.set_navigation_timing(NavigationTiming::default());
        assert_eq!(activation_start(&entries), 0.0);
    }

    #[test]
    fn test_prerendered_navigation() {
        let entries = EntrySource::new();
        entries.set_navigation_timing(NavigationTiming {
            activation_start: Some(850.0),
            ..Default::default()
        });
        assert_eq!(activation_start(&entries), 850.0);
        assert_eq!(since_activation(1000.0, 850.0), 150.0);
        assert_eq!(since_activation(800.0, 850.0), 0.0);
    }

    #[test]
    fn test_nan_activation_is_ignored() {
        let nav = NavigationTiming {
            activation_start: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(activation_offset(Some(&nav)), 0.0);
    }
}
