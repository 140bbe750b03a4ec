//! First-hidden-time tracking
//!
//! Paint and input metrics only count entries that happened while the page was
//! still visible. [`VisibilityTracker`] records the first moment the page went
//! hidden and never forgets it, not even across a back/forward cache restore.

use crate::lifecycle::{PageLifecycle, PageSignal, SignalKind};
use crate::types::NEVER_HIDDEN;
use std::cell::Cell;
use std::rc::Rc;

/// Records when the page first became hidden.
///
/// Construct one per page session and share it by reference.
pub struct VisibilityTracker {
    first_hidden_time: Rc<Cell<f64>>,
}

impl VisibilityTracker {
    /// Start tracking; a page that is already hidden counts as hidden since 0
    pub fn new(lifecycle: &PageLifecycle) -> Self {
        let initial = if lifecycle.is_hidden() { 0.0 } else { NEVER_HIDDEN };
        let first_hidden_time = Rc::new(Cell::new(initial));

        let cell = Rc::clone(&first_hidden_time);
        lifecycle.listen(SignalKind::VisibilityChange, move |signal, state| {
            if let PageSignal::VisibilityChange { timestamp, .. } = signal {
                if state.hidden && cell.get() == NEVER_HIDDEN {
                    tracing::debug!(first_hidden_time = *timestamp, "page hidden for the first time");
                    cell.set(*timestamp);
                }
            }
        });

        let cell = Rc::clone(&first_hidden_time);
        lifecycle.listen(SignalKind::PrerenderingChange, move |_, state| {
            if state.hidden && cell.get() == NEVER_HIDDEN {
                cell.set(0.0);
            }
        });

        Self { first_hidden_time }
    }

    /// Milliseconds since navigation start, or [`NEVER_HIDDEN`]
    pub fn first_hidden_time(&self) -> f64 {
        self.first_hidden_time.get()
    }

    pub fn has_been_hidden(&self) -> bool {
        self.first_hidden_time.get() != NEVER_HIDDEN
    }

    /// Whether something that happened at `start_time` was seen while visible
    pub fn was_visible_at(&self, start_time: f64) -> bool {
        start_time < self.first_hidden_time.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::PageState;

    #[test]
    fn test_never_hidden_by_default() {
        let lifecycle = PageLifecycle::new();
        let tracker = VisibilityTracker::new(&lifecycle);
        assert_eq!(tracker.first_hidden_time(), f64::INFINITY);
        assert!(!tracker.has_been_hidden());
        assert!(tracker.was_visible_at(1.0e9));
    }

    #[test]
    fn test_hidden_at_construction() {
        let lifecycle = PageLifecycle::with_state(PageState {
            hidden: true,
            load_complete: false,
        });
        let tracker = VisibilityTracker::new(&lifecycle);
        assert_eq!(tracker.first_hidden_time(), 0.0);
        assert!(!tracker.was_visible_at(0.0));
    }

    #[test]
    fn test_first_hide_wins() {
        let lifecycle = PageLifecycle::new();
        let tracker = VisibilityTracker::new(&lifecycle);

        lifecycle.show(100.0);
        assert!(!tracker.has_been_hidden());

        lifecycle.hide(1500.0);
        lifecycle.show(2000.0);
        lifecycle.hide(3000.0);
        assert_eq!(tracker.first_hidden_time(), 1500.0);

        lifecycle.restore_from_cache(4000.0);
        assert_eq!(tracker.first_hidden_time(), 1500.0);
    }

    #[test]
    fn test_prerendering_change_only_fills_unset_value() {
        let lifecycle = PageLifecycle::new();
        let tracker = VisibilityTracker::new(&lifecycle);

        lifecycle.dispatch(PageSignal::PrerenderingChange);
        assert!(!tracker.has_been_hidden());

        lifecycle.hide(250.0);
        lifecycle.dispatch(PageSignal::PrerenderingChange);
        assert_eq!(tracker.first_hidden_time(), 250.0);
    }
}
