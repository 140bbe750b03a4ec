//! Time to first byte

use crate::activation::{activation_offset, since_activation};
use crate::error::VitalsError;
use crate::finalize::{double_animation_frame, when_loaded};
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::store::MetricSlot;
use crate::types::round_ms;
use std::cell::Cell;
use std::rc::Rc;

/// TTFB module bound to a page session.
///
/// Reads the navigation record once, after load; a cache restore redefines
/// the value as the time from the restore to the next painted frame.
pub struct TimeToFirstByteMetric {
    slot: Rc<MetricSlot>,
    active: Rc<Cell<bool>>,
    listeners: ListenerSet,
}

impl TimeToFirstByteMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        let slot = Rc::new(slot);
        let active = Rc::new(Cell::new(true));

        let read_slot = Rc::clone(&slot);
        let read_active = Rc::clone(&active);
        let read_ctx = ctx.clone();
        when_loaded(&ctx.host, move || {
            if !read_active.get() {
                return;
            }
            match read_ctx.host.entries.navigation_timing() {
                Some(nav) => {
                    let offset = activation_offset(Some(&nav));
                    read_slot.report(round_ms(since_activation(nav.response_start, offset)));
                }
                None => read_ctx.debug_warn(
                    "TTFB",
                    &VitalsError::MissingData("navigation timing unavailable".to_string()),
                ),
            }
        });

        let listeners = ListenerSet::new(&ctx.host.lifecycle);
        let host = ctx.host.clone();
        let restore_slot = Rc::clone(&slot);
        let restore_active = Rc::clone(&active);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |restored_at| {
            restore_slot.clear();
            let slot = Rc::clone(&restore_slot);
            let active = Rc::clone(&restore_active);
            let clock = host.clone();
            double_animation_frame(&host, move || {
                if active.get() {
                    slot.report(round_ms(clock.now() - restored_at));
                }
            });
        }));

        Ok(Self {
            slot,
            active,
            listeners,
        })
    }

    pub fn value(&self) -> Option<f64> {
        self.slot.get()
    }
}

impl PageMetric for TimeToFirstByteMetric {
    fn name(&self) -> &'static str {
        "TTFB"
    }

    fn stop(&self) {
        self.active.set(false);
        self.listeners.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::Harness;
    use crate::types::{MetricName, NavigationTiming};

    fn start(h: &Harness) -> TimeToFirstByteMetric {
        TimeToFirstByteMetric::start(&h.ctx, h.store.claim(MetricName::Ttfb).unwrap()).unwrap()
    }

    fn navigation(response_start: f64, activation_start: Option<f64>) -> NavigationTiming {
        NavigationTiming {
            response_start,
            activation_start,
            ..Default::default()
        }
    }

    #[test]
    fn test_reads_after_load() {
        let h = Harness::new();
        h.host()
            .entries
            .set_navigation_timing(navigation(182.7, None));
        let metric = start(&h);
        h.scheduler.run_due();
        assert_eq!(metric.value(), None);

        h.host().lifecycle.complete_load();
        h.scheduler.run_due();
        assert_eq!(h.recorder.values(MetricName::Ttfb), vec![183.0]);
    }

    #[test]
    fn test_prerendered_page_clamps_at_zero() {
        let h = Harness::new();
        h.host()
            .entries
            .set_navigation_timing(navigation(120.0, Some(400.0)));
        h.host().lifecycle.complete_load();
        let metric = start(&h);
        h.scheduler.run_due();
        assert_eq!(metric.value(), Some(0.0));
    }

    #[test]
    fn test_missing_navigation_record_leaves_value_unset() {
        let h = Harness::new();
        h.host().lifecycle.complete_load();
        let metric = start(&h);
        h.scheduler.flush();
        assert_eq!(metric.value(), None);
        assert!(h.recorder.reports().is_empty());
    }

    #[test]
    fn test_cache_restore_measures_elapsed_time() {
        let h = Harness::new();
        h.host()
            .entries
            .set_navigation_timing(navigation(90.0, None));
        h.host().lifecycle.complete_load();
        let metric = start(&h);
        h.scheduler.run_due();

        h.scheduler.advance_to(10_000.0);
        h.host().lifecycle.restore_from_cache(10_000.0);
        assert_eq!(metric.value(), None);
        h.scheduler.advance(16.0);
        h.scheduler.run_animation_frame();
        h.scheduler.advance(16.0);
        h.scheduler.run_animation_frame();
        assert_eq!(h.recorder.values(MetricName::Ttfb), vec![90.0, 32.0]);
    }

    #[test]
    fn test_stop_before_load() {
        let h = Harness::new();
        h.host()
            .entries
            .set_navigation_timing(navigation(90.0, None));
        let metric = start(&h);
        metric.stop();
        h.host().lifecycle.complete_load();
        h.scheduler.flush();
        assert_eq!(metric.value(), None);
    }
}
