//! First contentful paint

use crate::activation::{activation_start, since_activation};
use crate::error::VitalsError;
use crate::finalize::double_animation_frame;
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::observer::{ObserveOptions, Subscription};
use crate::store::MetricSlot;
use crate::types::{round_ms, EntryCategory, RawEntry, FIRST_CONTENTFUL_PAINT};
use std::cell::OnceCell;
use std::rc::{Rc, Weak};

/// FCP module bound to a page session.
///
/// Single-shot: the first `first-contentful-paint` entry ends the subscription,
/// whether or not it was counted.
pub struct FirstContentfulPaintMetric {
    slot: Rc<MetricSlot>,
    subscription: Rc<Subscription>,
    listeners: ListenerSet,
}

impl FirstContentfulPaintMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        let slot = Rc::new(slot);
        let own: Rc<OnceCell<Weak<Subscription>>> = Rc::new(OnceCell::new());

        let subscription = {
            let slot = Rc::clone(&slot);
            let visibility = Rc::clone(&ctx.visibility);
            let source = Rc::downgrade(&ctx.host.entries);
            let own = Rc::clone(&own);
            Rc::new(ctx.host.entries.observer(move |entries: Vec<RawEntry>| {
                let Some(entry) = entries
                    .iter()
                    .find(|e| e.name.as_deref() == Some(FIRST_CONTENTFUL_PAINT))
                else {
                    return;
                };
                if visibility.was_visible_at(entry.start_time) {
                    let activation = source
                        .upgrade()
                        .map(|source| activation_start(&source))
                        .unwrap_or(0.0);
                    slot.report(round_ms(since_activation(entry.start_time, activation)));
                }
                if let Some(sub) = own.get().and_then(Weak::upgrade) {
                    sub.disconnect();
                }
            }))
        };
        // Freshly created, so the cell is still empty
        own.set(Rc::downgrade(&subscription)).ok();
        subscription.observe(EntryCategory::Paint, ObserveOptions::buffered())?;

        let listeners = ListenerSet::new(&ctx.host.lifecycle);
        let host = ctx.host.clone();
        let restore_slot = Rc::clone(&slot);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |restored_at| {
            restore_slot.clear();
            let slot = Rc::clone(&restore_slot);
            let clock = host.clone();
            double_animation_frame(&host, move || {
                slot.report(round_ms(clock.now() - restored_at));
            });
        }));

        Ok(Self {
            slot,
            subscription,
            listeners,
        })
    }

    pub fn value(&self) -> Option<f64> {
        self.slot.get()
    }

    /// Whether the paint subscription is still waiting for its entry
    pub fn is_observing(&self) -> bool {
        self.subscription.is_connected()
    }
}

impl PageMetric for FirstContentfulPaintMetric {
    fn name(&self) -> &'static str {
        "FCP"
    }

    fn stop(&self) {
        self.subscription.disconnect();
        self.listeners.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::Harness;
    use crate::types::{MetricName, NavigationTiming};

    fn start(h: &Harness) -> FirstContentfulPaintMetric {
        FirstContentfulPaintMetric::start(&h.ctx, h.store.claim(MetricName::Fcp).unwrap()).unwrap()
    }

    #[test]
    fn test_reports_first_contentful_paint_once() {
        let h = Harness::new();
        let metric = start(&h);

        h.host().entries.emit(RawEntry::paint("first-paint", 300.0));
        h.host().entries.deliver();
        assert!(metric.is_observing());
        assert_eq!(metric.value(), None);

        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 412.6));
        h.host().entries.deliver();
        assert_eq!(h.recorder.values(MetricName::Fcp), vec![413.0]);
        assert!(!metric.is_observing());

        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 900.0));
        h.host().entries.deliver();
        assert_eq!(h.recorder.values(MetricName::Fcp), vec![413.0]);
    }

    #[test]
    fn test_buffered_entry_is_replayed() {
        let h = Harness::new();
        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 250.0));
        let _metric = start(&h);

        h.host().entries.deliver();
        assert_eq!(h.store.get(MetricName::Fcp), Some(250.0));
    }

    #[test]
    fn test_paint_after_hidden_is_ignored_but_stops_observing() {
        let h = Harness::new();
        let metric = start(&h);
        h.host().lifecycle.hide(200.0);

        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 350.0));
        h.host().entries.deliver();
        assert_eq!(metric.value(), None);
        assert!(!metric.is_observing());
    }

    #[test]
    fn test_activation_offset_clamps_at_zero() {
        let h = Harness::new();
        h.host().entries.set_navigation_timing(NavigationTiming {
            activation_start: Some(500.0),
            ..Default::default()
        });
        let _metric = start(&h);

        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 420.0));
        h.host().entries.deliver();
        assert_eq!(h.recorder.values(MetricName::Fcp), vec![0.0]);
    }

    #[test]
    fn test_cache_restore_clears_then_measures_next_frame() {
        let h = Harness::new();
        let metric = start(&h);
        h.host()
            .entries
            .emit(RawEntry::paint(FIRST_CONTENTFUL_PAINT, 400.0));
        h.host().entries.deliver();

        h.scheduler.advance_to(8000.0);
        h.host().lifecycle.restore_from_cache(8000.0);
        assert_eq!(metric.value(), None);

        h.scheduler.run_animation_frame();
        h.scheduler.advance(12.0);
        h.scheduler.run_animation_frame();
        assert_eq!(h.recorder.values(MetricName::Fcp), vec![400.0, 12.0]);
    }
}
