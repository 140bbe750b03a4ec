//! Largest contentful paint
//!
//! Candidates live-update the record while the page loads. The value is
//! finalized once: on the first key press or click, or when the page turns
//! hidden, whichever comes first, deferred to idle time.

use crate::activation::{activation_start, since_activation};
use crate::error::VitalsError;
use crate::finalize::{double_animation_frame, when_idle_or_hidden, FinalizeOnce};
use crate::lifecycle::SignalKind;
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::observer::{ObserveOptions, Subscription};
use crate::store::MetricSlot;
use crate::types::{round_ms, EntryCategory, RawEntry};
use std::cell::Cell;
use std::rc::Rc;

struct PaintState {
    value: Cell<f64>,
    slot: MetricSlot,
}

impl PaintState {
    fn report(&self) {
        let value = self.value.get();
        if value > 0.0 {
            self.slot.report(value);
        }
    }
}

/// LCP module bound to a page session
pub struct LargestContentfulPaintMetric {
    state: Rc<PaintState>,
    subscription: Rc<Subscription>,
    finalize: FinalizeOnce,
    listeners: ListenerSet,
}

impl LargestContentfulPaintMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        if !ctx.host.entries.supports(EntryCategory::LargestContentfulPaint) {
            return Err(VitalsError::UnsupportedCapability(
                EntryCategory::LargestContentfulPaint,
            ));
        }

        let state = Rc::new(PaintState {
            value: Cell::new(0.0),
            slot,
        });

        let handle: Rc<dyn Fn(Vec<RawEntry>)> = {
            let state = Rc::clone(&state);
            let visibility = Rc::clone(&ctx.visibility);
            let entries_source = Rc::downgrade(&ctx.host.entries);
            Rc::new(move |entries: Vec<RawEntry>| {
                let activation = entries_source
                    .upgrade()
                    .map(|source| activation_start(&source))
                    .unwrap_or(0.0);
                for entry in entries {
                    if !visibility.was_visible_at(entry.start_time) {
                        continue;
                    }
                    let value = round_ms(since_activation(entry.start_time, activation));
                    if value > state.value.get() {
                        state.value.set(value);
                        state.slot.update(value);
                    }
                }
            })
        };

        let observer_handle = Rc::clone(&handle);
        let subscription = Rc::new(
            ctx.host
                .entries
                .observer(move |entries| observer_handle(entries)),
        );
        subscription.observe(EntryCategory::LargestContentfulPaint, ObserveOptions::buffered())?;

        let finalize = {
            let host = ctx.host.clone();
            let policy = ctx.idle_policy();
            let sub = Rc::clone(&subscription);
            let state = Rc::clone(&state);
            FinalizeOnce::new(move || {
                when_idle_or_hidden(&host, policy, move || {
                    handle(sub.take_records());
                    sub.disconnect();
                    tracing::debug!(value = state.value.get(), "largest contentful paint finalized");
                    state.report();
                });
            })
        };

        let listeners = ListenerSet::new(&ctx.host.lifecycle);
        for kind in [SignalKind::KeyDown, SignalKind::Click] {
            let finalize = finalize.clone();
            listeners.push(ctx.host.lifecycle.listen_once(kind, move |_, _| {
                finalize.run();
            }));
        }
        let on_hidden = finalize.clone();
        listeners.push(ctx.host.lifecycle.on_hidden(move |_| {
            on_hidden.run();
        }));

        let host = ctx.host.clone();
        let restore_state = Rc::clone(&state);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |restored_at| {
            restore_state.value.set(0.0);
            let state = Rc::clone(&restore_state);
            let clock = host.clone();
            double_animation_frame(&host, move || {
                state.value.set(round_ms(clock.now() - restored_at));
                state.report();
            });
        }));

        Ok(Self {
            state,
            subscription,
            finalize,
            listeners,
        })
    }

    /// Largest candidate seen so far
    pub fn value(&self) -> f64 {
        self.state.value.get()
    }

    /// Whether a finalization trigger has fired
    pub fn is_finalizing(&self) -> bool {
        self.finalize.has_run()
    }
}

impl PageMetric for LargestContentfulPaintMetric {
    fn name(&self) -> &'static str {
        "LCP"
    }

    fn stop(&self) {
        self.subscription.disconnect();
        self.listeners.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::PageSignal;
    use crate::metrics::test_support::Harness;
    use crate::observer::EntrySource;
    use crate::scheduler::ManualScheduler;
    use crate::types::{MetricName, NavigationTiming};

    fn start(h: &Harness) -> LargestContentfulPaintMetric {
        LargestContentfulPaintMetric::start(&h.ctx, h.store.claim(MetricName::Lcp).unwrap())
            .unwrap()
    }

    #[test]
    fn test_candidates_live_update_without_reporting() {
        let h = Harness::new();
        let metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(800.0));
        h.host().entries.emit(RawEntry::largest_paint(1200.4));
        h.host().entries.deliver();

        assert_eq!(metric.value(), 1200.0);
        assert_eq!(h.store.get(MetricName::Lcp), Some(1200.0));
        assert_eq!(h.recorder.updates(), 2);
        assert!(h.recorder.reports().is_empty());
    }

    #[test]
    fn test_value_never_shrinks() {
        let h = Harness::new();
        let metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(1500.0));
        h.host().entries.emit(RawEntry::largest_paint(900.0));
        h.host().entries.deliver();
        assert_eq!(metric.value(), 1500.0);
    }

    #[test]
    fn test_key_down_finalizes_at_idle() {
        let h = Harness::new();
        let metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(800.0));
        h.host().entries.deliver();
        h.host().lifecycle.dispatch(PageSignal::KeyDown);
        assert!(metric.is_finalizing());
        assert!(h.recorder.reports().is_empty());

        h.scheduler.run_idle();
        assert_eq!(h.recorder.values(MetricName::Lcp), vec![800.0]);
        assert_eq!(h.host().entries.observer_count(), 0);

        h.host().lifecycle.dispatch(PageSignal::Click);
        h.host().lifecycle.hide(5000.0);
        h.scheduler.flush();
        assert_eq!(h.recorder.values(MetricName::Lcp), vec![800.0]);
    }

    #[test]
    fn test_hidden_finalizes_immediately_and_drains() {
        let h = Harness::new();
        let _metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(640.0));
        h.host().lifecycle.hide(700.0);

        assert_eq!(h.recorder.values(MetricName::Lcp), vec![640.0]);
        assert!(h.scheduler.is_empty());
    }

    #[test]
    fn test_candidates_after_hidden_are_ignored() {
        let h = Harness::new();
        let _metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(2000.0));
        h.host().lifecycle.hide(1000.0);

        assert!(h.recorder.reports().is_empty());
        assert_eq!(h.store.get(MetricName::Lcp), None);
    }

    #[test]
    fn test_activation_offset_is_subtracted() {
        let h = Harness::new();
        h.host().entries.set_navigation_timing(NavigationTiming {
            activation_start: Some(300.0),
            ..Default::default()
        });
        let metric = start(&h);

        h.host().entries.emit(RawEntry::largest_paint(1000.0));
        h.host().entries.emit(RawEntry::largest_paint(250.0));
        h.host().entries.deliver();
        assert_eq!(metric.value(), 700.0);
    }

    #[test]
    fn test_cache_restore_measures_time_to_next_frame() {
        let h = Harness::new();
        let metric = start(&h);
        h.host().entries.emit(RawEntry::largest_paint(900.0));
        h.host().lifecycle.hide(1000.0);

        h.scheduler.advance_to(5000.0);
        h.host().lifecycle.restore_from_cache(5000.0);
        assert_eq!(metric.value(), 0.0);

        h.scheduler.advance(8.0);
        h.scheduler.run_animation_frame();
        h.scheduler.advance(16.4);
        h.scheduler.run_animation_frame();

        assert_eq!(h.recorder.values(MetricName::Lcp), vec![900.0, 24.0]);
    }

    #[test]
    fn test_unsupported_largest_paint() {
        let h = Harness::with(
            ManualScheduler::new(),
            EntrySource::with_supported(&[EntryCategory::Paint]),
        );
        let listeners = h.host().lifecycle.listener_count();
        let result =
            LargestContentfulPaintMetric::start(&h.ctx, h.store.claim(MetricName::Lcp).unwrap());
        assert!(matches!(
            result,
            Err(VitalsError::UnsupportedCapability(
                EntryCategory::LargestContentfulPaint
            ))
        ));
        assert_eq!(h.host().lifecycle.listener_count(), listeners);
    }
}
