//! Interaction to next paint
//!
//! Every interaction keeps the longest duration among its event timing
//! entries. The reported value is a high percentile of those per-interaction
//! maxima, where the rank depends on how many interactions were seen.

use crate::config::IdlePolicy;
use crate::error::VitalsError;
use crate::finalize::{when_idle_or_hidden, FinalizeOnce};
use crate::host::PageHost;
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::observer::{ObserveOptions, Subscription};
use crate::store::MetricSlot;
use crate::types::{round_ms, EntryCategory, RawEntry};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Index into the descending list of interaction durations for `n` interactions
pub fn percentile_rank(n: usize) -> usize {
    if n <= 10 {
        0
    } else if n <= 50 {
        1.min(n - 1)
    } else {
        let rank = (n as f64 * 0.02).ceil() as usize;
        rank.saturating_sub(1)
    }
}

/// Longest observed duration per interaction id
#[derive(Debug, Clone, Default)]
pub struct InteractionTable {
    durations: HashMap<u64, f64>,
}

impl InteractionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `duration` if it is the longest seen for `id`
    pub fn record(&mut self, id: u64, duration: f64) {
        let longest = self.durations.entry(id).or_insert(0.0);
        if duration > *longest {
            *longest = duration;
        }
    }

    /// Record an entry if it belongs to an interaction. Returns whether it did.
    pub fn ingest(&mut self, entry: &RawEntry) -> bool {
        match entry.interaction_id {
            Some(id) if id != 0 => {
                self.record(id, entry.duration.unwrap_or(0.0));
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<f64> {
        self.durations.get(&id).copied()
    }

    pub fn clear(&mut self) {
        self.durations.clear();
    }

    /// Duration at [`percentile_rank`] of the descending duration list
    pub fn percentile(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let mut values: Vec<f64> = self.durations.values().copied().collect();
        values.sort_by(|a, b| b.total_cmp(a));
        values.get(percentile_rank(values.len())).copied()
    }
}

struct InteractionState {
    table: RefCell<InteractionTable>,
    slot: MetricSlot,
    /// Batches still waiting for idle time
    pending: RefCell<Vec<FinalizeOnce>>,
    /// Set while the hidden path drains pending batches; reporting is left to it
    draining: Cell<bool>,
}

impl InteractionState {
    fn ingest(&self, entries: &[RawEntry]) {
        let mut table = self.table.borrow_mut();
        for entry in entries {
            table.ingest(entry);
        }
        tracing::trace!(interactions = table.len(), "interaction table recomputed");
    }

    /// Run every pending batch now without reporting, then report once
    fn drain_and_report(&self, records: &[RawEntry]) {
        self.draining.set(true);
        let pending: Vec<FinalizeOnce> = self.pending.borrow_mut().drain(..).collect();
        for batch in pending {
            batch.run();
        }
        self.draining.set(false);
        self.ingest(records);
        self.report();
    }

    fn report(&self) {
        let value = self.table.borrow().percentile().unwrap_or(0.0);
        if value > 0.0 {
            self.slot.report(round_ms(value));
        }
    }
}

/// Defer a batch to idle time (or the page turning hidden), then recompute
fn schedule_batch(
    host: &PageHost,
    policy: IdlePolicy,
    state: &Rc<InteractionState>,
    entries: Vec<RawEntry>,
) {
    let batch_state = Rc::clone(state);
    let batch = when_idle_or_hidden(host, policy, move || {
        batch_state.ingest(&entries);
        if !batch_state.draining.get() {
            batch_state.report();
        }
    });
    if !batch.has_run() {
        let mut pending = state.pending.borrow_mut();
        pending.retain(|p| !p.has_run());
        pending.push(batch);
    }
}

/// INP module bound to a page session
pub struct InteractionMetric {
    state: Rc<InteractionState>,
    subscription: Rc<Subscription>,
    listeners: ListenerSet,
}

impl InteractionMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        let state = Rc::new(InteractionState {
            table: RefCell::new(InteractionTable::new()),
            slot,
            pending: RefCell::new(Vec::new()),
            draining: Cell::new(false),
        });
        let policy = ctx.idle_policy();

        let host = ctx.host.clone();
        let batch_state = Rc::clone(&state);
        let subscription = Rc::new(ctx.host.entries.observer(move |entries| {
            schedule_batch(&host, policy, &batch_state, entries);
        }));
        subscription.observe(
            EntryCategory::Event,
            ObserveOptions::buffered()
                .with_duration_threshold(ctx.config.interaction_duration_threshold_ms),
        )?;
        if let Err(err) = subscription.observe(EntryCategory::FirstInput, ObserveOptions::buffered()) {
            ctx.debug_warn("INP", &err);
        }

        let listeners = ListenerSet::new(&ctx.host.lifecycle);

        let sub = Rc::clone(&subscription);
        let hidden_state = Rc::clone(&state);
        listeners.push(ctx.host.lifecycle.on_hidden(move |_| {
            hidden_state.drain_and_report(&sub.take_records());
        }));

        let restore_state = Rc::clone(&state);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |_| {
            tracing::debug!("interaction table cleared after cache restore");
            restore_state.table.borrow_mut().clear();
            restore_state.slot.clear();
        }));

        Ok(Self {
            state,
            subscription,
            listeners,
        })
    }

    /// Number of distinct interactions recorded
    pub fn interaction_count(&self) -> usize {
        self.state.table.borrow().len()
    }
}

impl PageMetric for InteractionMetric {
    fn name(&self) -> &'static str {
        "INP"
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
    use crate::observer::EntrySource;
    use crate::scheduler::ManualScheduler;
    use crate::types::MetricName;
    use proptest::prelude::*;

    #[test]
    fn test_percentile_rank_breakpoints() {
        assert_eq!(percentile_rank(1), 0);
        assert_eq!(percentile_rank(10), 0);
        assert_eq!(percentile_rank(11), 1);
        assert_eq!(percentile_rank(50), 1);
        assert_eq!(percentile_rank(51), 1);
        assert_eq!(percentile_rank(60), 1);
        assert_eq!(percentile_rank(101), 2);
        assert_eq!(percentile_rank(500), 9);
    }

    #[test]
    fn test_table_keeps_longest_duration_per_interaction() {
        let mut table = InteractionTable::new();
        assert!(table.ingest(&RawEntry::interaction(7, 0.0, 80.0)));
        assert!(table.ingest(&RawEntry::interaction(7, 5.0, 120.0)));
        assert!(table.ingest(&RawEntry::interaction(7, 9.0, 60.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(7), Some(120.0));
    }

    #[test]
    fn test_table_ignores_entries_without_interaction() {
        let mut table = InteractionTable::new();
        assert!(!table.ingest(&RawEntry::interaction(0, 0.0, 300.0)));
        assert!(!table.ingest(&RawEntry::first_input(10.0, 15.0, 48.0)));
        assert!(table.is_empty());
        assert_eq!(table.percentile(), None);
    }

    #[test]
    fn test_percentile_selection() {
        let mut table = InteractionTable::new();
        table.record(1, 250.0);
        assert_eq!(table.percentile(), Some(250.0));

        for id in 2..=11 {
            table.record(id, id as f64 * 10.0);
        }
        // 11 interactions: second-highest
        assert_eq!(table.len(), 11);
        assert_eq!(table.percentile(), Some(110.0));
    }

    #[test]
    fn test_batches_wait_for_idle() {
        let h = Harness::new();
        let metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 120.4));
        h.host().entries.emit(RawEntry::interaction(2, 300.0, 64.0));
        h.host().entries.deliver();
        assert_eq!(metric.interaction_count(), 0);
        assert!(h.recorder.reports().is_empty());

        h.scheduler.run_idle();
        assert_eq!(metric.interaction_count(), 2);
        assert_eq!(h.recorder.values(MetricName::Inp), vec![120.0]);
    }

    #[test]
    fn test_duration_threshold_applies() {
        let h = Harness::new();
        let metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 16.0));
        h.host().entries.deliver();
        h.scheduler.flush();
        assert_eq!(metric.interaction_count(), 0);
        assert_eq!(h.store.get(MetricName::Inp), None);
    }

    #[test]
    fn test_hidden_drains_and_reports() {
        let h = Harness::new();
        let _metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 200.0));
        h.host().lifecycle.hide(400.0);

        assert_eq!(h.store.get(MetricName::Inp), Some(200.0));
        assert_eq!(h.recorder.values(MetricName::Inp), vec![200.0]);
        assert!(h.scheduler.is_empty());

        h.host().lifecycle.show(500.0);
        h.host().lifecycle.hide(600.0);
        assert_eq!(h.recorder.values(MetricName::Inp), vec![200.0, 200.0]);
    }

    #[test]
    fn test_hidden_with_pending_batch_reports_once() {
        let h = Harness::new();
        let metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 200.0));
        h.host().entries.deliver();
        h.scheduler.run_idle();
        assert_eq!(h.recorder.values(MetricName::Inp), vec![200.0]);

        h.host().entries.emit(RawEntry::interaction(2, 300.0, 90.0));
        h.host().entries.deliver();
        h.host().entries.emit(RawEntry::interaction(3, 500.0, 400.0));
        h.host().lifecycle.hide(700.0);

        assert_eq!(metric.interaction_count(), 3);
        assert_eq!(h.recorder.values(MetricName::Inp), vec![200.0, 400.0]);
        h.scheduler.flush();
        assert_eq!(h.recorder.values(MetricName::Inp), vec![200.0, 400.0]);
    }

    #[test]
    fn test_batches_after_cache_restore_wait_for_idle() {
        let h = Harness::new();
        let _metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().lifecycle.hide(1000.0);
        h.host().lifecycle.restore_from_cache(4000.0);
        assert!(!h.host().lifecycle.is_hidden());

        h.host().entries.emit(RawEntry::interaction(9, 4100.0, 250.0));
        h.host().entries.deliver();
        assert_eq!(h.store.get(MetricName::Inp), None);

        h.scheduler.run_idle();
        assert_eq!(h.store.get(MetricName::Inp), Some(250.0));
        assert_eq!(h.recorder.values(MetricName::Inp), vec![250.0]);
    }

    #[test]
    fn test_hidden_before_idle_processes_batch_once() {
        let h = Harness::new();
        let metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 90.0));
        h.host().entries.deliver();
        h.host().lifecycle.hide(200.0);
        let reports = h.recorder.values(MetricName::Inp).len();
        assert_eq!(metric.interaction_count(), 1);

        h.scheduler.advance(1000.0);
        h.scheduler.run_idle();
        assert_eq!(h.recorder.values(MetricName::Inp).len(), reports);
    }

    #[test]
    fn test_cache_restore_clears_table_and_value() {
        let h = Harness::new();
        let metric =
            InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).unwrap();

        h.host().entries.emit(RawEntry::interaction(1, 100.0, 200.0));
        h.host().entries.deliver();
        h.scheduler.run_idle();
        assert_eq!(h.store.get(MetricName::Inp), Some(200.0));

        h.host().lifecycle.restore_from_cache(3000.0);
        assert_eq!(metric.interaction_count(), 0);
        assert_eq!(h.store.get(MetricName::Inp), None);
    }

    #[test]
    fn test_first_input_is_optional() {
        let h = Harness::with(
            ManualScheduler::new(),
            EntrySource::with_supported(&[EntryCategory::Event]),
        );
        assert!(InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap()).is_ok());
    }

    #[test]
    fn test_event_timing_is_required() {
        let h = Harness::with(
            ManualScheduler::new(),
            EntrySource::with_supported(&[EntryCategory::FirstInput]),
        );
        let result = InteractionMetric::start(&h.ctx, h.store.claim(MetricName::Inp).unwrap());
        assert!(matches!(
            result,
            Err(VitalsError::UnsupportedCapability(EntryCategory::Event))
        ));
    }

    proptest! {
        #[test]
        fn prop_percentile_is_a_recorded_value(durations in prop::collection::vec(1.0f64..1000.0, 1..200)) {
            let mut table = InteractionTable::new();
            for (i, d) in durations.iter().enumerate() {
                table.record(i as u64 + 1, *d);
            }
            let selected = table.percentile().unwrap();
            prop_assert!(durations.contains(&selected));

            let larger = durations.iter().filter(|d| **d > selected).count();
            prop_assert!(larger <= percentile_rank(durations.len()));
        }

        #[test]
        fn prop_rank_is_in_bounds(n in 1usize..5000) {
            prop_assert!(percentile_rank(n) < n);
        }
    }
}
