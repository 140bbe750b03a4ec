//! Cumulative layout shift
//!
//! Layout shifts are grouped into session windows: a window keeps growing
//! while shifts arrive less than 1s apart and the window is younger than 5s.
//! The reported value is the largest window total seen in this navigation.

use crate::error::VitalsError;
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::observer::{ObserveOptions, Subscription};
use crate::store::MetricSlot;
use crate::types::{round_score, EntryCategory, RawEntry};
use std::cell::RefCell;
use std::rc::Rc;

/// Maximum gap between consecutive shifts in one window
pub const SESSION_GAP_MS: f64 = 1000.0;

/// Maximum span of a window, measured from its first shift
pub const MAX_SESSION_DURATION_MS: f64 = 5000.0;

/// Layout shifts that belong together
#[derive(Debug, Clone, Default)]
pub struct SessionWindow {
    entries: Vec<RawEntry>,
    value: f64,
}

impl SessionWindow {
    pub fn window_start(&self) -> Option<f64> {
        self.entries.first().map(|e| e.start_time)
    }

    pub fn last_entry_time(&self) -> Option<f64> {
        self.entries.last().map(|e| e.start_time)
    }

    pub fn accumulated_value(&self) -> f64 {
        self.value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a shift at `start_time` must start a new window
    pub fn closes_before(&self, start_time: f64) -> bool {
        match (self.window_start(), self.last_entry_time()) {
            (Some(first), Some(last)) => {
                start_time - last > SESSION_GAP_MS || start_time - first > MAX_SESSION_DURATION_MS
            }
            _ => false,
        }
    }

    fn push(&mut self, entry: &RawEntry) {
        self.value += entry.shift_value();
        self.entries.push(entry.clone());
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.value = 0.0;
    }
}

/// Session-window state machine plus the running maximum
#[derive(Debug, Clone, Default)]
pub struct LayoutShiftAggregator {
    window: SessionWindow,
    max: f64,
}

impl LayoutShiftAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one layout shift. Returns the new maximum when it grew.
    pub fn add(&mut self, entry: &RawEntry) -> Option<f64> {
        if entry.is_input_driven() {
            return None;
        }
        if self.window.closes_before(entry.start_time) {
            self.window.clear();
        }
        self.window.push(entry);

        if self.window.value > self.max {
            self.max = self.window.value;
            Some(self.max)
        } else {
            None
        }
    }

    /// Largest window total, unrounded
    pub fn max_value(&self) -> f64 {
        self.max
    }

    /// Largest window total rounded to three decimals
    pub fn reported_value(&self) -> f64 {
        round_score(self.max)
    }

    pub fn window(&self) -> &SessionWindow {
        &self.window
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.max = 0.0;
    }
}

/// CLS module bound to a page session
pub struct LayoutShiftMetric {
    state: Rc<RefCell<LayoutShiftAggregator>>,
    subscription: Rc<Subscription>,
    listeners: ListenerSet,
}

impl LayoutShiftMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        let slot = Rc::new(slot);
        let state = Rc::new(RefCell::new(LayoutShiftAggregator::new()));

        let handle: Rc<dyn Fn(Vec<RawEntry>)> = {
            let state = Rc::clone(&state);
            let slot = Rc::clone(&slot);
            Rc::new(move |entries: Vec<RawEntry>| {
                for entry in &entries {
                    let grown = state.borrow_mut().add(entry);
                    if let Some(max) = grown {
                        slot.report(round_score(max));
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
        subscription.observe(EntryCategory::LayoutShift, ObserveOptions::buffered())?;

        slot.update(0.0);

        let listeners = ListenerSet::new(&ctx.host.lifecycle);

        let sub = Rc::clone(&subscription);
        let hidden_state = Rc::clone(&state);
        let hidden_slot = Rc::clone(&slot);
        listeners.push(ctx.host.lifecycle.on_hidden(move |_| {
            handle(sub.take_records());
            let value = hidden_state.borrow().reported_value();
            hidden_slot.report(value);
        }));

        let restore_state = Rc::clone(&state);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |_| {
            tracing::debug!("layout shift state reset after cache restore");
            restore_state.borrow_mut().reset();
            slot.report(0.0);
        }));

        Ok(Self {
            state,
            subscription,
            listeners,
        })
    }

    /// Current reported value
    pub fn value(&self) -> f64 {
        self.state.borrow().reported_value()
    }

    /// Number of shifts in the open session window
    pub fn window_len(&self) -> usize {
        self.state.borrow().window().len()
    }
}

impl PageMetric for LayoutShiftMetric {
    fn name(&self) -> &'static str {
        "CLS"
    }

    fn stop(&self) {
        self.subscription.disconnect();
        self.listeners.remove_all();
    }
}
