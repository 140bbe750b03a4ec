//! Coarse navigation timers: DNS, TCP, DOM and LOAD
//!
//! One snapshot of the navigation record, taken after load. These values are
//! not re-measured after a cache restore. They are stored and announced through
//! `on_update` only; `on_metric` never carries them.

use crate::error::VitalsError;
use crate::finalize::when_loaded;
use crate::metrics::{MetricContext, PageMetric};
use crate::store::MetricSlot;
use crate::types::{round_ms, MetricName, NavigationTiming};
use std::cell::Cell;
use std::rc::Rc;

/// Durations derived from a navigation record, rounded to whole milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigationDurations {
    pub dns: f64,
    pub tcp: f64,
    pub dom: f64,
    /// Unset until the load event has ended
    pub load: Option<f64>,
}

impl NavigationDurations {
    pub fn from_timing(nav: &NavigationTiming) -> Self {
        Self {
            dns: round_ms(nav.domain_lookup_end - nav.domain_lookup_start),
            tcp: round_ms(nav.connect_end - nav.connect_start),
            dom: round_ms(nav.dom_content_loaded_event_end - nav.response_end),
            load: (nav.load_event_end > 0.0).then(|| round_ms(nav.load_event_end - nav.start_time)),
        }
    }

    pub fn get(&self, name: MetricName) -> Option<f64> {
        match name {
            MetricName::Dns => Some(self.dns),
            MetricName::Tcp => Some(self.tcp),
            MetricName::Dom => Some(self.dom),
            MetricName::Load => self.load,
            _ => None,
        }
    }
}

/// Writer handles for the enabled navigation timers
#[derive(Default)]
pub struct NavigationSlots {
    slots: Vec<MetricSlot>,
}

impl NavigationSlots {
    pub const NAMES: [MetricName; 4] = [
        MetricName::Dns,
        MetricName::Tcp,
        MetricName::Dom,
        MetricName::Load,
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot; slots for other metrics are rejected
    pub fn push(&mut self, slot: MetricSlot) -> Result<(), VitalsError> {
        if !Self::NAMES.contains(&slot.name()) {
            return Err(VitalsError::InvalidConfig(format!(
                "{} is not a navigation timer",
                slot.name()
            )));
        }
        self.slots.push(slot);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> Vec<MetricName> {
        self.slots.iter().map(MetricSlot::name).collect()
    }

    fn write(&self, durations: &NavigationDurations) {
        for slot in &self.slots {
            if let Some(value) = durations.get(slot.name()) {
                slot.update(value);
            }
        }
    }
}

/// Navigation timers module bound to a page session
pub struct NavigationTimersMetric {
    slots: Rc<NavigationSlots>,
    active: Rc<Cell<bool>>,
}

impl NavigationTimersMetric {
    pub fn start(ctx: &MetricContext, slots: NavigationSlots) -> Result<Self, VitalsError> {
        let slots = Rc::new(slots);
        let active = Rc::new(Cell::new(true));

        let read_slots = Rc::clone(&slots);
        let read_active = Rc::clone(&active);
        let read_ctx = ctx.clone();
        when_loaded(&ctx.host, move || {
            if !read_active.get() {
                return;
            }
            match read_ctx.host.entries.navigation_timing() {
                Some(nav) => {
                    let durations = NavigationDurations::from_timing(&nav);
                    tracing::trace!(?durations, "navigation timers read");
                    read_slots.write(&durations);
                }
                None => read_ctx.debug_warn(
                    "navigation",
                    &VitalsError::MissingData("navigation timing unavailable".to_string()),
                ),
            }
        });

        Ok(Self { slots, active })
    }

    pub fn metrics(&self) -> Vec<MetricName> {
        self.slots.names()
    }
}

impl PageMetric for NavigationTimersMetric {
    fn name(&self) -> &'static str {
        "navigation"
    }

    fn stop(&self) {
        self.active.set(false);
    }
}
