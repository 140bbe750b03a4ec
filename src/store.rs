//! Metric store and callback dispatch
//!
//! The store owns the [`MetricsRecord`]. A metric module writes its field through
//! a [`MetricSlot`], and each field can be claimed only once, so no module can
//! overwrite another module's value.

use crate::error::VitalsError;
use crate::types::{MetricName, MetricReport, MetricsRecord};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Collaborator notification interface
pub trait MetricCallbacks {
    /// A metric produced a value worth reporting
    fn on_metric(&self, name: MetricName, value: f64);

    /// Something in the record changed (live displays)
    fn on_update(&self);
}

/// Callbacks that ignore every notification
pub struct NoopCallbacks;

impl MetricCallbacks for NoopCallbacks {
    fn on_metric(&self, _name: MetricName, _value: f64) {}

    fn on_update(&self) {}
}

/// Adapts a pair of closures to [`MetricCallbacks`]
pub struct FnCallbacks<M, U> {
    on_metric: M,
    on_update: U,
}

impl<M, U> FnCallbacks<M, U>
where
    M: Fn(MetricName, f64),
    U: Fn(),
{
    pub fn new(on_metric: M, on_update: U) -> Self {
        Self {
            on_metric,
            on_update,
        }
    }
}

impl<M, U> MetricCallbacks for FnCallbacks<M, U>
where
    M: Fn(MetricName, f64),
    U: Fn(),
{
    fn on_metric(&self, name: MetricName, value: f64) {
        (self.on_metric)(name, value)
    }

    fn on_update(&self) {
        (self.on_update)()
    }
}

/// Records every notification in order
#[derive(Debug, Default)]
pub struct MetricRecorder {
    reports: RefCell<Vec<MetricReport>>,
    updates: Cell<usize>,
}

impl MetricRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<MetricReport> {
        self.reports.borrow().clone()
    }

    /// Values reported for one metric, oldest first
    pub fn values(&self, name: MetricName) -> Vec<f64> {
        self.reports
            .borrow()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.value)
            .collect()
    }

    pub fn last(&self, name: MetricName) -> Option<f64> {
        self.values(name).last().copied()
    }

    pub fn updates(&self) -> usize {
        self.updates.get()
    }

    /// Remove and return the reports collected so far
    pub fn take_reports(&self) -> Vec<MetricReport> {
        self.reports.borrow_mut().drain(..).collect()
    }
}

impl MetricCallbacks for MetricRecorder {
    fn on_metric(&self, name: MetricName, value: f64) {
        self.reports.borrow_mut().push(MetricReport { name, value });
    }

    fn on_update(&self) {
        self.updates.set(self.updates.get() + 1);
    }
}

/// Holds the latest value of every metric and notifies collaborators
pub struct MetricStore {
    record: RefCell<MetricsRecord>,
    claimed: RefCell<HashSet<MetricName>>,
    callbacks: Rc<dyn MetricCallbacks>,
}

impl MetricStore {
    pub fn new(callbacks: Rc<dyn MetricCallbacks>) -> Rc<Self> {
        Rc::new(Self {
            record: RefCell::new(MetricsRecord::default()),
            claimed: RefCell::new(HashSet::new()),
            callbacks,
        })
    }

    /// Take the single writer handle for a metric field
    pub fn claim(self: &Rc<Self>, name: MetricName) -> Result<MetricSlot, VitalsError> {
        if !self.claimed.borrow_mut().insert(name) {
            return Err(VitalsError::DuplicateWriter(name));
        }
        Ok(MetricSlot {
            name,
            store: Rc::clone(self),
        })
    }

    pub fn snapshot(&self) -> MetricsRecord {
        self.record.borrow().clone()
    }

    pub fn get(&self, name: MetricName) -> Option<f64> {
        self.record.borrow().get(name)
    }

    fn write(&self, name: MetricName, value: Option<f64>) {
        self.record.borrow_mut().set(name, value);
    }
}

/// Exclusive writer for one [`MetricsRecord`] field
pub struct MetricSlot {
    name: MetricName,
    store: Rc<MetricStore>,
}

impl MetricSlot {
    pub fn name(&self) -> MetricName {
        self.name
    }

    pub fn get(&self) -> Option<f64> {
        self.store.get(self.name)
    }

    /// Store a reportable value and notify `on_metric` then `on_update`
    pub fn report(&self, value: f64) {
        self.store.write(self.name, Some(value));
        tracing::trace!(metric = %self.name, value, "metric reported");
        self.store.callbacks.on_metric(self.name, value);
        self.store.callbacks.on_update();
    }

    /// Store a live value and notify `on_update` only
    pub fn update(&self, value: f64) {
        self.store.write(self.name, Some(value));
        tracing::trace!(metric = %self.name, value, "metric updated");
        self.store.callbacks.on_update();
    }

    /// Unset the value without notifying
    pub fn clear(&self) {
        self.store.write(self.name, None);
    }
}
