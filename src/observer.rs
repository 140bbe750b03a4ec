//! Push-based performance entry observation
//!
//! [`EntrySource`] stands in for the host's performance timeline. The host
//! emits entries into it; every connected [`Subscription`] observing that
//! category queues the entry, and queued entries reach the subscriber's
//! callback on the next [`EntrySource::deliver`]. Entries still queued can be
//! pulled synchronously with [`Subscription::take_records`], which is how
//! metrics drain undelivered work when the page is about to be hidden.

use crate::error::VitalsError;
use crate::types::{EntryCategory, NavigationTiming, RawEntry};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

/// Options for [`Subscription::observe`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObserveOptions {
    /// Replay entries recorded before the subscription was made
    pub buffered: bool,
    /// Event timing entries with a shorter duration are dropped
    pub duration_threshold: Option<f64>,
}

impl ObserveOptions {
    pub fn buffered() -> Self {
        Self {
            buffered: true,
            duration_threshold: None,
        }
    }

    pub fn with_duration_threshold(mut self, threshold_ms: f64) -> Self {
        self.duration_threshold = Some(threshold_ms);
        self
    }
}

pub type EntryCallback = Rc<dyn Fn(Vec<RawEntry>)>;

struct ObserverState {
    id: u64,
    observed: RefCell<Vec<(EntryCategory, ObserveOptions)>>,
    pending: RefCell<Vec<RawEntry>>,
    connected: Cell<bool>,
    callback: EntryCallback,
}

impl ObserverState {
    fn accepts(&self, entry: &RawEntry) -> bool {
        self.observed.borrow().iter().any(|(category, options)| {
            *category == entry.category && passes_threshold(entry, options)
        })
    }
}

fn passes_threshold(entry: &RawEntry, options: &ObserveOptions) -> bool {
    match (entry.category, options.duration_threshold) {
        (EntryCategory::Event, Some(threshold)) => entry.duration.unwrap_or(0.0) >= threshold,
        _ => true,
    }
}

/// The host performance timeline for one page session
pub struct EntrySource {
    supported: HashSet<EntryCategory>,
    buffer: RefCell<Vec<RawEntry>>,
    observers: RefCell<Vec<Rc<ObserverState>>>,
    navigation: RefCell<Option<NavigationTiming>>,
    next_id: Cell<u64>,
}

impl Default for EntrySource {
    fn default() -> Self {
        Self::new()
    }
}

impl EntrySource {
    /// Timeline supporting every entry category
    pub fn new() -> Self {
        Self::with_supported(&EntryCategory::ALL)
    }

    /// Timeline supporting only the given categories
    pub fn with_supported(categories: &[EntryCategory]) -> Self {
        Self {
            supported: categories.iter().copied().collect(),
            buffer: RefCell::new(Vec::new()),
            observers: RefCell::new(Vec::new()),
            navigation: RefCell::new(None),
            next_id: Cell::new(1),
        }
    }

    pub fn supports(&self, category: EntryCategory) -> bool {
        self.supported.contains(&category)
    }

    /// Create a disconnected subscription; call [`Subscription::observe`] to start it
    pub fn observer(self: &Rc<Self>, callback: impl Fn(Vec<RawEntry>) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Subscription {
            state: Rc::new(ObserverState {
                id,
                observed: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
                connected: Cell::new(false),
                callback: Rc::new(callback),
            }),
            source: Rc::downgrade(self),
        }
    }

    /// Record a new entry and queue it for every interested subscription.
    ///
    /// Entries of unsupported categories are dropped.
    pub fn emit(&self, entry: RawEntry) {
        if !self.supports(entry.category) {
            return;
        }
        for observer in self.observers.borrow().iter() {
            if observer.connected.get() && observer.accepts(&entry) {
                observer.pending.borrow_mut().push(entry.clone());
            }
        }
        self.buffer.borrow_mut().push(entry);
    }

    /// Hand queued entries to subscriber callbacks. Returns the number of callbacks run.
    pub fn deliver(&self) -> usize {
        let observers: Vec<Rc<ObserverState>> = self.observers.borrow().clone();
        let mut delivered = 0;
        for observer in observers {
            if !observer.connected.get() {
                continue;
            }
            let entries: Vec<RawEntry> = observer.pending.borrow_mut().drain(..).collect();
            if entries.is_empty() {
                continue;
            }
            let callback = Rc::clone(&observer.callback);
            callback(entries);
            delivered += 1;
        }
        delivered
    }

    /// Entries recorded so far for a category
    pub fn buffered(&self, category: EntryCategory) -> Vec<RawEntry> {
        self.buffer
            .borrow()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    pub fn set_navigation_timing(&self, timing: NavigationTiming) {
        *self.navigation.borrow_mut() = Some(timing);
    }

    /// The navigation timing record, if the host exposes one
    pub fn navigation_timing(&self) -> Option<NavigationTiming> {
        if !self.supports(EntryCategory::Navigation) {
            return None;
        }
        self.navigation.borrow().clone()
    }

    /// Number of connected subscriptions
    pub fn observer_count(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|o| o.connected.get())
            .count()
    }

    fn attach(&self, state: &Rc<ObserverState>) {
        let mut observers = self.observers.borrow_mut();
        if !observers.iter().any(|o| o.id == state.id) {
            observers.push(Rc::clone(state));
        }
    }

    fn detach(&self, id: u64) {
        self.observers.borrow_mut().retain(|o| o.id != id);
    }
}

/// A cancellable subscription to one or more entry categories
pub struct Subscription {
    state: Rc<ObserverState>,
    source: Weak<EntrySource>,
}

impl Subscription {
    /// Start observing a category.
    ///
    /// Fails with [`VitalsError::UnsupportedCapability`] when the host does not
    /// produce entries of that category.
    pub fn observe(
        &self,
        category: EntryCategory,
        options: ObserveOptions,
    ) -> Result<(), VitalsError> {
        let source = self
            .source
            .upgrade()
            .ok_or_else(|| VitalsError::MissingData("performance timeline is gone".to_string()))?;
        if !source.supports(category) {
            return Err(VitalsError::UnsupportedCapability(category));
        }

        self.state.observed.borrow_mut().push((category, options));
        self.state.connected.set(true);
        source.attach(&self.state);

        if options.buffered {
            let replay: Vec<RawEntry> = source
                .buffered(category)
                .into_iter()
                .filter(|e| passes_threshold(e, &options))
                .collect();
            self.state.pending.borrow_mut().extend(replay);
        }
        Ok(())
    }

    /// Remove and return entries queued but not yet delivered
    pub fn take_records(&self) -> Vec<RawEntry> {
        self.state.pending.borrow_mut().drain(..).collect()
    }

    /// Stop observing; queued entries are discarded
    pub fn disconnect(&self) {
        self.state.connected.set(false);
        self.state.observed.borrow_mut().clear();
        self.state.pending.borrow_mut().clear();
        if let Some(source) = self.source.upgrade() {
            source.detach(self.state.id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting(source: &Rc<EntrySource>) -> (Subscription, Rc<RefCell<Vec<RawEntry>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = source.observer(move |entries| sink.borrow_mut().extend(entries));
        (sub, seen)
    }

    #[test]
    fn test_emit_then_deliver() {
        let source = Rc::new(EntrySource::new());
        let (sub, seen) = collecting(&source);
        sub.observe(EntryCategory::LayoutShift, ObserveOptions::default())
            .unwrap();

        source.emit(RawEntry::layout_shift(10.0, 0.1, false));
        source.emit(RawEntry::largest_paint(20.0));
        assert!(seen.borrow().is_empty());

        assert_eq!(source.deliver(), 1);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].category, EntryCategory::LayoutShift);
    }

    #[test]
    fn test_buffered_replay() {
        let source = Rc::new(EntrySource::new());
        source.emit(RawEntry::paint("first-contentful-paint", 150.0));

        let (late, seen_late) = collecting(&source);
        late.observe(EntryCategory::Paint, ObserveOptions::buffered())
            .unwrap();
        let (unbuffered, seen_unbuffered) = collecting(&source);
        unbuffered
            .observe(EntryCategory::Paint, ObserveOptions::default())
            .unwrap();

        source.deliver();
        assert_eq!(seen_late.borrow().len(), 1);
        assert!(seen_unbuffered.borrow().is_empty());
    }

    #[test]
    fn test_take_records_drains_pending() {
        let source = Rc::new(EntrySource::new());
        let (sub, seen) = collecting(&source);
        sub.observe(EntryCategory::LayoutShift, ObserveOptions::default())
            .unwrap();

        source.emit(RawEntry::layout_shift(10.0, 0.1, false));
        let records = sub.take_records();
        assert_eq!(records.len(), 1);

        assert_eq!(source.deliver(), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_unsupported_category() {
        let source = Rc::new(EntrySource::with_supported(&[EntryCategory::Paint]));
        let (sub, _) = collecting(&source);
        let result = sub.observe(EntryCategory::LargestContentfulPaint, ObserveOptions::buffered());
        assert!(matches!(
            result,
            Err(VitalsError::UnsupportedCapability(EntryCategory::LargestContentfulPaint))
        ));
        assert!(!sub.is_connected());
        assert!(source.navigation_timing().is_none());
    }

    #[test]
    fn test_disconnect_discards_pending() {
        let source = Rc::new(EntrySource::new());
        let (sub, seen) = collecting(&source);
        sub.observe(EntryCategory::Paint, ObserveOptions::default())
            .unwrap();
        source.emit(RawEntry::paint("first-paint", 100.0));

        sub.disconnect();
        source.emit(RawEntry::paint("first-contentful-paint", 120.0));
        source.deliver();
        assert!(seen.borrow().is_empty());
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn test_duration_threshold_filters_short_events() {
        let source = Rc::new(EntrySource::new());
        source.emit(RawEntry::interaction(1, 10.0, 16.0));
        source.emit(RawEntry::interaction(2, 20.0, 48.0));

        let (sub, seen) = collecting(&source);
        sub.observe(
            EntryCategory::Event,
            ObserveOptions::buffered().with_duration_threshold(40.0),
        )
        .unwrap();
        source.emit(RawEntry::interaction(3, 30.0, 8.0));
        source.emit(RawEntry::interaction(4, 40.0, 120.0));
        source.deliver();

        let ids: Vec<Option<u64>> = seen.borrow().iter().map(|e| e.interaction_id).collect();
        assert_eq!(ids, vec![Some(2), Some(4)]);
    }

    #[test]
    fn test_navigation_timing() {
        let source = EntrySource::new();
        assert!(source.navigation_timing().is_none());
        source.set_navigation_timing(NavigationTiming {
            response_start: 120.0,
            ..Default::default()
        });
        assert_eq!(source.navigation_timing().unwrap().response_start, 120.0);
    }
}
