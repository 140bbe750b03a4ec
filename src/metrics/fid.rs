//! First input delay (legacy first-input timing)

use crate::error::VitalsError;
use crate::host::PageHost;
use crate::metrics::{ListenerSet, MetricContext, PageMetric};
use crate::observer::{ObserveOptions, Subscription};
use crate::store::MetricSlot;
use crate::types::{round_ms, EntryCategory, RawEntry};
use std::cell::RefCell;
use std::rc::Rc;

type EntryHandler = Rc<dyn Fn(Vec<RawEntry>)>;

/// FID module bound to a page session
pub struct FirstInputDelayMetric {
    slot: Rc<MetricSlot>,
    current: Rc<RefCell<Option<Subscription>>>,
    listeners: ListenerSet,
}

fn subscribe(
    host: &PageHost,
    handler: &EntryHandler,
    options: ObserveOptions,
) -> Result<Subscription, VitalsError> {
    let handler = Rc::clone(handler);
    let subscription = host.entries.observer(move |entries| handler(entries));
    subscription.observe(EntryCategory::FirstInput, options)?;
    Ok(subscription)
}

impl FirstInputDelayMetric {
    pub fn start(ctx: &MetricContext, slot: MetricSlot) -> Result<Self, VitalsError> {
        let slot = Rc::new(slot);
        let current: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let handler: EntryHandler = {
            let slot = Rc::clone(&slot);
            let current = Rc::clone(&current);
            let ctx = ctx.clone();
            Rc::new(move |entries: Vec<RawEntry>| {
                let Some(first) = entries.first() else {
                    return;
                };
                if ctx.visibility.was_visible_at(first.start_time) {
                    match first.processing_start {
                        Some(processing_start) => {
                            slot.report(round_ms(processing_start - first.start_time))
                        }
                        None => ctx.debug_warn(
                            "FID",
                            &VitalsError::MissingData(
                                "first-input entry without processing start".to_string(),
                            ),
                        ),
                    }
                }
                if let Some(sub) = current.borrow().as_ref() {
                    sub.disconnect();
                }
            })
        };

        let subscription = subscribe(&ctx.host, &handler, ObserveOptions::buffered())?;
        *current.borrow_mut() = Some(subscription);

        let listeners = ListenerSet::new(&ctx.host.lifecycle);
        let restore_ctx = ctx.clone();
        let restore_slot = Rc::clone(&slot);
        let restore_current = Rc::clone(&current);
        listeners.push(ctx.host.lifecycle.on_cache_restore(move |_| {
            restore_slot.clear();
            let previous = restore_current.borrow_mut().take();
            if let Some(previous) = previous {
                previous.disconnect();
            }
            // The pre-restore input is still in the buffer; only new inputs count
            match subscribe(&restore_ctx.host, &handler, ObserveOptions::default()) {
                Ok(fresh) => *restore_current.borrow_mut() = Some(fresh),
                Err(err) => restore_ctx.debug_warn("FID", &err),
            }
        }));

        Ok(Self {
            slot,
            current,
            listeners,
        })
    }

    pub fn value(&self) -> Option<f64> {
        self.slot.get()
    }

    pub fn is_observing(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .map(Subscription::is_connected)
            .unwrap_or(false)
    }
}

impl PageMetric for FirstInputDelayMetric {
    fn name(&self) -> &'static str {
        "FID"
    }

    fn stop(&self) {
        let current = self.current.borrow_mut().take();
        if let Some(sub) = current {
            sub.disconnect();
        }
        self.listeners.remove_all();
    }
}
