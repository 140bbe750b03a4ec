//! Host capabilities bundle

use crate::lifecycle::PageLifecycle;
use crate::observer::EntrySource;
use crate::scheduler::{ManualScheduler, Scheduler};
use std::rc::Rc;

/// Shared handles to the host facilities of one page session.
///
/// Cloning is cheap; every clone refers to the same scheduler, lifecycle and timeline.
#[derive(Clone)]
pub struct PageHost {
    pub scheduler: Rc<dyn Scheduler>,
    pub lifecycle: Rc<PageLifecycle>,
    pub entries: Rc<EntrySource>,
}

impl PageHost {
    pub fn new(
        scheduler: Rc<dyn Scheduler>,
        lifecycle: Rc<PageLifecycle>,
        entries: Rc<EntrySource>,
    ) -> Self {
        Self {
            scheduler,
            lifecycle,
            entries,
        }
    }

    /// A host backed by a [`ManualScheduler`], returned alongside for driving it
    pub fn manual() -> (Self, Rc<ManualScheduler>) {
        Self::manual_with(ManualScheduler::new(), EntrySource::new(), PageLifecycle::new())
    }

    pub fn manual_with(
        scheduler: ManualScheduler,
        entries: EntrySource,
        lifecycle: PageLifecycle,
    ) -> (Self, Rc<ManualScheduler>) {
        let scheduler = Rc::new(scheduler);
        let host = Self::new(
            Rc::clone(&scheduler) as Rc<dyn Scheduler>,
            Rc::new(lifecycle),
            Rc::new(entries),
        );
        (host, scheduler)
    }

    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }
}
