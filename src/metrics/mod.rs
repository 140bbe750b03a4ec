//! Metric modules
//!
//! Each module observes its own entry categories and lifecycle signals and
//! writes exactly one field (or, for navigation timers, a fixed group of
//! fields) of the metrics record:
//!
//! - [`cls`]: session-windowed layout shift aggregation
//! - [`inp`]: per-interaction latency percentile
//! - [`lcp`], [`fcp`]: paint milestones
//! - [`fid`]: legacy first input delay
//! - [`ttfb`], [`navigation`]: navigation timing snapshots

pub mod cls;
pub mod fcp;
pub mod fid;
pub mod inp;
pub mod lcp;
pub mod navigation;
pub mod ttfb;

pub use cls::{LayoutShiftAggregator, LayoutShiftMetric, SessionWindow};
pub use fcp::FirstContentfulPaintMetric;
pub use fid::FirstInputDelayMetric;
pub use inp::{percentile_rank, InteractionMetric, InteractionTable};
pub use lcp::LargestContentfulPaintMetric;
pub use navigation::{NavigationDurations, NavigationSlots, NavigationTimersMetric};
pub use ttfb::TimeToFirstByteMetric;

use crate::config::{IdlePolicy, VitalsConfig};
use crate::error::VitalsError;
use crate::host::PageHost;
use crate::lifecycle::{ListenerId, PageLifecycle};
use crate::visibility::VisibilityTracker;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Everything a metric module needs from its page session
#[derive(Clone)]
pub struct MetricContext {
    pub host: PageHost,
    pub visibility: Rc<VisibilityTracker>,
    pub config: Rc<VitalsConfig>,
}

impl MetricContext {
    pub fn new(host: PageHost, visibility: Rc<VisibilityTracker>, config: Rc<VitalsConfig>) -> Self {
        Self {
            host,
            visibility,
            config,
        }
    }

    pub fn idle_policy(&self) -> IdlePolicy {
        self.config.idle_policy()
    }

    /// Log a non-fatal problem when debug diagnostics are enabled
    pub fn debug_warn(&self, metric: &str, error: &VitalsError) {
        if self.config.debug {
            tracing::warn!(metric, %error, "metric degraded");
        }
    }
}

/// A running metric module
pub trait PageMetric {
    fn name(&self) -> &'static str;

    /// Disconnect subscriptions and remove lifecycle listeners
    fn stop(&self);
}

/// Lifecycle listeners owned by one metric module
pub(crate) struct ListenerSet {
    lifecycle: Weak<PageLifecycle>,
    ids: RefCell<Vec<ListenerId>>,
}

impl ListenerSet {
    pub(crate) fn new(lifecycle: &Rc<PageLifecycle>) -> Self {
        Self {
            lifecycle: Rc::downgrade(lifecycle),
            ids: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, id: ListenerId) {
        self.ids.borrow_mut().push(id);
    }

    pub(crate) fn remove_all(&self) {
        let ids: Vec<ListenerId> = self.ids.borrow_mut().drain(..).collect();
        if let Some(lifecycle) = self.lifecycle.upgrade() {
            for id in ids {
                lifecycle.remove(id);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::lifecycle::PageLifecycle;
    use crate::observer::EntrySource;
    use crate::scheduler::ManualScheduler;
    use crate::store::{MetricCallbacks, MetricRecorder, MetricStore};

    /// A manual host with a recorder-backed store
    pub(crate) struct Harness {
        pub ctx: MetricContext,
        pub scheduler: Rc<ManualScheduler>,
        pub store: Rc<MetricStore>,
        pub recorder: Rc<MetricRecorder>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self::with(ManualScheduler::new(), EntrySource::new())
        }

        pub(crate) fn with(scheduler: ManualScheduler, entries: EntrySource) -> Self {
            let (host, scheduler) = PageHost::manual_with(scheduler, entries, PageLifecycle::new());
            let visibility = Rc::new(VisibilityTracker::new(&host.lifecycle));
            let recorder = Rc::new(MetricRecorder::new());
            let store = MetricStore::new(Rc::clone(&recorder) as Rc<dyn MetricCallbacks>);
            Self {
                ctx: MetricContext::new(host, visibility, Rc::new(VitalsConfig::default())),
                scheduler,
                store,
                recorder,
            }
        }

        pub(crate) fn host(&self) -> &PageHost {
            &self.ctx.host
        }
    }
}
