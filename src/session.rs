//! Page session orchestration
//!
//! A [`VitalsSession`] owns everything that lives for one page session: the
//! visibility tracker, the metric store and the running metric modules.

use crate::config::VitalsConfig;
use crate::error::VitalsError;
use crate::host::PageHost;
use crate::metrics::{
    FirstContentfulPaintMetric, FirstInputDelayMetric, InteractionMetric,
    LargestContentfulPaintMetric, LayoutShiftMetric, MetricContext, NavigationSlots,
    NavigationTimersMetric, PageMetric, TimeToFirstByteMetric,
};
use crate::store::{MetricCallbacks, MetricSlot, MetricStore};
use crate::types::{MetricName, MetricsRecord};
use crate::visibility::VisibilityTracker;
use std::rc::Rc;

fn boxed<M: PageMetric + 'static>(
    result: Result<M, VitalsError>,
) -> Result<Box<dyn PageMetric>, VitalsError> {
    result.map(|m| Box::new(m) as Box<dyn PageMetric>)
}

/// Single-field modules in start order
const SINGLE_METRICS: [MetricName; 6] = [
    MetricName::Cls,
    MetricName::Inp,
    MetricName::Lcp,
    MetricName::Fcp,
    MetricName::Fid,
    MetricName::Ttfb,
];

fn start_single(
    name: MetricName,
    ctx: &MetricContext,
    slot: MetricSlot,
) -> Result<Box<dyn PageMetric>, VitalsError> {
    match name {
        MetricName::Cls => boxed(LayoutShiftMetric::start(ctx, slot)),
        MetricName::Inp => boxed(InteractionMetric::start(ctx, slot)),
        MetricName::Lcp => boxed(LargestContentfulPaintMetric::start(ctx, slot)),
        MetricName::Fcp => boxed(FirstContentfulPaintMetric::start(ctx, slot)),
        MetricName::Fid => boxed(FirstInputDelayMetric::start(ctx, slot)),
        MetricName::Ttfb => boxed(TimeToFirstByteMetric::start(ctx, slot)),
        other => Err(VitalsError::InvalidConfig(format!(
            "{other} has no single-metric module"
        ))),
    }
}

/// All metric modules of one page session
pub struct VitalsSession {
    ctx: MetricContext,
    store: Rc<MetricStore>,
    modules: Vec<Box<dyn PageMetric>>,
    skipped: Vec<MetricName>,
}

impl VitalsSession {
    /// Start every enabled metric module.
    ///
    /// Modules the host cannot support are skipped (see [`skipped`](Self::skipped));
    /// only an invalid configuration is an error.
    pub fn start(
        host: PageHost,
        config: VitalsConfig,
        callbacks: Rc<dyn MetricCallbacks>,
    ) -> Result<Self, VitalsError> {
        config.validate()?;

        let visibility = Rc::new(VisibilityTracker::new(&host.lifecycle));
        let ctx = MetricContext::new(host, visibility, Rc::new(config));
        let store = MetricStore::new(callbacks);

        let mut session = Self {
            ctx,
            store,
            modules: Vec::new(),
            skipped: Vec::new(),
        };

        for name in SINGLE_METRICS {
            if !session.ctx.config.is_enabled(name) {
                continue;
            }
            let slot = session.store.claim(name)?;
            let result = start_single(name, &session.ctx, slot);
            session.register(&[name], result);
        }

        if session.ctx.config.any_enabled(&NavigationSlots::NAMES) {
            let mut slots = NavigationSlots::new();
            for name in NavigationSlots::NAMES {
                if session.ctx.config.is_enabled(name) {
                    slots.push(session.store.claim(name)?)?;
                }
            }
            let names = slots.names();
            let result = boxed(NavigationTimersMetric::start(&session.ctx, slots));
            session.register(&names, result);
        }

        tracing::debug!(
            running = session.modules.len(),
            skipped = session.skipped.len(),
            "vitals session started"
        );
        Ok(session)
    }

    fn register(&mut self, names: &[MetricName], result: Result<Box<dyn PageMetric>, VitalsError>) {
        match result {
            Ok(module) => self.modules.push(module),
            Err(err) => {
                for name in names {
                    self.ctx.debug_warn(name.as_str(), &err);
                }
                self.skipped.extend_from_slice(names);
            }
        }
    }

    /// Snapshot of the latest value of every metric
    pub fn metrics(&self) -> MetricsRecord {
        self.store.snapshot()
    }

    pub fn get(&self, name: MetricName) -> Option<f64> {
        self.store.get(name)
    }

    pub fn host(&self) -> &PageHost {
        &self.ctx.host
    }

    pub fn config(&self) -> &VitalsConfig {
        &self.ctx.config
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.ctx.visibility
    }

    /// Names of the running modules, in start order
    pub fn running(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Enabled metrics whose module could not start
    pub fn skipped(&self) -> &[MetricName] {
        &self.skipped
    }

    /// Stop every module. Values already in the record stay readable.
    pub fn shutdown(&mut self) {
        for module in self.modules.drain(..) {
            module.stop();
        }
    }
}

impl Drop for VitalsSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
