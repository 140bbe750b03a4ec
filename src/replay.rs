//! Trace replay
//!
//! Drives a [`VitalsSession`] over a [`ManualScheduler`] from a recorded
//! trace and collects every notification into a [`ReplayReport`].

use crate::config::VitalsConfig;
use crate::error::VitalsError;
use crate::host::PageHost;
use crate::lifecycle::{PageLifecycle, PageSignal};
use crate::observer::EntrySource;
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::schema::{TraceAdapter, TraceEvent, TRACE_SCHEMA_VERSION};
use crate::session::VitalsSession;
use crate::store::{MetricCallbacks, MetricRecorder};
use crate::types::{EntryCategory, MetricName, MetricReport, MetricsRecord};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use uuid::Uuid;

/// How a trace is replayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayOptions {
    pub config: VitalsConfig,
    /// Whether the simulated host offers idle callbacks
    pub idle_supported: bool,
    /// Entry categories the simulated host does not produce
    pub unsupported: Vec<EntryCategory>,
    /// Hide the page after the last event if the trace left it visible
    pub hide_at_end: bool,
    /// Run every pending task before reporting
    pub settle: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            config: VitalsConfig::default(),
            idle_supported: true,
            unsupported: Vec::new(),
            hide_at_end: true,
            settle: true,
        }
    }
}

impl ReplayOptions {
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        let options: ReplayOptions = serde_json::from_str(json)?;
        options.config.validate()?;
        Ok(options)
    }

    pub fn with_config(mut self, config: VitalsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_unsupported(mut self, categories: &[EntryCategory]) -> Self {
        self.unsupported = categories.to_vec();
        self
    }

    pub fn with_hide_at_end(mut self, hide_at_end: bool) -> Self {
        self.hide_at_end = hide_at_end;
        self
    }

    fn supported(&self) -> Vec<EntryCategory> {
        EntryCategory::ALL
            .into_iter()
            .filter(|c| !self.unsupported.contains(c))
            .collect()
    }
}

/// Producer metadata embedded in every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub schema_version: String,
    pub producer: Producer,
    /// RFC 3339
    pub computed_at_utc: String,
    pub events_replayed: usize,
    /// Number of `on_update` notifications
    pub updates: usize,
    /// Every `on_metric` notification, in order
    pub reports: Vec<MetricReport>,
    /// Final metric values
    pub metrics: MetricsRecord,
    /// Enabled metrics the simulated host could not support
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<MetricName>,
}

impl ReplayReport {
    pub fn to_json(&self) -> Result<String, VitalsError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, VitalsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Stateful replayer; apply events one at a time, then [`finish`](Self::finish)
pub struct TraceReplayer {
    session: VitalsSession,
    scheduler: Rc<ManualScheduler>,
    recorder: Rc<MetricRecorder>,
    options: ReplayOptions,
    instance_id: String,
    events_replayed: usize,
}

impl TraceReplayer {
    pub fn new(options: ReplayOptions) -> Result<Self, VitalsError> {
        Self::with_instance_id(options, Uuid::new_v4().to_string())
    }

    /// Create a replayer with a specific instance ID
    pub fn with_instance_id(
        options: ReplayOptions,
        instance_id: String,
    ) -> Result<Self, VitalsError> {
        let scheduler = if options.idle_supported {
            ManualScheduler::new()
        } else {
            ManualScheduler::without_idle()
        };
        let entries = EntrySource::with_supported(&options.supported());
        let (host, scheduler) = PageHost::manual_with(scheduler, entries, PageLifecycle::new());

        let recorder = Rc::new(MetricRecorder::new());
        let session = VitalsSession::start(
            host,
            options.config.clone(),
            Rc::clone(&recorder) as Rc<dyn MetricCallbacks>,
        )?;

        Ok(Self {
            session,
            scheduler,
            recorder,
            options,
            instance_id,
            events_replayed: 0,
        })
    }

    /// Move the clock to a lifecycle timestamp, or use the current time
    fn timestamp(&self, at: Option<f64>) -> f64 {
        match at {
            Some(at) => {
                if at > self.scheduler.now() {
                    self.scheduler.advance_to(at);
                }
                at
            }
            None => self.scheduler.now(),
        }
    }

    /// Validate and apply one event
    pub fn apply(&mut self, event: &TraceEvent) -> Result<(), VitalsError> {
        event.validate().map_err(|e| {
            VitalsError::InvalidTraceEvent(format!(
                "event {} ({}): {}",
                self.events_replayed,
                event.kind(),
                e
            ))
        })?;

        let host = self.session.host().clone();
        match event {
            TraceEvent::Navigation { timing } => host.entries.set_navigation_timing(timing.clone()),
            TraceEvent::Entry { entry, queued } => {
                host.entries.emit(entry.clone());
                if !queued {
                    host.entries.deliver();
                }
            }
            TraceEvent::Deliver => {
                host.entries.deliver();
            }
            TraceEvent::Hidden { at } => host.lifecycle.hide(self.timestamp(*at)),
            TraceEvent::Visible { at } => host.lifecycle.show(self.timestamp(*at)),
            TraceEvent::PrerenderingChange => host.lifecycle.dispatch(PageSignal::PrerenderingChange),
            TraceEvent::Restore { at } => host.lifecycle.restore_from_cache(self.timestamp(*at)),
            TraceEvent::Load => host.lifecycle.complete_load(),
            TraceEvent::KeyDown => host.lifecycle.dispatch(PageSignal::KeyDown),
            TraceEvent::Click => host.lifecycle.dispatch(PageSignal::Click),
            TraceEvent::Advance { ms } => self.scheduler.advance(*ms),
            TraceEvent::Idle => {
                self.scheduler.run_idle();
            }
            TraceEvent::Frame => {
                self.scheduler.run_animation_frame();
            }
            TraceEvent::Flush => self.scheduler.flush(),
        }

        self.events_replayed += 1;
        tracing::trace!(event = event.kind(), now = self.scheduler.now(), "trace event applied");
        Ok(())
    }

    pub fn apply_all(&mut self, events: &[TraceEvent]) -> Result<(), VitalsError> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    pub fn metrics(&self) -> MetricsRecord {
        self.session.metrics()
    }

    /// `on_metric` notifications so far
    pub fn reports(&self) -> Vec<MetricReport> {
        self.recorder.reports()
    }

    pub fn events_replayed(&self) -> usize {
        self.events_replayed
    }

    /// Apply the end-of-trace policy and build the report
    pub fn finish(mut self) -> ReplayReport {
        let host = self.session.host().clone();
        if self.options.hide_at_end && !host.lifecycle.is_hidden() {
            host.lifecycle.hide(self.scheduler.now());
        }
        if self.options.settle {
            self.scheduler.flush();
        }

        let report = ReplayReport {
            schema_version: TRACE_SCHEMA_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            events_replayed: self.events_replayed,
            updates: self.recorder.updates(),
            reports: self.recorder.reports(),
            metrics: self.session.metrics(),
            skipped: self.session.skipped().to_vec(),
        };
        self.session.shutdown();
        report
    }
}

/// Replay a parsed trace from a fresh page session
pub fn replay_trace(
    events: &[TraceEvent],
    options: ReplayOptions,
) -> Result<ReplayReport, VitalsError> {
    let mut replayer = TraceReplayer::new(options)?;
    replayer.apply_all(events)?;
    Ok(replayer.finish())
}

/// Parse (NDJSON or JSON array), validate and replay a trace
pub fn replay_json(input: &str, options: ReplayOptions) -> Result<ReplayReport, VitalsError> {
    let events = TraceAdapter::load(input)?;
    replay_trace(&events, options)
}
