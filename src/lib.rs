//! pagevitals - Deterministic compute engine for client-side page performance metrics
//!
//! pagevitals turns the stream of performance entries and lifecycle signals a
//! page produces into the standard metrics: CLS, INP, LCP, FCP, FID and TTFB,
//! plus the DNS/TCP/DOM/LOAD navigation durations.
//!
//! ## Modules
//!
//! - **Host**: cooperative [`scheduler`], page [`lifecycle`] signals and the
//!   performance timeline [`observer`], bundled as a [`host::PageHost`]
//! - **Metrics**: one aggregator per metric, started together by a
//!   [`session::VitalsSession`] and writing into a shared [`store::MetricStore`]
//! - **Replay**: recorded sessions in the `pagevitals.trace.v1` [`schema`],
//!   replayed deterministically over a virtual clock

pub mod activation;
pub mod config;
pub mod error;
pub mod finalize;
pub mod host;
pub mod lifecycle;
pub mod metrics;
pub mod observer;
pub mod replay;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod store;
pub mod types;
pub mod visibility;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::VitalsConfig;
pub use error::VitalsError;
pub use host::PageHost;
pub use session::VitalsSession;
pub use store::{FnCallbacks, MetricCallbacks, MetricRecorder};
pub use types::{EntryCategory, MetricName, MetricReport, MetricsRecord, RawEntry};

// Replay exports
pub use replay::{replay_json, replay_trace, ReplayOptions, ReplayReport, TraceReplayer};
pub use schema::{TraceAdapter, TraceEvent, TRACE_SCHEMA_VERSION};

/// Engine version embedded in every replay report
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for replay reports
pub const PRODUCER_NAME: &str = "pagevitals";
