//! pagevitals.trace.v1 schema
//!
//! This module defines the recorded-session input format: host events in
//! order, as NDJSON or a JSON array.

mod adapter;
mod trace;

pub use adapter::*;
pub use trace::*;
