//! `vitals-sensorflow`: per-device, per-day running statistics for wearable
//! and room sensor telemetry.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! module talks to its siblings only through what is re-exported here, so
//! `routes/*.rs` import from `crate::` and never reach into `store` or
//! `models` paths directly.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    AggregateRow, DataPayload, LocationPayload, LocationRow, RecordKey, RecordsQuery, Sample,
    WristPayload,
};
pub use store::{AggregateStore, BackingFile};
