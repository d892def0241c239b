//! I/O modules for loading granules and talking to the viewport service

pub mod record_store;
pub mod client;
pub mod debounce;
#[cfg(feature = "nc4")]
pub mod nc4;

pub use record_store::{Granule, GranuleFormat, GranuleSummary, RecordStore};
pub use client::{DebouncedViewport, ViewportClient, ViewportPayload, ViewportState};
pub use debounce::Debouncer;
