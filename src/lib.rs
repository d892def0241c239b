//! xco2map: viewport-driven sampling of satellite XCO2 soundings
//!
//! Loads OCO-2 style sounding records once, then answers map viewport
//! requests with a quality-screened, zoom-thinned set of point or
//! footprint-polygon features.

pub mod types;
pub mod io;
pub mod core;
pub mod config;
pub mod server;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, DateRange, Feature, Measurement, RequestConfig, SoundingId, ViewMode,
    XcoError, XcoResult,
};

pub use crate::io::{RecordStore, ViewportClient};
pub use crate::core::{PipelineConfig, ViewportCache, ViewportPipeline, ViewportResponse};
