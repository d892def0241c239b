//! Core viewport processing modules

pub mod quality;
pub mod spatial;
pub mod date_filter;
pub mod sampler;
pub mod geometry;
pub mod pipeline;
pub mod cache;

// Re-export main types
pub use quality::{QualityFilter, QualityParams};
pub use spatial::{SpatialFilter, normalize_longitude};
pub use date_filter::DateFilter;
pub use sampler::{DetailLevel, SamplingParams, ZoomSampler};
pub use geometry::GeometryBuilder;
pub use pipeline::{PipelineConfig, PipelineStats, ViewportPipeline, ViewportResponse};
pub use cache::{CacheLookup, CacheStats, ViewportCache, ViewportKey};
