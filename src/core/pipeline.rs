use crate::core::date_filter::DateFilter;
use crate::core::geometry::GeometryBuilder;
use crate::core::quality::{QualityFilter, QualityParams};
use crate::core::sampler::{DetailLevel, SamplingParams, ZoomSampler};
use crate::core::spatial::SpatialFilter;
use crate::io::record_store::{Granule, RecordStore};
use crate::types::{Feature, RequestConfig, ViewMode, XcoError, XcoResult};
use serde::{Deserialize, Serialize};

/// Tunables for the viewport pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub quality: QualityParams,
    pub sampling: SamplingParams,
    /// Polygon mode returns nothing below this zoom
    pub polygon_min_zoom: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: QualityParams::default(),
            sampling: SamplingParams::default(),
            polygon_min_zoom: 4.0,
        }
    }
}

/// Record counts after each stage, summed over granules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub granules_scanned: usize,
    pub scanned: usize,
    pub filtered: usize,
    pub sampled: usize,
    pub emitted: usize,
}

impl PipelineStats {
    fn merge(mut self, other: PipelineStats) -> PipelineStats {
        self.granules_scanned += other.granules_scanned;
        self.scanned += other.scanned;
        self.filtered += other.filtered;
        self.sampled += other.sampled;
        self.emitted += other.emitted;
        self
    }
}

/// Result of one viewport request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewportResponse {
    pub data: Vec<Feature>,
    pub view_mode: ViewMode,
    pub zoom_level: DetailLevel,
    pub point_radius_km: f64,
    #[serde(skip)]
    pub stats: PipelineStats,
}

/// Quality filter, spatial filter, date filter, sampler and geometry
/// builder chained over the record store.
///
/// Stateless between calls; the same request over the same store always
/// yields the same features in the same order.
#[derive(Debug, Clone)]
pub struct ViewportPipeline {
    config: PipelineConfig,
    quality: QualityFilter,
    sampler: ZoomSampler,
}

impl ViewportPipeline {
    pub fn new(config: PipelineConfig) -> XcoResult<Self> {
        config.quality.validate()?;
        if !config.polygon_min_zoom.is_finite() {
            return Err(XcoError::Validation(format!(
                "polygon_min_zoom must be finite, got {}",
                config.polygon_min_zoom
            )));
        }

        Ok(Self::from_checked(config))
    }

    /// Pipeline with the default thresholds, strides and polygon zoom
    pub fn standard() -> Self {
        Self::from_checked(PipelineConfig::default())
    }

    fn from_checked(config: PipelineConfig) -> Self {
        Self {
            quality: QualityFilter::new(config.quality.clone()),
            sampler: ZoomSampler::new(config.sampling.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one request.
    ///
    /// Fails only when the store holds no granules at all.
    pub fn run(&self, store: &RecordStore, request: &RequestConfig) -> XcoResult<ViewportResponse> {
        if store.granules().is_empty() {
            return Err(XcoError::SourceData(match store.root() {
                Some(root) => format!("no readable granules under {}", root.display()),
                None => "record store holds no granules".to_string(),
            }));
        }

        let level = DetailLevel::for_zoom(request.zoom);
        let mut response = ViewportResponse {
            data: Vec::new(),
            view_mode: request.view_mode,
            zoom_level: level,
            point_radius_km: level.point_radius_km(),
            stats: PipelineStats::default(),
        };

        if request.view_mode == ViewMode::Polygon && request.zoom < self.config.polygon_min_zoom {
            log::info!(
                "Zoom {} too low for polygon view (min: {})",
                request.zoom,
                self.config.polygon_min_zoom
            );
            return Ok(response);
        }

        let spatial = SpatialFilter::new(&request.bounds);
        let dates = DateFilter::new(request.dates);
        let builder = GeometryBuilder::new(request.view_mode);
        let stride = self.sampler.stride_for(request.zoom);

        let candidates: Vec<&Granule> = store
            .granules()
            .iter()
            .filter(|g| dates.accepts_granule(g))
            .collect();

        #[cfg(feature = "parallel")]
        let per_granule: Vec<(Vec<Feature>, PipelineStats)> = {
            use rayon::prelude::*;
            candidates
                .par_iter()
                .map(|g| self.process_granule(g, &spatial, &dates, &builder, stride))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let per_granule: Vec<(Vec<Feature>, PipelineStats)> = candidates
            .iter()
            .map(|g| self.process_granule(g, &spatial, &dates, &builder, stride))
            .collect();

        for (features, stats) in per_granule {
            response.data.extend(features);
            response.stats = response.stats.merge(stats);
        }

        log::info!(
            "Viewport {:?} zoom {} ({:?}, stride {}) mode {}: {} of {} records",
            request.bounds,
            request.zoom,
            level,
            stride,
            request.view_mode,
            response.stats.emitted,
            response.stats.scanned
        );
        Ok(response)
    }

    fn process_granule(
        &self,
        granule: &Granule,
        spatial: &SpatialFilter,
        dates: &DateFilter,
        builder: &GeometryBuilder,
        stride: u64,
    ) -> (Vec<Feature>, PipelineStats) {
        let mut stats = PipelineStats {
            granules_scanned: 1,
            ..PipelineStats::default()
        };
        let mut features = Vec::new();

        for measurement in granule.measurements() {
            stats.scanned += 1;

            let Some(xco2) = self.quality.accepted_xco2(measurement) else {
                continue;
            };
            if !spatial.contains_measurement(measurement) || !dates.accepts(measurement) {
                continue;
            }
            stats.filtered += 1;

            if !self.sampler.keeps(measurement.sounding_id, stride) {
                continue;
            }
            stats.sampled += 1;

            if let Some(feature) = builder.build(measurement, xco2) {
                features.push(feature);
            }
        }

        stats.emitted = features.len();
        log::debug!(
            "{}: scanned {} filtered {} sampled {} emitted {}",
            granule.name(),
            stats.scanned,
            stats.filtered,
            stats.sampled,
            stats.emitted
        );
        (features, stats)
    }
}
