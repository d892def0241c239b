use crate::types::{BoundingBox, Measurement};

/// Wrap a longitude into [-180, 180]. Values already in range are kept
/// as-is so that both 180 and -180 survive unchanged.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Closed-interval viewport test with antimeridian handling
#[derive(Debug, Clone, Copy)]
pub struct SpatialFilter {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
    lon_mode: LonMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LonMode {
    /// Viewport spans the whole globe horizontally
    All,
    /// `min_lon <= lon <= max_lon`
    Regular,
    /// Crosses the antimeridian: `lon >= min_lon || lon <= max_lon`
    Wrapped,
}

impl SpatialFilter {
    pub fn new(bbox: &BoundingBox) -> Self {
        let min_lon = normalize_longitude(bbox.min_lon);
        let max_lon = normalize_longitude(bbox.max_lon);

        let lon_mode = if bbox.max_lon - bbox.min_lon >= 360.0 {
            LonMode::All
        } else if min_lon <= max_lon {
            LonMode::Regular
        } else {
            LonMode::Wrapped
        };

        log::debug!(
            "Spatial filter lon [{}, {}] lat [{}, {}] mode {:?}",
            min_lon, max_lon, bbox.min_lat, bbox.max_lat, lon_mode
        );

        Self {
            min_lon,
            max_lon,
            min_lat: bbox.min_lat,
            max_lat: bbox.max_lat,
            lon_mode,
        }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if !(lat >= self.min_lat && lat <= self.max_lat) {
            return false;
        }

        let lon = normalize_longitude(lon);
        match self.lon_mode {
            LonMode::All => lon.is_finite(),
            LonMode::Regular => lon >= self.min_lon && lon <= self.max_lon,
            LonMode::Wrapped => lon >= self.min_lon || lon <= self.max_lon,
        }
    }

    pub fn contains_measurement(&self, measurement: &Measurement) -> bool {
        self.contains(measurement.longitude, measurement.latitude)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.lon_mode == LonMode::Wrapped
    }
}
