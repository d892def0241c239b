use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `[longitude, latitude]` pair in degrees
pub type LonLat = [f64; 2];

/// Sounding identifier. The leading digits encode the acquisition time
/// as `YYYYMMDDhhmmss` followed by sub-second and footprint digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSoundingId", into = "String")]
pub struct SoundingId(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSoundingId {
    Number(u64),
    Text(String),
}

impl TryFrom<RawSoundingId> for SoundingId {
    type Error = String;

    fn try_from(raw: RawSoundingId) -> Result<Self, Self::Error> {
        match raw {
            RawSoundingId::Number(n) => Ok(SoundingId(n)),
            RawSoundingId::Text(s) => s.parse(),
        }
    }
}

impl From<SoundingId> for String {
    fn from(id: SoundingId) -> Self {
        id.0.to_string()
    }
}

impl FromStr for SoundingId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(SoundingId)
            .map_err(|e| format!("invalid sounding id '{}': {}", s, e))
    }
}

impl fmt::Display for SoundingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SoundingId {
    /// Acquisition timestamp, if the id carries at least `YYYYMMDDhhmmss`
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let digits = self.0.to_string();
        if digits.len() < 14 {
            return None;
        }
        NaiveDateTime::parse_from_str(&digits[0..14], "%Y%m%d%H%M%S").ok()
    }

    /// Acquisition date. Only the `YYYYMMDD` prefix has to be valid.
    pub fn date(&self) -> Option<NaiveDate> {
        let digits = self.0.to_string();
        if digits.len() < 14 {
            return None;
        }
        NaiveDate::parse_from_str(&digits[0..8], "%Y%m%d").ok()
    }
}

/// A single XCO2 sounding as loaded from a granule.
///
/// Positions that are missing in the source are stored as NaN; the value
/// and the quality flag are optional. Nothing here is validated, that is
/// the job of the quality filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sounding_id: SoundingId,
    pub longitude: f64,
    pub latitude: f64,
    pub xco2: Option<f64>,            // ppm
    pub quality_flag: Option<i32>,
    pub footprint: Vec<LonLat>,       // corner vertices in source order
}

impl Measurement {
    pub fn position(&self) -> LonLat {
        [self.longitude, self.latitude]
    }
}

/// Rendering mode requested by the map client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Point,
    Polygon,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Point => write!(f, "point"),
            ViewMode::Polygon => write!(f, "polygon"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = XcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "point" => Ok(ViewMode::Point),
            "polygon" => Ok(ViewMode::Polygon),
            other => Err(XcoError::Validation(format!(
                "unsupported view_mode '{}', expected 'point' or 'polygon'",
                other
            ))),
        }
    }
}

/// Geospatial bounding box of the visible map area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> XcoResult<Self> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(XcoError::Validation(format!(
                "bounds must be finite numbers, got {:?}",
                values
            )));
        }
        if min_lat > max_lat {
            return Err(XcoError::Validation(format!(
                "bounds min latitude {} is above max latitude {}",
                min_lat, max_lat
            )));
        }

        Ok(Self {
            min_lon,
            max_lon,
            min_lat: min_lat.max(-90.0),
            max_lat: max_lat.min(90.0),
        })
    }
}

/// Parses `minLon,minLat,maxLon,maxLat`
impl FromStr for BoundingBox {
    type Err = XcoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(XcoError::Validation(format!(
                "bounds must have four comma-separated values (minLon,minLat,maxLon,maxLat), got '{}'",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                XcoError::Validation(format!("bounds value '{}' is not a number", part))
            })?;
        }

        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

/// Inclusive calendar date range; either end may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range from raw query values. Empty strings count as absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> XcoResult<Self> {
        let start = start.map(parse_request_date).transpose()?.flatten();
        let end = end.map(parse_request_date).transpose()?.flatten();

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(XcoError::Validation(format!(
                    "start_date {} is after end_date {}",
                    s, e
                )));
            }
        }

        Ok(Self { start, end })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    /// Whether `[first, last]` shares at least one day with this range
    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.start.map_or(true, |s| last >= s) && self.end.map_or(true, |e| first <= e)
    }
}

fn parse_request_date(raw: &str) -> XcoResult<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.date_naive()))
        .map_err(|_| XcoError::Validation(format!("'{}' is not an ISO date", raw)))
}

/// Everything the pipeline needs to answer one viewport request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub bounds: BoundingBox,
    pub zoom: f64,
    pub view_mode: ViewMode,
    pub dates: DateRange,
}

impl RequestConfig {
    pub fn new(bounds: BoundingBox, zoom: f64, view_mode: ViewMode, dates: DateRange) -> XcoResult<Self> {
        if !zoom.is_finite() || zoom < 0.0 {
            return Err(XcoError::Validation(format!(
                "zoom must be a non-negative number, got {}",
                zoom
            )));
        }
        Ok(Self {
            bounds,
            zoom,
            view_mode,
            dates,
        })
    }
}

/// Renderable output, tagged by geometry kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Feature {
    Point {
        position: LonLat,
        xco2: f64,
        sounding_id: SoundingId,
    },
    Polygon {
        position: LonLat,
        vertices: [LonLat; 4],
        xco2: f64,
        sounding_id: SoundingId,
    },
}

impl Feature {
    pub fn xco2(&self) -> f64 {
        match self {
            Feature::Point { xco2, .. } | Feature::Polygon { xco2, .. } => *xco2,
        }
    }

    pub fn position(&self) -> LonLat {
        match self {
            Feature::Point { position, .. } | Feature::Polygon { position, .. } => *position,
        }
    }

    pub fn sounding_id(&self) -> SoundingId {
        match self {
            Feature::Point { sounding_id, .. } | Feature::Polygon { sounding_id, .. } => *sounding_id,
        }
    }

    pub fn vertices(&self) -> Option<&[LonLat; 4]> {
        match self {
            Feature::Point { .. } => None,
            Feature::Polygon { vertices, .. } => Some(vertices),
        }
    }
}

/// Error types for XCO2 processing
#[derive(Debug, thiserror::Error)]
pub enum XcoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Source data error: {0}")]
    SourceData(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for XCO2 operations
pub type XcoResult<T> = Result<T, XcoError>;
