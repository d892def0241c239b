use crate::types::{LonLat, Measurement, XcoError, XcoResult};
use serde::{Deserialize, Serialize};

/// Quality and value-range screening parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityParams {
    /// Flag value marking a scientifically usable sounding
    pub good_flag: i32,
    /// Lowest accepted XCO2 in ppm (inclusive)
    pub min_xco2: f64,
    /// Highest accepted XCO2 in ppm (inclusive)
    pub max_xco2: f64,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            good_flag: 0,
            min_xco2: 380.0,
            max_xco2: 420.0,
        }
    }
}

impl QualityParams {
    pub fn validate(&self) -> XcoResult<()> {
        if !self.min_xco2.is_finite() || !self.max_xco2.is_finite() || self.min_xco2 > self.max_xco2 {
            return Err(XcoError::Validation(format!(
                "invalid XCO2 range [{}, {}]",
                self.min_xco2, self.max_xco2
            )));
        }
        Ok(())
    }
}

/// Drops soundings that are flagged, out of range, or malformed.
///
/// Malformed records are expected noise in Level-2 swaths and are never
/// reported as errors.
#[derive(Debug, Clone)]
pub struct QualityFilter {
    params: QualityParams,
}

impl QualityFilter {
    pub fn new(params: QualityParams) -> Self {
        Self { params }
    }

    /// Filter with the standard OCO-2 screening (flag 0, 380-420 ppm)
    pub fn standard() -> Self {
        Self::new(QualityParams::default())
    }

    pub fn params(&self) -> &QualityParams {
        &self.params
    }

    /// The usable XCO2 value of a sounding, or `None` if it must be dropped
    pub fn accepted_xco2(&self, measurement: &Measurement) -> Option<f64> {
        if measurement.quality_flag != Some(self.params.good_flag) {
            return None;
        }
        if !is_valid_coordinate(measurement.position()) {
            return None;
        }

        let xco2 = measurement.xco2.filter(|v| v.is_finite())?;
        (xco2 >= self.params.min_xco2 && xco2 <= self.params.max_xco2).then_some(xco2)
    }

    pub fn accepts(&self, measurement: &Measurement) -> bool {
        self.accepted_xco2(measurement).is_some()
    }
}

/// Finite longitude and a latitude within [-90, 90]
pub fn is_valid_coordinate(coord: LonLat) -> bool {
    let [lon, lat] = coord;
    lon.is_finite() && lat.is_finite() && (-90.0..=90.0).contains(&lat)
}
