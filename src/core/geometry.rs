use crate::core::quality::is_valid_coordinate;
use crate::types::{Feature, LonLat, Measurement, ViewMode};

/// Converts screened soundings into renderable features
#[derive(Debug, Clone, Copy)]
pub struct GeometryBuilder {
    mode: ViewMode,
}

impl GeometryBuilder {
    pub fn new(mode: ViewMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Build the feature for one sounding with an already screened value.
    ///
    /// In polygon mode a sounding without exactly four valid footprint
    /// vertices yields `None`.
    pub fn build(&self, measurement: &Measurement, xco2: f64) -> Option<Feature> {
        match self.mode {
            ViewMode::Point => Some(Feature::Point {
                position: measurement.position(),
                xco2,
                sounding_id: measurement.sounding_id,
            }),
            ViewMode::Polygon => {
                let vertices = footprint_vertices(measurement)?;
                Some(Feature::Polygon {
                    position: measurement.position(),
                    vertices,
                    xco2,
                    sounding_id: measurement.sounding_id,
                })
            }
        }
    }
}

/// The four footprint corners in source order, if all are present and valid
pub fn footprint_vertices(measurement: &Measurement) -> Option<[LonLat; 4]> {
    let vertices: [LonLat; 4] = measurement.footprint.as_slice().try_into().ok()?;
    vertices
        .iter()
        .all(|v| is_valid_coordinate(*v))
        .then_some(vertices)
}
