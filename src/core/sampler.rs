use crate::types::{Measurement, SoundingId};
use serde::{Deserialize, Serialize};

/// Detail bucket selected from the map zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// zoom <= 3
    Aggressive,
    /// zoom 4-5
    Moderate,
    /// zoom >= 6, no thinning
    Full,
}

impl DetailLevel {
    pub fn for_zoom(zoom: f64) -> Self {
        match zoom.floor() {
            z if z <= 3.0 => DetailLevel::Aggressive,
            z if z <= 5.0 => DetailLevel::Moderate,
            _ => DetailLevel::Full,
        }
    }

    /// Rendering hint for the point layer radius
    pub fn point_radius_km(&self) -> f64 {
        match self {
            DetailLevel::Aggressive => 100.0,
            DetailLevel::Moderate => 75.0,
            DetailLevel::Full => 50.0,
        }
    }
}

/// Sampling strides per detail level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Keep roughly one sounding in N at zoom <= 3
    pub aggressive_stride: u64,
    /// Keep roughly one sounding in N at zoom 4-5
    pub moderate_stride: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            aggressive_stride: 20,
            moderate_stride: 5,
        }
    }
}

/// Zoom-adaptive thinning.
///
/// Selection is a stride over a hash of the sounding id rather than over
/// the record position, so the kept subset does not depend on which other
/// records made it through the viewport. The same sounding is kept or
/// dropped at a given zoom no matter how the map is panned.
#[derive(Debug, Clone)]
pub struct ZoomSampler {
    params: SamplingParams,
}

impl ZoomSampler {
    pub fn new(params: SamplingParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(SamplingParams::default())
    }

    pub fn stride_for(&self, zoom: f64) -> u64 {
        let stride = match DetailLevel::for_zoom(zoom) {
            DetailLevel::Aggressive => self.params.aggressive_stride,
            DetailLevel::Moderate => self.params.moderate_stride,
            DetailLevel::Full => 1,
        };
        stride.max(1)
    }

    pub fn keeps(&self, sounding_id: SoundingId, stride: u64) -> bool {
        stride <= 1 || splitmix64(sounding_id.0) % stride == 0
    }

    pub fn sample<'a, I>(&self, measurements: I, zoom: f64) -> impl Iterator<Item = &'a Measurement>
    where
        I: IntoIterator<Item = &'a Measurement>,
    {
        let stride = self.stride_for(zoom);
        let sampler = self.clone();
        measurements
            .into_iter()
            .filter(move |m| sampler.keeps(m.sounding_id, stride))
    }
}

/// splitmix64 finalizer; spreads sequential ids evenly over the stride
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
