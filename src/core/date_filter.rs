use crate::io::record_store::Granule;
use crate::types::{DateRange, Measurement};

/// Sounding-date screening for an optional inclusive date range
#[derive(Debug, Clone, Copy)]
pub struct DateFilter {
    range: DateRange,
}

impl DateFilter {
    pub fn new(range: DateRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    /// Soundings without a parseable date only pass an unbounded range
    pub fn accepts(&self, measurement: &Measurement) -> bool {
        if self.range.is_unbounded() {
            return true;
        }
        measurement
            .sounding_id
            .date()
            .map_or(false, |date| self.range.contains(date))
    }

    /// Whether any sounding of the granule can pass, judged by its date span
    pub fn accepts_granule(&self, granule: &Granule) -> bool {
        if self.range.is_unbounded() {
            return true;
        }
        granule
            .date_span()
            .map_or(false, |(first, last)| self.range.overlaps(first, last))
    }
}
