use crate::types::{LonLat, Measurement, SoundingId, XcoError, XcoResult};
use chrono::NaiveDate;
use csv::StringRecord;
use regex::Regex;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const SOUNDING_ID: &str = "sounding_id";
const LONGITUDE: &str = "longitude";
const LATITUDE: &str = "latitude";
const XCO2: &str = "xco2";
const QUALITY_FLAG: &str = "xco2_quality_flag";
const VERTEX_COUNT: usize = 4;

/// Soundings loaded from one source file
#[derive(Debug, Clone)]
pub struct Granule {
    name: String,
    product_date: Option<NaiveDate>,
    date_span: Option<(NaiveDate, NaiveDate)>,
    measurements: Vec<Measurement>,
}

impl Granule {
    pub fn new(name: impl Into<String>, measurements: Vec<Measurement>) -> Self {
        let name = name.into();
        let product_date = product_date_from_name(&name);

        let date_span = measurements
            .iter()
            .filter_map(|m| m.sounding_id.date())
            .fold(None, |span: Option<(NaiveDate, NaiveDate)>, date| match span {
                None => Some((date, date)),
                Some((first, last)) => Some((first.min(date), last.max(date))),
            });

        Self {
            name,
            product_date,
            date_span,
            measurements,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Date encoded in an OCO-2 Lite file name, e.g. `oco2_LtCO2_150105_...`
    pub fn product_date(&self) -> Option<NaiveDate> {
        self.product_date
    }

    /// First and last sounding date in the granule
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.date_span
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn summary(&self) -> GranuleSummary {
        GranuleSummary {
            name: self.name.clone(),
            product_date: self.product_date,
            first_date: self.date_span.map(|(first, _)| first),
            last_date: self.date_span.map(|(_, last)| last),
            records: self.measurements.len(),
        }
    }
}

/// Inventory entry reported by the `/granules` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GranuleSummary {
    pub name: String,
    pub product_date: Option<NaiveDate>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub records: usize,
}

/// A file that could not be loaded
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Read-only in-memory store of all granules under a data directory.
///
/// Loaded once at start-up and shared between requests without locking.
#[derive(Debug, Default)]
pub struct RecordStore {
    root: Option<PathBuf>,
    granules: Vec<Granule>,
    load_failures: Vec<LoadFailure>,
}

impl RecordStore {
    /// Load every `*.csv`, `*.csv.gz` and `*.nc4` granule in `data_dir`.
    ///
    /// Files that fail to parse are logged and skipped; a missing or
    /// unreadable directory is an error.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> XcoResult<Self> {
        let data_dir = data_dir.as_ref();
        log::info!("Looking for granules in: {}", data_dir.display());

        let files = Self::discover_files(data_dir)?;
        log::info!("Found {} granule files", files.len());
        let start_time = std::time::Instant::now();

        #[cfg(feature = "parallel")]
        let results: Vec<(PathBuf, XcoResult<Granule>)> = {
            use rayon::prelude::*;
            files
                .into_par_iter()
                .map(|path| {
                    let result = Self::read_granule(&path);
                    (path, result)
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(PathBuf, XcoResult<Granule>)> = files
            .into_iter()
            .map(|path| {
                let result = Self::read_granule(&path);
                (path, result)
            })
            .collect();

        let mut granules = Vec::new();
        let mut load_failures = Vec::new();
        for (path, result) in results {
            match result {
                Ok(granule) => {
                    log::debug!(
                        "Loaded {} ({} records, span {:?})",
                        granule.name(),
                        granule.measurements().len(),
                        granule.date_span()
                    );
                    granules.push(granule);
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    load_failures.push(LoadFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let store = Self {
            root: Some(data_dir.to_path_buf()),
            granules,
            load_failures,
        };
        log::info!(
            "Loaded {} records from {} granules in {:.2}s ({} failed)",
            store.len(),
            store.granules.len(),
            start_time.elapsed().as_secs_f64(),
            store.load_failures.len()
        );
        Ok(store)
    }

    /// Build a store from granules already in memory
    pub fn from_granules(granules: Vec<Granule>) -> Self {
        Self {
            root: None,
            granules,
            load_failures: Vec::new(),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn granules(&self) -> &[Granule] {
        &self.granules
    }

    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }

    /// Total number of soundings across granules
    pub fn len(&self) -> usize {
        self.granules.iter().map(|g| g.measurements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Granule files in the directory, sorted by file name
    pub fn discover_files(data_dir: &Path) -> XcoResult<Vec<PathBuf>> {
        if !data_dir.is_dir() {
            return Err(XcoError::SourceData(format!(
                "data directory not found: {}",
                data_dir.display()
            )));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(data_dir)? {
            let path = entry?.path();
            let is_granule = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(GranuleFormat::from_name)
                .is_some();
            if is_granule && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read one granule file, decompressing `.gz` transparently
    pub fn read_granule(path: &Path) -> XcoResult<Granule> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let measurements = match GranuleFormat::from_name(&name) {
            Some(GranuleFormat::Csv) => Self::read_measurements(File::open(path)?),
            Some(GranuleFormat::CsvGz) => {
                Self::read_measurements(flate2::read::GzDecoder::new(File::open(path)?))
            }
            Some(GranuleFormat::Nc4) => Self::read_nc4(path),
            None => Err(XcoError::SourceData("unrecognized granule format".to_string())),
        }
        .map_err(|e| match e {
            XcoError::Io(_) => e,
            other => XcoError::SourceData(format!("{}: {}", name, other)),
        })?;

        Ok(Granule::new(name, measurements))
    }

    #[cfg(feature = "nc4")]
    fn read_nc4(path: &Path) -> XcoResult<Vec<Measurement>> {
        crate::io::nc4::read_measurements(path)
    }

    #[cfg(not(feature = "nc4"))]
    fn read_nc4(_path: &Path) -> XcoResult<Vec<Measurement>> {
        Err(XcoError::SourceData(
            "netCDF granules need xco2map built with the `nc4` feature".to_string(),
        ))
    }

    /// Parse sounding rows from CSV.
    ///
    /// Cells that are empty or not numbers become missing values. Rows
    /// without a usable sounding id are dropped.
    pub fn read_measurements<R: Read>(reader: R) -> XcoResult<Vec<Measurement>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = ColumnIndex::from_headers(reader.headers()?)?;

        let mut measurements = Vec::new();
        let mut dropped = 0usize;
        for row in reader.records() {
            let row = row?;
            match columns.parse_row(&row) {
                Some(m) => measurements.push(m),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            log::debug!("Dropped {} rows without a sounding id", dropped);
        }
        Ok(measurements)
    }
}

/// Granule file formats, by file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GranuleFormat {
    Csv,
    CsvGz,
    /// OCO-2 Lite netCDF-4
    Nc4,
}

impl GranuleFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.ends_with(".csv") {
            Some(GranuleFormat::Csv)
        } else if name.ends_with(".csv.gz") {
            Some(GranuleFormat::CsvGz)
        } else if name.ends_with(".nc4") {
            Some(GranuleFormat::Nc4)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct ColumnIndex {
    sounding_id: usize,
    longitude: usize,
    latitude: usize,
    xco2: usize,
    quality_flag: usize,
    vertices: [(Option<usize>, Option<usize>); VERTEX_COUNT],
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> XcoResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| XcoError::SourceData(format!("missing column '{}'", name)))
        };

        let mut vertices = [(None, None); VERTEX_COUNT];
        for (i, slot) in vertices.iter_mut().enumerate() {
            *slot = (
                find(format!("vertex_longitude_{}", i + 1).as_str()),
                find(format!("vertex_latitude_{}", i + 1).as_str()),
            );
        }

        Ok(Self {
            sounding_id: require(SOUNDING_ID)?,
            longitude: require(LONGITUDE)?,
            latitude: require(LATITUDE)?,
            xco2: require(XCO2)?,
            quality_flag: require(QUALITY_FLAG)?,
            vertices,
        })
    }

    fn parse_row(&self, row: &StringRecord) -> Option<Measurement> {
        let sounding_id: SoundingId = row.get(self.sounding_id)?.parse().ok()?;

        let footprint: Vec<LonLat> = self
            .vertices
            .iter()
            .filter_map(|&(lon, lat)| {
                let lon = parse_cell::<f64>(row, lon?)?;
                let lat = parse_cell::<f64>(row, lat?)?;
                Some([lon, lat])
            })
            .collect();

        Some(Measurement {
            sounding_id,
            longitude: parse_cell(row, self.longitude).unwrap_or(f64::NAN),
            latitude: parse_cell(row, self.latitude).unwrap_or(f64::NAN),
            xco2: parse_cell(row, self.xco2),
            quality_flag: parse_cell(row, self.quality_flag),
            footprint,
        })
    }
}

fn parse_cell<T: std::str::FromStr>(row: &StringRecord, index: usize) -> Option<T> {
    row.get(index)
        .filter(|cell| !cell.is_empty())
        .and_then(|cell| cell.parse().ok())
}

/// Product date from an OCO-2 Lite file name (`oco2_LtCO2_YYMMDD_...`)
pub fn product_date_from_name(name: &str) -> Option<NaiveDate> {
    static LITE_NAME: OnceLock<Regex> = OnceLock::new();
    let regex = LITE_NAME.get_or_init(|| {
        Regex::new(r"oco2_LtCO2_(\d{2})(\d{2})(\d{2})_").expect("static regex is valid")
    });

    let captures = regex.captures(name)?;
    let year: i32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let day: u32 = captures[3].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}
