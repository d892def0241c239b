//! OCO-2 Lite netCDF-4 granules (`oco2_LtCO2_*.nc4`).
//!
//! Soundings are stored as parallel one-dimensional variables, with the
//! footprint corners in two `[sounding, 4]` variables. Values equal to a
//! variable's `_FillValue` are treated as missing.

use crate::types::{LonLat, Measurement, SoundingId, XcoError, XcoResult};
use netcdf::NcPutGet;
use std::path::Path;

const VERTEX_COUNT: usize = 4;

/// Read every sounding in a Lite file
pub fn read_measurements(path: &Path) -> XcoResult<Vec<Measurement>> {
    let file = netcdf::open(path)
        .map_err(|e| XcoError::SourceData(format!("{}: {}", path.display(), e)))?;

    let ids = read_required::<i64>(&file, "sounding_id")?;
    let count = ids.len();
    let longitude = read_column::<f64>(&file, "longitude", count)?;
    let latitude = read_column::<f64>(&file, "latitude", count)?;
    let xco2 = read_column::<f64>(&file, "xco2", count)?;
    let quality_flag = read_column::<i32>(&file, "xco2_quality_flag", count)?;

    let vertex_lon = read_vertices(&file, "vertex_longitude", count)?;
    let vertex_lat = read_vertices(&file, "vertex_latitude", count)?;

    let mut measurements = Vec::with_capacity(count);
    let mut dropped = 0usize;
    for i in 0..count {
        let Some(id) = ids[i].and_then(|id| u64::try_from(id).ok()) else {
            dropped += 1;
            continue;
        };

        let footprint: Vec<LonLat> = match (&vertex_lon, &vertex_lat) {
            (Some(lons), Some(lats)) => (i * VERTEX_COUNT..(i + 1) * VERTEX_COUNT)
                .filter_map(|j| Some([lons[j]?, lats[j]?]))
                .collect(),
            _ => Vec::new(),
        };

        measurements.push(Measurement {
            sounding_id: SoundingId(id),
            longitude: longitude[i].unwrap_or(f64::NAN),
            latitude: latitude[i].unwrap_or(f64::NAN),
            xco2: xco2[i],
            quality_flag: quality_flag[i],
            footprint,
        });
    }

    if dropped > 0 {
        log::debug!("{}: dropped {} soundings with invalid ids", path.display(), dropped);
    }
    Ok(measurements)
}

fn read_required<T>(file: &netcdf::File, name: &str) -> XcoResult<Vec<Option<T>>>
where
    T: NcPutGet + Copy + PartialEq,
{
    read_values(file, name)?
        .ok_or_else(|| XcoError::SourceData(format!("missing variable '{}'", name)))
}

fn read_column<T>(file: &netcdf::File, name: &str, count: usize) -> XcoResult<Vec<Option<T>>>
where
    T: NcPutGet + Copy + PartialEq,
{
    let values = read_required(file, name)?;
    if values.len() != count {
        return Err(XcoError::SourceData(format!(
            "variable '{}' has {} values, expected {}",
            name,
            values.len(),
            count
        )));
    }
    Ok(values)
}

/// Footprint corners flattened row-major; `None` when the file has none
fn read_vertices(file: &netcdf::File, name: &str, count: usize) -> XcoResult<Option<Vec<Option<f64>>>> {
    let Some(values) = read_values::<f64>(file, name)? else {
        return Ok(None);
    };
    if values.len() != count * VERTEX_COUNT {
        return Err(XcoError::SourceData(format!(
            "variable '{}' has {} values, expected {} x {}",
            name,
            values.len(),
            count,
            VERTEX_COUNT
        )));
    }
    Ok(Some(values))
}

fn read_values<T>(file: &netcdf::File, name: &str) -> XcoResult<Option<Vec<Option<T>>>>
where
    T: NcPutGet + Copy + PartialEq,
{
    let Some(variable) = file.variable(name) else {
        return Ok(None);
    };

    // The fill attribute is only comparable when stored as `T`
    let fill = variable.fill_value::<T>().ok().flatten();
    let values = variable
        .get_values::<T, _>(..)
        .map_err(|e| XcoError::SourceData(format!("reading '{}': {}", name, e)))?;

    Ok(Some(
        values
            .into_iter()
            .map(|v| if Some(v) == fill { None } else { Some(v) })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    const FILL: f64 = -999999.0;

    fn write_lite_file(path: &Path, with_vertices: bool) {
        let ids: Vec<i64> = vec![2015010512000001, 2015010512000002, -1];
        let lons = vec![10.5, FILL, 12.0];
        let lats = vec![-3.25, 4.0, 5.0];
        let xco2 = vec![401.2, 399.0, 400.0];
        let flags: Vec<i32> = vec![0, 1, 0];

        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("sounding_id", ids.len()).unwrap();
        file.add_dimension("vertices", VERTEX_COUNT).unwrap();

        let mut var = file.add_variable::<i64>("sounding_id", &["sounding_id"]).unwrap();
        var.put_values(&ids, ..).unwrap();
        let mut var = file.add_variable::<f64>("longitude", &["sounding_id"]).unwrap();
        var.set_fill_value(FILL).unwrap();
        var.put_values(&lons, ..).unwrap();
        let mut var = file.add_variable::<f64>("latitude", &["sounding_id"]).unwrap();
        var.put_values(&lats, ..).unwrap();
        let mut var = file.add_variable::<f64>("xco2", &["sounding_id"]).unwrap();
        var.put_values(&xco2, ..).unwrap();
        let mut var = file.add_variable::<i32>("xco2_quality_flag", &["sounding_id"]).unwrap();
        var.put_values(&flags, ..).unwrap();

        if with_vertices {
            let corner_lon: Vec<f64> = lons.iter().flat_map(|&l| [l - 0.01, l + 0.01, l + 0.01, l - 0.01]).collect();
            let mut corner_lat: Vec<f64> = lats.iter().flat_map(|&l| [l - 0.01, l - 0.01, l + 0.01, l + 0.01]).collect();
            // Second sounding has a missing corner
            corner_lat[7] = FILL;

            let mut var = file
                .add_variable::<f64>("vertex_longitude", &["sounding_id", "vertices"])
                .unwrap();
            var.put_values(&corner_lon, ..).unwrap();
            let mut var = file
                .add_variable::<f64>("vertex_latitude", &["sounding_id", "vertices"])
                .unwrap();
            var.set_fill_value(FILL).unwrap();
            var.put_values(&corner_lat, ..).unwrap();
        }
    }

    #[test]
    fn test_read_lite_granule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("oco2_LtCO2_150105_B11014Ar_test.nc4");
        write_lite_file(&path, true);

        let rows = read_measurements(&path).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].sounding_id, SoundingId(2015010512000001));
        assert_eq!(rows[0].position(), [10.5, -3.25]);
        assert_eq!(rows[0].xco2, Some(401.2));
        assert_eq!(rows[0].quality_flag, Some(0));
        assert_eq!(rows[0].footprint.len(), 4);
        assert_relative_eq!(rows[0].footprint[2][0], 10.51, epsilon = 1e-9);
        assert_relative_eq!(rows[0].footprint[2][1], -3.24, epsilon = 1e-9);

        assert!(rows[1].longitude.is_nan());
        assert_eq!(rows[1].quality_flag, Some(1));
        assert_eq!(rows[1].footprint.len(), 3);
    }

    #[test]
    fn test_vertices_optional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points_only.nc4");
        write_lite_file(&path, false);

        let rows = read_measurements(&path).unwrap();
        assert!(rows.iter().all(|m| m.footprint.is_empty()));
    }

    #[test]
    fn test_not_netcdf_is_source_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.nc4");
        std::fs::write(&path, "not netcdf").unwrap();
        assert!(matches!(read_measurements(&path), Err(XcoError::SourceData(_))));
    }
}
