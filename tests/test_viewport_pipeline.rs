use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use approx::assert_relative_eq;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use xco2map::types::{DateRange, RequestConfig, SoundingId, ViewMode};
use xco2map::core::DetailLevel;
use xco2map::{RecordStore, ViewportCache, ViewportPipeline};

const HEADER: &str = "sounding_id,longitude,latitude,xco2,xco2_quality_flag,\
vertex_longitude_1,vertex_latitude_1,vertex_longitude_2,vertex_latitude_2,\
vertex_longitude_3,vertex_latitude_3,vertex_longitude_4,vertex_latitude_4";

struct Row {
    id: u64,
    lon: f64,
    lat: f64,
    xco2: f64,
    flag: i32,
    vertices: usize,
}

impl Row {
    fn good(id: u64, lon: f64, lat: f64) -> Self {
        Row {
            id,
            lon,
            lat,
            xco2: 400.0,
            flag: 0,
            vertices: 4,
        }
    }

    fn to_csv(&self) -> String {
        let corners = [(-0.01, -0.01), (0.01, -0.01), (0.01, 0.01), (-0.01, 0.01)];
        let mut cells = vec![
            self.id.to_string(),
            self.lon.to_string(),
            self.lat.to_string(),
            self.xco2.to_string(),
            self.flag.to_string(),
        ];
        for (i, (dx, dy)) in corners.iter().enumerate() {
            if i < self.vertices {
                cells.push((self.lon + dx).to_string());
                cells.push((self.lat + dy).to_string());
            } else {
                cells.push(String::new());
                cells.push(String::new());
            }
        }
        cells.join(",")
    }
}

fn write_granule(dir: &Path, name: &str, rows: &[Row]) {
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(&row.to_csv());
        content.push('\n');
    }

    let path = dir.join(name);
    if name.ends_with(".gz") {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    } else {
        std::fs::write(path, content).unwrap();
    }
}

/// 1000 good soundings spread uniformly over [-10, 10] x [-10, 10]
fn uniform_rows() -> Vec<Row> {
    (0..1000u64)
        .map(|i| {
            let lon = -10.0 + (i % 40) as f64 * 0.5;
            let lat = -10.0 + (i / 40) as f64 * 0.8;
            Row::good(2015010512000000 + i, lon, lat)
        })
        .collect()
}

fn request(bounds: &str, zoom: f64, mode: ViewMode) -> RequestConfig {
    RequestConfig::new(bounds.parse().unwrap(), zoom, mode, DateRange::default()).unwrap()
}

fn uniform_store() -> (TempDir, RecordStore) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    write_granule(dir.path(), "oco2_LtCO2_150105_B11014Ar_test.csv", &uniform_rows());
    let store = RecordStore::open(dir.path()).expect("Failed to open record store");
    (dir, store)
}

#[test]
fn test_low_zoom_is_thinned_and_deterministic() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (_dir, store) = uniform_store();
    assert_eq!(store.len(), 1000);

    let pipeline = ViewportPipeline::standard();
    let bounds = "-10,-10,10,10";

    let full = pipeline.run(&store, &request(bounds, 6.0, ViewMode::Point)).unwrap();
    let coarse = pipeline.run(&store, &request(bounds, 2.0, ViewMode::Point)).unwrap();
    let again = pipeline.run(&store, &request(bounds, 2.0, ViewMode::Point)).unwrap();

    println!("zoom 6: {} points, zoom 2: {} points", full.data.len(), coarse.data.len());
    assert_eq!(full.data.len(), 1000);
    assert!(coarse.data.len() < full.data.len());
    assert!(!coarse.data.is_empty());
    assert_eq!(coarse.data, again.data);

    assert_relative_eq!(coarse.point_radius_km, 100.0);
    assert_relative_eq!(full.point_radius_km, 50.0);
}

#[test]
fn test_boundary_inclusion() {
    let dir = TempDir::new().unwrap();
    write_granule(
        dir.path(),
        "edges.csv",
        &[
            Row::good(2015010500000001, -10.0, -10.0),
            Row::good(2015010500000002, 10.0, 10.0),
            Row::good(2015010500000003, 10.001, 0.0),
            Row::good(2015010500000004, 0.0, 10.001),
        ],
    );
    let store = RecordStore::open(dir.path()).unwrap();

    let response = ViewportPipeline::standard()
        .run(&store, &request("-10,-10,10,10", 8.0, ViewMode::Point))
        .unwrap();
    let ids: HashSet<SoundingId> = response.data.iter().map(|f| f.sounding_id()).collect();

    assert!(ids.contains(&SoundingId(2015010500000001)));
    assert!(ids.contains(&SoundingId(2015010500000002)));
    assert!(!ids.contains(&SoundingId(2015010500000003)));
    assert!(!ids.contains(&SoundingId(2015010500000004)));
}

#[test]
fn test_poor_quality_excluded_in_both_modes() {
    let dir = TempDir::new().unwrap();
    let mut poor = Row::good(2015010500000002, 1.0, 1.0);
    poor.flag = 1;
    let mut high = Row::good(2015010500000003, 2.0, 2.0);
    high.xco2 = 425.0;
    write_granule(
        dir.path(),
        "quality.csv",
        &[Row::good(2015010500000001, 0.0, 0.0), poor, high],
    );
    let store = RecordStore::open(dir.path()).unwrap();
    let pipeline = ViewportPipeline::standard();

    for mode in [ViewMode::Point, ViewMode::Polygon] {
        for bounds in ["-10,-10,10,10", "-180,-90,180,90"] {
            let response = pipeline.run(&store, &request(bounds, 8.0, mode)).unwrap();
            assert_eq!(response.data.len(), 1, "mode {} bounds {}", mode, bounds);
            assert_eq!(response.data[0].sounding_id(), SoundingId(2015010500000001));
            for feature in &response.data {
                assert!((380.0..=420.0).contains(&feature.xco2()));
            }
        }
    }
}

#[test]
fn test_three_vertex_footprint_is_point_only() {
    let dir = TempDir::new().unwrap();
    let mut partial = Row::good(2015010500000002, 1.0, 1.0);
    partial.vertices = 3;
    write_granule(
        dir.path(),
        "footprints.csv",
        &[Row::good(2015010500000001, 0.0, 0.0), partial],
    );
    let store = RecordStore::open(dir.path()).unwrap();
    let pipeline = ViewportPipeline::standard();

    let points = pipeline.run(&store, &request("-10,-10,10,10", 8.0, ViewMode::Point)).unwrap();
    assert_eq!(points.data.len(), 2);

    let polygons = pipeline.run(&store, &request("-10,-10,10,10", 8.0, ViewMode::Polygon)).unwrap();
    assert_eq!(polygons.data.len(), 1);
    assert_eq!(polygons.data[0].sounding_id(), SoundingId(2015010500000001));
    for feature in &polygons.data {
        assert_eq!(feature.vertices().map(|v| v.len()), Some(4));
    }
}

#[test]
fn test_antimeridian_viewport() {
    let dir = TempDir::new().unwrap();
    write_granule(
        dir.path(),
        "dateline.csv",
        &[
            Row::good(2015010500000001, 175.0, 0.0),
            Row::good(2015010500000002, -175.0, 0.0),
            Row::good(2015010500000003, 0.0, 0.0),
        ],
    );
    let store = RecordStore::open(dir.path()).unwrap();

    let response = ViewportPipeline::standard()
        .run(&store, &request("170,-10,-170,10", 8.0, ViewMode::Point))
        .unwrap();
    let ids: Vec<u64> = response.data.iter().map(|f| f.sounding_id().0).collect();
    assert_eq!(ids, vec![2015010500000001, 2015010500000002]);
}

#[test]
fn test_date_range_across_gzip_granules() {
    let dir = TempDir::new().unwrap();
    write_granule(
        dir.path(),
        "oco2_LtCO2_150105_B11014Ar_a.csv.gz",
        &[Row::good(2015010512000001, 0.0, 0.0)],
    );
    write_granule(
        dir.path(),
        "oco2_LtCO2_150106_B11014Ar_b.csv.gz",
        &[Row::good(2015010612000001, 1.0, 1.0)],
    );
    let store = RecordStore::open(dir.path()).unwrap();
    assert_eq!(store.granules().len(), 2);

    let mut req = request("-10,-10,10,10", 8.0, ViewMode::Point);
    req.dates = DateRange::parse(Some("2015-01-06"), Some("2015-01-06")).unwrap();
    let response = ViewportPipeline::standard().run(&store, &req).unwrap();
    assert_eq!(response.data.len(), 1);
    assert_eq!(response.data[0].sounding_id(), SoundingId(2015010612000001));

    req.dates = DateRange::parse(Some("2015-02-01"), None).unwrap();
    let response = ViewportPipeline::standard().run(&store, &req).unwrap();
    assert!(response.data.is_empty());
}

#[test]
fn test_corrupt_file_skipped() {
    let dir = TempDir::new().unwrap();
    write_granule(dir.path(), "good.csv", &[Row::good(2015010500000001, 0.0, 0.0)]);
    std::fs::write(dir.path().join("broken.csv"), "lat,lon\n1,2\n").unwrap();
    std::fs::write(dir.path().join("broken.csv.gz"), "not gzip at all").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let store = RecordStore::open(dir.path()).unwrap();
    assert_eq!(store.granules().len(), 1);
    assert_eq!(store.load_failures().len(), 2);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_missing_data_dir_is_error() {
    let dir = TempDir::new().unwrap();
    assert!(RecordStore::open(dir.path().join("nope")).is_err());
}

#[test]
fn test_cached_results_match_direct_results() {
    let (_dir, store) = uniform_store();
    let pipeline = ViewportPipeline::standard();
    let cache = ViewportCache::new(8);

    for zoom in [1.0, 4.5, 7.0] {
        for mode in [ViewMode::Point, ViewMode::Polygon] {
            let req = request("-5,-5,5,5", zoom, mode);
            let direct = pipeline.run(&store, &req).unwrap();
            let cached = cache
                .get_or_compute(&req, |req| pipeline.run(&store, req))
                .unwrap();
            assert!(!cached.hit);
            assert_eq!(direct, *cached.response);
        }
    }
    assert_eq!(cache.stats().misses, 6);
}

#[test]
fn test_cache_keeps_zoom_bucket_just_below_threshold() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<Row> = (0..200u64)
        .map(|i| {
            let lon = -0.95 + (i % 20) as f64 * 0.1;
            let lat = -0.9 + (i / 20) as f64 * 0.2;
            Row::good(2015010512000000 + i, lon, lat)
        })
        .collect();
    write_granule(dir.path(), "zoom.csv", &rows);
    let store = RecordStore::open(dir.path()).unwrap();
    let pipeline = ViewportPipeline::standard();
    let cache = ViewportCache::new(8);

    for mode in [ViewMode::Point, ViewMode::Polygon] {
        let req = request("-1,-1,1,1", 3.996, mode);
        let direct = pipeline.run(&store, &req).unwrap();
        let cached = cache
            .get_or_compute(&req, |req| pipeline.run(&store, req))
            .unwrap();

        println!(
            "mode {}: direct {} features, cached {} features",
            mode,
            direct.data.len(),
            cached.response.data.len()
        );
        assert_eq!(cached.response.zoom_level, DetailLevel::Aggressive);
        assert_eq!(direct, *cached.response);
    }

    let polygons = cache
        .get_or_compute(&request("-1,-1,1,1", 3.996, ViewMode::Polygon), |req| {
            pipeline.run(&store, req)
        })
        .unwrap();
    assert!(polygons.hit);
    assert!(polygons.response.data.is_empty());
}

#[test]
fn test_cache_keeps_closed_max_edge() {
    let dir = TempDir::new().unwrap();
    write_granule(
        dir.path(),
        "edge.csv",
        &[
            Row::good(2015010500000001, 9.9999998, 0.0),
            Row::good(2015010500000002, 9.9999990, 0.0),
        ],
    );
    let store = RecordStore::open(dir.path()).unwrap();
    let pipeline = ViewportPipeline::standard();
    let cache = ViewportCache::new(8);

    let req = request("-10,-10,9.9999996,10", 8.0, ViewMode::Point);
    let direct = pipeline.run(&store, &req).unwrap();
    let cached = cache
        .get_or_compute(&req, |req| pipeline.run(&store, req))
        .unwrap();

    let ids: Vec<u64> = cached.response.data.iter().map(|f| f.sounding_id().0).collect();
    assert_eq!(ids, vec![2015010500000002]);
    assert_eq!(direct.data, cached.response.data);
}
