use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::pipeline::PipelineConfig;
use crate::core::quality::QualityParams;
use crate::core::sampler::SamplingParams;
use crate::server::DataQuery;

#[derive(Debug, Parser)]
#[command(name = "xco2map", version, about = "Viewport sampling backend for satellite XCO2 maps")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load granules and serve the viewport API
    Serve(ServeArgs),
    /// Run one viewport request against local granules and print the JSON
    Query(QueryArgs),
    /// Request one viewport from a running server
    Fetch(FetchArgs),
}

/// Data location and pipeline tunables shared by `serve` and `query`
#[derive(Debug, Args)]
pub struct PipelineArgs {
    #[arg(long, env = "XCO2_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,
    #[arg(long, default_value_t = 380.0)]
    pub min_xco2: f64,
    #[arg(long, default_value_t = 420.0)]
    pub max_xco2: f64,
    #[arg(long, default_value_t = 0)]
    pub good_quality_flag: i32,
    /// Keep one sounding in N at zoom <= 3
    #[arg(long, default_value_t = 20)]
    pub aggressive_stride: u64,
    /// Keep one sounding in N at zoom 4-5
    #[arg(long, default_value_t = 5)]
    pub moderate_stride: u64,
    /// Below this zoom polygon mode returns no footprints
    #[arg(long, default_value_t = 4.0)]
    pub polygon_min_zoom: f64,
}

impl PipelineArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            quality: QualityParams {
                good_flag: self.good_quality_flag,
                min_xco2: self.min_xco2,
                max_xco2: self.max_xco2,
            },
            sampling: SamplingParams {
                aggressive_stride: self.aggressive_stride,
                moderate_stride: self.moderate_stride,
            },
            polygon_min_zoom: self.polygon_min_zoom,
        }
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    #[arg(long, env = "XCO2_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "XCO2_PORT", default_value_t = 8000)]
    pub port: u16,
    /// Origin allowed by CORS, or `*`
    #[arg(long, env = "XCO2_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,
    #[arg(long, default_value_t = 256)]
    pub cache_entries: u64,
}

/// Viewport parameters, spelled like the HTTP query
#[derive(Debug, Args)]
pub struct ViewportArgs {
    /// minLon,minLat,maxLon,maxLat
    #[arg(long, allow_hyphen_values = true)]
    pub bounds: String,
    #[arg(long)]
    pub zoom: String,
    #[arg(long, default_value = "point")]
    pub view_mode: String,
    #[arg(long)]
    pub start_date: Option<String>,
    #[arg(long)]
    pub end_date: Option<String>,
}

impl ViewportArgs {
    pub fn to_query(&self) -> DataQuery {
        DataQuery {
            bounds: Some(self.bounds.clone()),
            zoom: Some(self.zoom.clone()),
            view_mode: Some(self.view_mode.clone()),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    #[command(flatten)]
    pub viewport: ViewportArgs,
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(long, env = "XCO2_SERVER_URL", default_value = "http://localhost:8000")]
    pub url: String,
    #[command(flatten)]
    pub viewport: ViewportArgs,
}

/// Listener and cache settings for the HTTP service
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub cache_entries: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origin: "http://localhost:3000".to_string(),
            cache_entries: 256,
        }
    }
}

impl From<&ServeArgs> for ServerConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            cors_origin: args.cors_origin.clone(),
            cache_entries: args.cache_entries,
        }
    }
}
