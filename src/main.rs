use anyhow::{Context, Result};
use clap::Parser;

use xco2map::config::{Cli, Command, FetchArgs, QueryArgs, ServeArgs, ServerConfig};
use xco2map::server::{self, AppState};
use xco2map::{RecordStore, ViewportClient, ViewportPipeline};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Query(args) => run_query(args),
        Command::Fetch(args) => run_fetch(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let pipeline = ViewportPipeline::new(args.pipeline.pipeline_config())
        .context("invalid pipeline configuration")?;
    let store = RecordStore::open(&args.pipeline.data_dir)
        .with_context(|| format!("failed to load granules from {}", args.pipeline.data_dir.display()))?;
    if store.granules().is_empty() {
        log::warn!("No granules loaded; /data will answer with server errors");
    }

    let config = ServerConfig::from(&args);
    let state = AppState::new(store, pipeline, config.cache_entries);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime
        .block_on(server::serve(&config, state))
        .context("HTTP server error")?;
    Ok(())
}

fn run_query(args: QueryArgs) -> Result<()> {
    let request = args.viewport.to_query().validate()?;
    let pipeline = ViewportPipeline::new(args.pipeline.pipeline_config())
        .context("invalid pipeline configuration")?;
    let store = RecordStore::open(&args.pipeline.data_dir)
        .with_context(|| format!("failed to load granules from {}", args.pipeline.data_dir.display()))?;

    let response = pipeline.run(&store, &request)?;
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", json);
    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let request = args.viewport.to_query().validate()?;
    let client = ViewportClient::new(args.url.as_str())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let payload = runtime
        .block_on(client.fetch(&request))
        .with_context(|| format!("failed to fetch viewport from {}", client.base_url()))?;

    println!(
        "{} features (point radius {:?} km)",
        payload.data.len(),
        payload.point_radius_km
    );
    for feature in payload.data.iter().take(5) {
        println!("  {}", serde_json::to_string(feature)?);
    }
    Ok(())
}
