//! Axum service exposing the viewport pipeline.
//!
//! `/data` validates the query, runs the pipeline through the viewport
//! cache on the blocking pool and serializes the whole response. There are
//! no partial results: a request either gets every feature or an error.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::core::cache::{CacheLookup, ViewportCache};
use crate::core::pipeline::ViewportPipeline;
use crate::io::record_store::{GranuleSummary, RecordStore};
use crate::types::{BoundingBox, DateRange, RequestConfig, ViewMode, XcoError, XcoResult};

/// Shared state backing HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub pipeline: Arc<ViewportPipeline>,
    pub cache: Arc<ViewportCache>,
}

impl AppState {
    pub fn new(store: RecordStore, pipeline: ViewportPipeline, cache_entries: u64) -> Self {
        Self {
            store: Arc::new(store),
            pipeline: Arc::new(pipeline),
            cache: Arc::new(ViewportCache::new(cache_entries)),
        }
    }
}

/// Lifecycle of one `/data` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Validated,
    Filtered,
    Sampled,
    Serialized,
    Responded,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPhase::Received => "RECEIVED",
            RequestPhase::Validated => "VALIDATED",
            RequestPhase::Filtered => "FILTERED",
            RequestPhase::Sampled => "SAMPLED",
            RequestPhase::Serialized => "SERIALIZED",
            RequestPhase::Responded => "RESPONDED",
        };
        f.write_str(name)
    }
}

/// Raw `/data` query; everything is validated by hand so that bad input
/// produces a structured error instead of a rejection
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    pub bounds: Option<String>,
    pub zoom: Option<String>,
    pub view_mode: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DataQuery {
    pub fn validate(&self) -> XcoResult<RequestConfig> {
        let bounds: BoundingBox = self
            .bounds
            .as_deref()
            .ok_or_else(|| XcoError::Validation("missing required parameter 'bounds'".into()))?
            .parse()?;

        let zoom_raw = self
            .zoom
            .as_deref()
            .ok_or_else(|| XcoError::Validation("missing required parameter 'zoom'".into()))?;
        let zoom: f64 = zoom_raw
            .trim()
            .parse()
            .map_err(|_| XcoError::Validation(format!("zoom '{}' is not a number", zoom_raw)))?;

        let view_mode = match self.view_mode.as_deref() {
            Some(mode) if !mode.trim().is_empty() => mode.parse()?,
            _ => ViewMode::default(),
        };

        let dates = DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())?;

        RequestConfig::new(bounds, zoom, view_mode, dates)
    }
}

/// Error response wrapper
pub struct ApiError(pub XcoError);

impl ApiError {
    fn kind(&self) -> (&'static str, StatusCode) {
        match &self.0 {
            XcoError::Validation(_) => ("validation", StatusCode::BAD_REQUEST),
            XcoError::SourceData(_) | XcoError::Io(_) | XcoError::Csv(_) => {
                ("source_data", StatusCode::INTERNAL_SERVER_ERROR)
            }
            XcoError::Network(_) | XcoError::Internal(_) => {
                ("internal", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, status) = self.kind();
        if status.is_server_error() {
            log::error!("Error processing request: {}", self.0);
        } else {
            log::warn!("Rejected request: {}", self.0);
        }
        (status, Json(json!({ "error": kind, "message": self.0.to_string() }))).into_response()
    }
}

impl From<XcoError> for ApiError {
    fn from(err: XcoError) -> Self {
        ApiError(err)
    }
}

/// Build the router with CORS for the map client's origin
pub fn router(state: AppState, cors_origin: &str) -> XcoResult<Router> {
    let cors = if cors_origin == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origin = HeaderValue::from_str(cors_origin).map_err(|_| {
            XcoError::Validation(format!("invalid CORS origin '{}'", cors_origin))
        })?;
        CorsLayer::new().allow_origin(origin)
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Ok(Router::new()
        .route("/data", get(data_handler))
        .route("/health", get(health_handler))
        .route("/granules", get(granules_handler))
        .with_state(state)
        .layer(cors))
}

/// Bind and serve until the process is stopped
pub async fn serve(config: &ServerConfig, state: AppState) -> XcoResult<()> {
    let app = router(state, &config.cors_origin)?;
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn data_handler(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<Response, ApiError> {
    let mut phase = RequestPhase::Received;
    log::info!(
        "Request - bounds: {:?}, zoom: {:?}, mode: {:?}, dates: {:?} to {:?}",
        query.bounds,
        query.zoom,
        query.view_mode,
        query.start_date,
        query.end_date
    );

    let request = query.validate()?;
    advance(&mut phase, RequestPhase::Validated);

    let AppState {
        store,
        pipeline,
        cache,
    } = state;
    let lookup = tokio::task::spawn_blocking(move || {
        cache.get_or_compute(&request, |request| pipeline.run(&store, request))
    })
    .await
    .map_err(|e| XcoError::Internal(format!("pipeline task failed: {}", e)))??;
    for (next, detail) in computed_phases(&lookup) {
        log::debug!("request {} -> {} ({})", phase, next, detail);
        phase = next;
    }
    let response = lookup.response;

    let body = serde_json::to_vec(response.as_ref())
        .map_err(|e| XcoError::Internal(format!("failed to serialize response: {}", e)))?;
    advance(&mut phase, RequestPhase::Serialized);

    if response.view_mode == ViewMode::Polygon {
        log::info!("Returning {} footprints", response.data.len());
    } else {
        log::info!("Returning {} points", response.data.len());
    }

    let http_response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response();
    advance(&mut phase, RequestPhase::Responded);
    Ok(http_response)
}

/// Stages a lookup went through after validation. A cache hit skips
/// straight to sampled output; a miss ran the filter and sample passes.
fn computed_phases(lookup: &CacheLookup) -> Vec<(RequestPhase, String)> {
    let stats = &lookup.response.stats;
    if lookup.hit {
        vec![(RequestPhase::Sampled, "cache hit".to_string())]
    } else {
        vec![
            (
                RequestPhase::Filtered,
                format!("{} of {} records", stats.filtered, stats.scanned),
            ),
            (RequestPhase::Sampled, format!("{} kept", stats.sampled)),
        ]
    }
}

fn advance(phase: &mut RequestPhase, next: RequestPhase) {
    log::debug!("request {} -> {}", phase, next);
    *phase = next;
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn granules_handler(State(state): State<AppState>) -> Json<Vec<GranuleSummary>> {
    Json(state.store.granules().iter().map(|g| g.summary()).collect())
}
