use crate::io::debounce::Debouncer;
use crate::types::{Feature, RequestConfig, XcoError, XcoResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Body of a `/data` response as seen by the client.
///
/// A body without `data` is an empty result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ViewportPayload {
    #[serde(default)]
    pub data: Vec<Feature>,
    #[serde(default)]
    pub point_radius_km: Option<f64>,
}

/// HTTP client for the viewport endpoint
#[derive(Debug, Clone)]
pub struct ViewportClient {
    http: reqwest::Client,
    base_url: String,
}

impl ViewportClient {
    pub fn new(base_url: impl Into<String>) -> XcoResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("xco2map/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| XcoError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the features for one viewport
    pub async fn fetch(&self, request: &RequestConfig) -> XcoResult<ViewportPayload> {
        let url = format!("{}/data", self.base_url);
        log::debug!("GET {} {:?}", url, request);

        let response = self
            .http
            .get(&url)
            .query(&query_pairs(request))
            .send()
            .await
            .map_err(|e| XcoError::Network(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(XcoError::Network(format!(
                "HTTP {} {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                body
            )));
        }

        response
            .json::<ViewportPayload>()
            .await
            .map_err(|e| XcoError::Network(format!("Failed to decode response body: {}", e)))
    }
}

fn query_pairs(request: &RequestConfig) -> Vec<(&'static str, String)> {
    let b = &request.bounds;
    let mut pairs = vec![
        (
            "bounds",
            format!("{},{},{},{}", b.min_lon, b.min_lat, b.max_lon, b.max_lat),
        ),
        ("zoom", request.zoom.to_string()),
        ("view_mode", request.view_mode.to_string()),
    ];
    if let Some(start) = request.dates.start {
        pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = request.dates.end {
        pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
    }
    pairs
}

/// What a map layer shows: the last good features plus an error indicator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewportState {
    pub features: Vec<Feature>,
    pub point_radius_km: Option<f64>,
    pub error: Option<String>,
    /// Number of fetch results applied so far
    pub revision: u64,
}

impl ViewportState {
    /// Successful results replace the features; failures only set `error`
    pub fn apply(&mut self, result: XcoResult<ViewportPayload>) {
        self.revision += 1;
        match result {
            Ok(payload) => {
                self.features = payload.data;
                self.point_radius_km = payload.point_radius_km;
                self.error = None;
            }
            Err(e) => {
                log::error!("Error fetching viewport data: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }
}

/// Debounced viewport fetching that publishes into a `watch` channel
pub struct DebouncedViewport {
    client: Arc<ViewportClient>,
    debouncer: Debouncer,
    state: Arc<watch::Sender<ViewportState>>,
}

impl DebouncedViewport {
    pub fn new(client: ViewportClient, window: Duration) -> Self {
        let (state, _) = watch::channel(ViewportState::default());
        Self {
            client: Arc::new(client),
            debouncer: Debouncer::new(window),
            state: Arc::new(state),
        }
    }

    /// Queue a fetch; superseded by any request made within the window
    pub fn request(&self, request: RequestConfig) {
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        self.debouncer.submit(async move {
            let result = client.fetch(&request).await;
            state.send_modify(|s| s.apply(result));
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewportState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ViewportState {
        self.state.borrow().clone()
    }
}
