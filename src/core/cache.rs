use crate::core::pipeline::ViewportResponse;
use crate::types::{DateRange, RequestConfig, ViewMode, XcoError, XcoResult};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Exact form of a request, used as the cache key.
///
/// Coordinates and zoom are keyed on their bit patterns: any rounding
/// would let two requests that filter or sample differently share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportKey {
    bounds: [u64; 4],
    zoom: u64,
    view_mode: ViewMode,
    dates: DateRange,
}

impl ViewportKey {
    pub fn from_request(request: &RequestConfig) -> Self {
        let b = &request.bounds;
        Self {
            bounds: [
                b.min_lon.to_bits(),
                b.min_lat.to_bits(),
                b.max_lon.to_bits(),
                b.max_lat.to_bits(),
            ],
            zoom: request.zoom.to_bits(),
            view_mode: request.view_mode,
            dates: request.dates,
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// A response served by the cache
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub response: Arc<ViewportResponse>,
    /// False when this call ran the computation
    pub hit: bool,
}

/// Bounded LRU cache of viewport responses.
///
/// Concurrent lookups of the same missing key wait for a single
/// computation instead of each running the pipeline.
pub struct ViewportCache {
    inner: Cache<ViewportKey, Arc<ViewportResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ViewportCache {
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached response for `request`, computing it at most once.
    ///
    /// `compute` receives `request` itself. Errors are not cached.
    pub fn get_or_compute<F>(&self, request: &RequestConfig, compute: F) -> XcoResult<CacheLookup>
    where
        F: FnOnce(&RequestConfig) -> XcoResult<ViewportResponse>,
    {
        let key = ViewportKey::from_request(request);
        let mut computed = false;

        let result = self.inner.try_get_with(key, || {
            computed = true;
            log::info!("Viewport cache miss for {:?}", request);
            compute(request).map(Arc::new)
        });

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        result.map(|response| CacheLookup { response, hit: !computed }).map_err(unshare_error)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

/// moka hands init errors out behind an `Arc` shared by all waiters
fn unshare_error(err: Arc<XcoError>) -> XcoError {
    match Arc::try_unwrap(err) {
        Ok(err) => err,
        Err(shared) => match shared.as_ref() {
            XcoError::Validation(msg) => XcoError::Validation(msg.clone()),
            XcoError::SourceData(msg) => XcoError::SourceData(msg.clone()),
            XcoError::Network(msg) => XcoError::Network(msg.clone()),
            other => XcoError::Internal(other.to_string()),
        },
    }
}
