//! Shared application state for the API server

use crate::config::DashboardConfig;
use crate::fetcher::TableFetcher;
use crate::source::TableSource;
use std::time::Duration;

/// Shared application state
///
/// The fetcher's cache is the only mutable state; filter specifications
/// travel with each request.
pub struct AppState<S> {
    /// Table fetcher with its time-boxed cache
    pub fetcher: TableFetcher<S>,
    /// Configured dashboard views
    pub dashboard: DashboardConfig,
}

impl<S: TableSource> AppState<S> {
    /// Creates a new application state
    pub fn new(source: S, dashboard: DashboardConfig, cache_ttl: Duration) -> Self {
        AppState {
            fetcher: TableFetcher::with_ttl(source, cache_ttl),
            dashboard,
        }
    }
}
