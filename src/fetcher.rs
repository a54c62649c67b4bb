//! Table fetching with degradation and a short time-boxed cache.
//!
//! A fetch never fails from the caller's point of view: any source error,
//! an empty table name, or an empty result yields an empty table plus a
//! `DataUnavailable` signal. Successful fetches are memoized per table name
//! until the TTL expires; failures are never cached. Concurrent misses for
//! the same table share a single source read.

use crate::error::DashboardError;
use crate::source::TableSource;
use crate::table::Table;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Default lifetime of a cached table.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Outcome of a single fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Fetched rows; empty when the data was unavailable
    pub table: Arc<Table>,
    /// Whether the rows were served from the cache
    pub from_cache: bool,
    /// Set when the source produced no usable data
    pub unavailable: Option<DashboardError>,
}

impl FetchResult {
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

struct CachedTable {
    table: Arc<Table>,
    fetched_at: Instant,
}

/// Fetches tables from a `TableSource`, memoizing successful reads.
pub struct TableFetcher<S> {
    source: S,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedTable>>,
    /// One read lock per table with a source read in flight
    reads: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S: TableSource> TableFetcher<S> {
    /// Creates a fetcher with the default 10 minute cache window.
    pub fn new(source: S) -> Self {
        Self::with_ttl(source, DEFAULT_CACHE_TTL)
    }

    /// Creates a fetcher with a custom cache window. A zero TTL disables caching.
    pub fn with_ttl(source: S, ttl: Duration) -> Self {
        TableFetcher {
            source,
            ttl,
            cache: Mutex::new(HashMap::new()),
            reads: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetches all records of `table_name`.
    pub async fn fetch(&self, table_name: &str) -> FetchResult {
        if table_name.trim().is_empty() {
            return Self::unavailable(table_name, "table name is empty");
        }

        if let Some(result) = self.from_cache(table_name) {
            return result;
        }

        let read_lock = self.read_lock(table_name);
        let _read = read_lock.lock().await;
        // A concurrent read may have filled the cache while we waited
        if let Some(result) = self.from_cache(table_name) {
            return result;
        }

        let result = self.read_source(table_name).await;
        self.lock_reads().remove(table_name);
        result
    }

    async fn read_source(&self, table_name: &str) -> FetchResult {
        match self.source.fetch_table(table_name).await {
            Ok(table) if table.is_empty() => Self::unavailable(table_name, "no rows returned"),
            Ok(table) => {
                debug!(table = table_name, rows = table.len(), "table fetched");
                let table = Arc::new(table);
                self.store(table_name, Arc::clone(&table));
                FetchResult {
                    table,
                    from_cache: false,
                    unavailable: None,
                }
            }
            Err(err) => Self::unavailable(table_name, &err.to_string()),
        }
    }

    /// Drops the cached copy of one table.
    pub fn invalidate(&self, table_name: &str) {
        self.lock_cache().remove(table_name);
    }

    /// Drops every cached table.
    pub fn clear(&self) {
        self.lock_cache().clear();
    }

    fn from_cache(&self, table_name: &str) -> Option<FetchResult> {
        let table = self.cached(table_name)?;
        debug!(table = table_name, rows = table.len(), "table served from cache");
        Some(FetchResult {
            table,
            from_cache: true,
            unavailable: None,
        })
    }

    fn read_lock(&self, table_name: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.lock_reads()
                .entry(table_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    fn cached(&self, table_name: &str) -> Option<Arc<Table>> {
        let mut cache = self.lock_cache();
        let fresh = cache
            .get(table_name)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.table));
        if fresh.is_none() {
            cache.remove(table_name);
        }
        fresh
    }

    fn store(&self, table_name: &str, table: Arc<Table>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut cache = self.lock_cache();
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        cache.insert(
            table_name.to_string(),
            CachedTable {
                table,
                fetched_at: Instant::now(),
            },
        );
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, CachedTable>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_reads(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.reads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unavailable(table_name: &str, reason: &str) -> FetchResult {
        warn!(table = table_name, reason, "table data unavailable");
        FetchResult {
            table: Arc::new(Table::default()),
            from_cache: false,
            unavailable: Some(DashboardError::data_unavailable(table_name, reason)),
        }
    }
}
