//! REST API serving dashboard render cycles to the presentation layer

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use crate::config::DashboardConfig;
use crate::fetcher::DEFAULT_CACHE_TTL;
use crate::rest_source::{RestSourceConfig, RestTableSource};
use crate::source::TableSource;
use crate::sqlite_source::SqliteTableSource;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Where the server reads tables from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// Hosted REST backend
    Rest(RestSourceConfig),
    /// Local SQLite snapshot database
    Sqlite { path: String },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    pub source: SourceConfig,
    /// Lifetime of cached tables in seconds (default: 600)
    pub cache_ttl_seconds: u64,
    /// Optional JSON file with view definitions; built-in views otherwise
    pub dashboard_config_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            source: SourceConfig::Sqlite {
                path: "dashboard.db".to_string(),
            },
            cache_ttl_seconds: DEFAULT_CACHE_TTL.as_secs(),
            dashboard_config_path: None,
        }
    }
}

impl ServerConfig {
    /// Builds a configuration from environment variables, falling back to defaults.
    ///
    /// `HOST`, `PORT`, `SUPABASE_URL`, `SUPABASE_KEY`, `DATABASE_PATH`,
    /// `CACHE_TTL_SECONDS`, `DASHBOARD_CONFIG`. The REST backend is used
    /// when `SUPABASE_URL` is set, the SQLite snapshot otherwise.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();

        let source = match lookup("SUPABASE_URL") {
            Some(base_url) => SourceConfig::Rest(RestSourceConfig::new(
                base_url,
                lookup("SUPABASE_KEY").unwrap_or_default(),
            )),
            None => SourceConfig::Sqlite {
                path: lookup("DATABASE_PATH").unwrap_or_else(|| "dashboard.db".to_string()),
            },
        };

        ServerConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|port| port.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            source,
            cache_ttl_seconds: lookup("CACHE_TTL_SECONDS")
                .and_then(|ttl| ttl.parse::<u64>().ok())
                .unwrap_or(defaults.cache_ttl_seconds),
            dashboard_config_path: lookup("DASHBOARD_CONFIG"),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Runs the API server
///
/// # Example
/// ```rust,no_run
/// use process_analytics::server::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     run_server(ServerConfig::default()).await?;
///     Ok(())
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let dashboard = match &config.dashboard_config_path {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    let ttl = Duration::from_secs(config.cache_ttl_seconds);

    match &config.source {
        SourceConfig::Rest(rest) => {
            let source = RestTableSource::with_config(rest.clone())?;
            tracing::info!("Reading tables from {}", rest.base_url);
            serve(&config, AppState::new(source, dashboard, ttl)).await
        }
        SourceConfig::Sqlite { path } => {
            let source = SqliteTableSource::new(path)?;
            tracing::info!("Reading tables from snapshot database {}", path);
            serve(&config, AppState::new(source, dashboard, ttl)).await
        }
    }
}

async fn serve<S: TableSource + 'static>(
    config: &ServerConfig,
    state: AppState<S>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(Arc::new(state));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
