//! Copies tables from the REST backend into a local SQLite snapshot
//!
//! Run with: `cargo run --bin dashboard-snapshot -- M001_Data M002_Data all_variants`

use process_analytics::{RestSourceConfig, RestTableSource, SqliteTableSource, TableSource};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let tables: Vec<String> = std::env::args().skip(1).collect();
    if tables.is_empty() {
        return Err("usage: dashboard-snapshot <table> [<table> ...]".into());
    }

    let base_url = std::env::var("SUPABASE_URL").map_err(|_| "SUPABASE_URL is not set")?;
    let api_key = std::env::var("SUPABASE_KEY").map_err(|_| "SUPABASE_KEY is not set")?;
    let database_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "dashboard.db".to_string());

    let rest = RestTableSource::with_config(RestSourceConfig::new(base_url, api_key))?;
    let snapshot = SqliteTableSource::new(&database_path)?;

    let mut failed = 0;
    for name in &tables {
        match rest.fetch_table(name).await {
            Ok(table) => {
                let stored = snapshot.store_table(name, &table)?;
                log::info!("Stored {} rows of {} in {}", stored, name, database_path);
            }
            Err(e) => {
                log::error!("Failed to fetch {}: {}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} tables could not be fetched", failed, tables.len()).into());
    }

    Ok(())
}
