//! Dashboard API Server Binary
//!
//! Run with: `cargo run --bin dashboard-server`

use process_analytics::{run_server, ServerConfig, SourceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Note: Tracing is initialized in run_server()
    // Set RUST_LOG environment variable to control log level:
    //   RUST_LOG=debug cargo run --bin dashboard-server
    //   RUST_LOG=process_analytics::fetcher=debug cargo run --bin dashboard-server

    let config = ServerConfig::from_env();

    println!("Starting Process Dashboard API Server...");
    println!("   Host: {}", config.host);
    println!("   Port: {}", config.port);
    match &config.source {
        SourceConfig::Rest(rest) => println!("   Source: {}", rest.base_url),
        SourceConfig::Sqlite { path } => println!("   Source: {} (snapshot)", path),
    }
    println!("   Cache TTL: {}s", config.cache_ttl_seconds);
    if let Some(path) = &config.dashboard_config_path {
        println!("   Views: {}", path);
    }
    println!();
    println!("Server will be available at: http://{}", config.address());
    println!();
    println!("Available endpoints:");
    println!("  GET  /health                    - Health check");
    println!("  GET  /views                     - List dashboard views");
    println!("  POST /views/:view/render        - Render a view");
    println!("  POST /views/:view/export        - Filtered view as CSV");
    println!("  GET  /tables/:table             - Raw table records");
    println!("  GET  /variants                  - Variant overview");
    println!("  GET  /diagram?variant=A,B,C     - Variant flow diagram");
    println!();

    run_server(config).await?;

    Ok(())
}
