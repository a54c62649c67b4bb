pub mod error;
pub mod table;
pub mod source;
pub mod fetcher;
pub mod rest_source;
pub mod sqlite_source;
pub mod filter;
pub mod aggregate;
pub mod diagram;
pub mod config;
pub mod dashboard;
pub mod server;


pub use error::{DashboardError, TableSourceError};
pub use table::{Row, Table, Value};
pub use source::{InMemoryTableSource, TableSource};
pub use fetcher::{FetchResult, TableFetcher, DEFAULT_CACHE_TTL};
pub use rest_source::{RestSourceConfig, RestTableSource};
pub use sqlite_source::SqliteTableSource;
pub use filter::{FilterEngine, FilterSpec};
pub use aggregate::{
    count,
    duration_minutes,
    histogram,
    mean_duration_minutes,
    Histogram,
    HistogramBin,
    Kpis,
};
pub use diagram::{build_diagram, DiagramEdge, DiagramNode, ProcessDiagram};
pub use config::{ConfigError, DashboardConfig, MachineTable, TableBinding, ViewConfig};
pub use dashboard::{
    filtered_table,
    render_view,
    variant_listing,
    ProcessMap,
    RenderRequest,
    VariantEntry,
    VariantListing,
    ViewRender,
};
pub use server::{run_server, ServerConfig, SourceConfig, AppState, ApiError};
