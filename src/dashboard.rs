//! One render cycle of a dashboard view.
//!
//! fetch -> normalize (timestamps, sort) -> filter -> { KPIs, histograms,
//! process maps }. Every recoverable condition ends up in
//! `ViewRender::warnings`; nothing here fails the cycle.

use crate::aggregate::{self, push_unique, Histogram, Kpis};
use crate::config::ViewConfig;
use crate::diagram::{build_diagram, ProcessDiagram};
use crate::error::DashboardError;
use crate::fetcher::TableFetcher;
use crate::filter::{FilterEngine, FilterSpec};
use crate::source::TableSource;
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// Input of a render cycle, supplied by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Active filters. `None` applies the view's default filters.
    #[serde(default)]
    pub filters: Option<FilterSpec>,
    /// Machine to show, for views bound to one table per machine
    #[serde(default)]
    pub machine: Option<String>,
    /// Maximum number of filtered rows returned for the detailed data view
    #[serde(default)]
    pub row_limit: Option<usize>,
}

impl RenderRequest {
    pub fn with_filters(filters: FilterSpec) -> Self {
        RenderRequest {
            filters: Some(filters),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub column: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepHistogram {
    pub step: Value,
    pub histogram: Histogram,
}

/// Flow diagram of one variant. `diagram` is `None` when no record matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessMap {
    pub rank: Option<Value>,
    pub variant: Option<String>,
    pub diagram: Option<ProcessDiagram>,
    pub dot: Option<String>,
}

impl ProcessMap {
    fn new(rank: Option<Value>, variant: Option<String>) -> Self {
        let diagram = variant.as_deref().map(build_diagram);
        let dot = diagram.as_ref().map(ProcessDiagram::to_dot);
        ProcessMap {
            rank,
            variant,
            diagram,
            dot,
        }
    }
}

/// Everything the presentation layer needs to draw one view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRender {
    pub view: String,
    pub title: String,
    /// Resolved table name, if any
    pub table: Option<String>,
    pub machine: Option<String>,
    /// The filter specification in effect, to be sent back next cycle
    pub filters: FilterSpec,
    pub filter_options: Vec<FilterOptions>,
    pub kpis: Kpis,
    pub duration_histogram: Option<Histogram>,
    pub step_histograms: Vec<StepHistogram>,
    pub process_maps: Vec<ProcessMap>,
    /// Filtered rows, possibly truncated to the requested row limit
    pub rows: Table,
    /// Row count of the filtered view before truncation
    pub filtered_rows: usize,
    pub total_rows: usize,
    pub warnings: Vec<DashboardError>,
}

struct PreparedView {
    table: Option<String>,
    machine: Option<String>,
    engine: FilterEngine,
    filtered: Table,
    warnings: Vec<DashboardError>,
}

async fn prepare<S: TableSource>(
    fetcher: &TableFetcher<S>,
    view: &ViewConfig,
    request: &RenderRequest,
) -> PreparedView {
    let mut warnings = Vec::new();
    let machine = view
        .source
        .machine(request.machine.as_deref())
        .map(str::to_string);
    let table_name = view
        .source
        .table_name(request.machine.as_deref())
        .map(str::to_string);

    let fetched = match &table_name {
        Some(name) => {
            let result = fetcher.fetch(name).await;
            if let Some(unavailable) = result.unavailable {
                warnings.push(unavailable);
            }
            result.table
        }
        None => {
            warnings.push(DashboardError::data_unavailable(
                machine.clone().unwrap_or_default(),
                "invalid machine selection",
            ));
            Arc::new(Table::default())
        }
    };

    let table = normalize(view, fetched, &mut warnings);
    let mut engine = FilterEngine::new(table, view.filters.clone());
    let spec = request.filters.as_ref().unwrap_or(&view.default_filters);
    for ignored in engine.apply_spec(spec) {
        push_unique(&mut warnings, ignored);
    }
    for unresolved in engine.unresolved_columns() {
        push_unique(&mut warnings, unresolved);
    }
    let filtered = engine.filtered_view();

    PreparedView {
        table: table_name,
        machine,
        engine,
        filtered,
        warnings,
    }
}

/// Applies the view's timestamp conversions and sort order.
fn normalize(view: &ViewConfig, table: Arc<Table>, warnings: &mut Vec<DashboardError>) -> Arc<Table> {
    if table.is_empty() {
        return table;
    }

    let mut current = table;
    for column in &view.timestamp_columns {
        if current.has_column(column) {
            current = Arc::new(current.with_timestamps(column));
        } else {
            push_unique(warnings, DashboardError::unknown_column(column.as_str()));
        }
    }
    if let Some(column) = &view.sort_by {
        if current.has_column(column) {
            current = Arc::new(current.sorted_by(column));
        } else {
            push_unique(warnings, DashboardError::unknown_column(column.as_str()));
        }
    }
    current
}

/// Runs one render cycle of `view`.
pub async fn render_view<S: TableSource>(
    fetcher: &TableFetcher<S>,
    view: &ViewConfig,
    request: &RenderRequest,
) -> ViewRender {
    let span = info_span!("render_view", view = %view.name);
    async move {
        let PreparedView {
            table,
            machine,
            engine,
            filtered,
            mut warnings,
        } = prepare(fetcher, view, request).await;
        let all = engine.table();

        let filter_options = view
            .filters
            .iter()
            .map(|column| FilterOptions {
                column: column.clone(),
                values: engine.filter_options(column),
            })
            .collect();

        let kpis = Kpis::compute(
            &filtered,
            all,
            view.duration_column.as_deref(),
            view.case_id_column.as_deref(),
            &mut warnings,
        );

        let duration_histogram = view.duration_column.as_deref().map(|column| {
            aggregate::histogram(
                &aggregate::duration_minutes(&filtered, column),
                view.histogram_bins,
            )
        });

        let step_histograms = step_histograms(view, &filtered, &mut warnings);
        let process_maps = process_maps(view, &engine, &filtered, &mut warnings);

        let filtered_rows = filtered.len();
        let rows = match request.row_limit {
            Some(limit) => filtered.head(limit),
            None => filtered,
        };

        debug!(
            filtered_rows,
            total_rows = all.len(),
            warnings = warnings.len(),
            "view rendered"
        );

        ViewRender {
            view: view.name.clone(),
            title: view.title.clone(),
            table,
            machine,
            filters: engine.spec().clone(),
            filter_options,
            kpis,
            duration_histogram,
            step_histograms,
            process_maps,
            rows,
            filtered_rows,
            total_rows: all.len(),
            warnings,
        }
    }
    .instrument(span)
    .await
}

/// Returns the filtered view of one render cycle, for export.
pub async fn filtered_table<S: TableSource>(
    fetcher: &TableFetcher<S>,
    view: &ViewConfig,
    request: &RenderRequest,
) -> (Table, Vec<DashboardError>) {
    let prepared = prepare(fetcher, view, request).await;
    (prepared.filtered, prepared.warnings)
}

fn step_histograms(
    view: &ViewConfig,
    filtered: &Table,
    warnings: &mut Vec<DashboardError>,
) -> Vec<StepHistogram> {
    let (Some(step_column), Some(duration_column)) =
        (view.step_column.as_deref(), view.duration_column.as_deref())
    else {
        return Vec::new();
    };
    if filtered.is_empty() {
        return Vec::new();
    }
    let Some(step_idx) = filtered.column_index(step_column) else {
        push_unique(warnings, DashboardError::unknown_column(step_column));
        return Vec::new();
    };

    filtered
        .distinct(step_column)
        .into_iter()
        .map(|step| {
            let rows = filtered.select(|row| row[step_idx] == step);
            let histogram = aggregate::histogram(
                &aggregate::duration_minutes(&rows, duration_column),
                view.histogram_bins,
            );
            StepHistogram { step, histogram }
        })
        .collect()
}

fn process_maps(
    view: &ViewConfig,
    engine: &FilterEngine,
    filtered: &Table,
    warnings: &mut Vec<DashboardError>,
) -> Vec<ProcessMap> {
    let Some(variant_column) = view.variant_column.as_deref() else {
        return Vec::new();
    };
    if filtered.is_empty() || view.max_process_maps == 0 {
        return Vec::new();
    }
    if !filtered.has_column(variant_column) {
        push_unique(warnings, DashboardError::unknown_column(variant_column));
        return Vec::new();
    }

    let rank_column = match view.rank_column.as_deref() {
        Some(column) if filtered.has_column(column) => Some(column),
        Some(column) => {
            push_unique(warnings, DashboardError::unknown_column(column));
            None
        }
        None => None,
    };

    let Some(rank_column) = rank_column else {
        let variant = filtered
            .row(0)
            .and_then(|row| row.get(variant_column))
            .and_then(variant_text);
        return vec![ProcessMap::new(None, variant)];
    };

    let ranks: Vec<Value> = match engine.get_filter_value(rank_column) {
        Some(selected) => selected.to_vec(),
        None => filtered
            .distinct(rank_column)
            .into_iter()
            .take(view.max_process_maps)
            .collect(),
    };

    ranks
        .into_iter()
        .map(|rank| {
            let variant = filtered
                .rows()
                .find(|row| row.get(rank_column) == Some(&rank))
                .and_then(|row| row.get(variant_column))
                .and_then(variant_text);
            ProcessMap::new(Some(rank), variant)
        })
        .collect()
}

fn variant_text(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

/// One machine/variant pair of the variants overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantEntry {
    pub machine: String,
    pub variant: String,
    pub diagram: ProcessDiagram,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantListing {
    pub table: String,
    pub entries: Vec<VariantEntry>,
    pub warnings: Vec<DashboardError>,
}

/// Column names of the variants overview table.
pub const MACHINE_COLUMN: &str = "machine";
pub const VARIANT_COLUMN: &str = "variant";

/// Lists up to `limit` machine/variant pairs of `table_name`.
pub async fn variant_listing<S: TableSource>(
    fetcher: &TableFetcher<S>,
    table_name: &str,
    limit: usize,
) -> VariantListing {
    let result = fetcher.fetch(table_name).await;
    let mut warnings: Vec<DashboardError> = result.unavailable.into_iter().collect();
    let table = result.table;

    if !table.is_empty() {
        for column in [MACHINE_COLUMN, VARIANT_COLUMN] {
            if !table.has_column(column) {
                warnings.push(DashboardError::unknown_column(column));
            }
        }
    }

    let entries = table
        .rows()
        .filter_map(|row| {
            let variant = row.get(VARIANT_COLUMN).and_then(variant_text)?;
            let machine = row
                .get(MACHINE_COLUMN)
                .map(Value::to_string)
                .unwrap_or_default();
            Some(VariantEntry {
                machine,
                diagram: build_diagram(&variant),
                variant,
            })
        })
        .take(limit)
        .collect();

    VariantListing {
        table: table_name.to_string(),
        entries,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::source::InMemoryTableSource;
    use serde_json::json;

    fn machine_rows() -> Table {
        Table::from_json(&json!([
            {"Case ID": "c3", "Variant Rank": 2, "Variant": "Fill,Label", "concept:name": "Fill", "Duration (Seconds)": 300},
            {"Case ID": "c1", "Variant Rank": 1, "Variant": "Fill,Seal,Label", "concept:name": "Fill", "Duration (Seconds)": 120},
            {"Case ID": "c2", "Variant Rank": 1, "Variant": "Fill,Seal,Label", "concept:name": "Seal", "Duration (Seconds)": 60},
            {"Case ID": "c4", "Variant Rank": 3, "Variant": "Seal", "concept:name": "Seal", "Duration (Seconds)": 180},
            {"Case ID": "c5", "Variant Rank": 4, "Variant": "Label", "concept:name": "Label", "Duration (Seconds)": 240}
        ]))
        .unwrap()
    }

    fn fetcher() -> TableFetcher<InMemoryTableSource> {
        let mut source = InMemoryTableSource::new();
        source.add_table("M001_Data", machine_rows());
        TableFetcher::new(source)
    }

    #[tokio::test]
    async fn test_rows_are_sorted_by_rank() {
        let render = render_view(&fetcher(), &ViewConfig::steps(), &RenderRequest::default()).await;
        let ids: Vec<String> = render
            .rows
            .column_values("Case ID")
            .unwrap()
            .map(Value::to_string)
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4", "c5"]);
        assert!(render.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_default_process_maps_take_first_three_ranks() {
        let render = render_view(&fetcher(), &ViewConfig::steps(), &RenderRequest::default()).await;
        let ranks: Vec<Option<Value>> = render.process_maps.iter().map(|m| m.rank.clone()).collect();
        assert_eq!(
            ranks,
            vec![
                Some(Value::from(1i64)),
                Some(Value::from(2i64)),
                Some(Value::from(3i64))
            ]
        );
        let first = render.process_maps[0].diagram.as_ref().unwrap();
        assert_eq!(first.labels(), vec!["Fill", "Seal", "Label"]);
    }

    #[tokio::test]
    async fn test_selected_ranks_drive_process_maps() {
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("Variant Rank", vec![Value::from(4i64), Value::from(9i64)]),
        );
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;

        assert_eq!(render.process_maps.len(), 2);
        assert_eq!(render.process_maps[0].variant.as_deref(), Some("Label"));
        // rank 9 has no record
        assert_eq!(render.process_maps[1].diagram, None);
        assert_eq!(render.filters, request.filters.clone().unwrap());
    }

    #[tokio::test]
    async fn test_kpis_and_histograms_follow_filters() {
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("Variant Rank", vec![Value::from(1i64)]),
        );
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;

        assert_eq!(render.kpis.case_count, 2);
        assert_eq!(render.kpis.overall_case_count, 5);
        assert_eq!(render.kpis.mean_duration_minutes, Some(1.5));
        assert_eq!(render.kpis.overall_mean_duration_minutes, Some(3.0));
        assert_eq!(render.duration_histogram.as_ref().unwrap().total(), 2);

        let steps: Vec<&Value> = render.step_histograms.iter().map(|h| &h.step).collect();
        assert_eq!(steps, vec![&Value::from("Fill"), &Value::from("Seal")]);
        assert_eq!(render.step_histograms[0].histogram.total(), 1);
    }

    #[tokio::test]
    async fn test_filter_options_are_returned_per_column() {
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("concept:name", vec![Value::from("Seal")]),
        );
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;

        assert_eq!(render.filter_options[0].column, "Variant Rank");
        assert_eq!(
            render.filter_options[0].values,
            vec![Value::from(1i64), Value::from(3i64)]
        );
        assert_eq!(render.filter_options[1].values.len(), 3);
    }

    #[tokio::test]
    async fn test_default_filters_apply_only_without_request_filters() {
        let mut view = ViewConfig::steps();
        view.default_filters = FilterSpec::new().with("Variant Rank", vec![Value::from(3i64)]);

        let defaulted = render_view(&fetcher(), &view, &RenderRequest::default()).await;
        assert_eq!(defaulted.filtered_rows, 1);

        let explicit = render_view(
            &fetcher(),
            &view,
            &RenderRequest::with_filters(FilterSpec::new()),
        )
        .await;
        assert_eq!(explicit.filtered_rows, 5);
    }

    #[tokio::test]
    async fn test_row_limit_truncates_rows_only() {
        let request = RenderRequest {
            row_limit: Some(2),
            ..Default::default()
        };
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;
        assert_eq!(render.rows.len(), 2);
        assert_eq!(render.filtered_rows, 5);
        assert_eq!(render.kpis.case_count, 5);
    }

    #[tokio::test]
    async fn test_unknown_machine_degrades() {
        let request = RenderRequest {
            machine: Some("M999".to_string()),
            ..Default::default()
        };
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;

        assert_eq!(render.table, None);
        assert!(render.rows.is_empty());
        assert_eq!(render.kpis.mean_duration_minutes, None);
        assert!(render.process_maps.is_empty());
        assert!(matches!(
            render.warnings[0],
            DashboardError::DataUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_filter_column_is_reported() {
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("color", vec![Value::from("red")]),
        );
        let render = render_view(&fetcher(), &ViewConfig::steps(), &request).await;
        assert_eq!(render.filtered_rows, 5);
        assert!(render
            .warnings
            .contains(&DashboardError::unknown_column("color")));
    }

    #[tokio::test]
    async fn test_view_without_rank_uses_first_variant() {
        let mut source = InMemoryTableSource::new();
        source.add_table(
            "ch1_bags_count_prod",
            Table::from_json(&json!([
                {"time": "2024-03-01 06:00:00", "color": "red", "section": "A", "Case ID": "b1", "Variant": "Fill,Seal", "Duration (Seconds)": 90},
                {"time": "2024-03-01 07:00:00", "color": "blue", "section": "B", "Case ID": "b2", "Variant": "Fill", "Duration (Seconds)": 30}
            ]))
            .unwrap(),
        );
        let fetcher = TableFetcher::new(source);
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("color", vec![Value::from("blue")]),
        );

        let render = render_view(&fetcher, &ViewConfig::throughput(), &request).await;
        assert_eq!(render.process_maps.len(), 1);
        assert_eq!(render.process_maps[0].variant.as_deref(), Some("Fill"));
        assert!(matches!(
            render.rows.row(0).unwrap().get("time"),
            Some(Value::Timestamp(_))
        ));
    }

    #[tokio::test]
    async fn test_filtered_table_for_export() {
        let request = RenderRequest::with_filters(
            FilterSpec::new().with("concept:name", vec![Value::from("Label")]),
        );
        let (table, warnings) = filtered_table(&fetcher(), &ViewConfig::steps(), &request).await;
        assert_eq!(table.len(), 1);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_variant_listing() {
        let mut source = InMemoryTableSource::new();
        source.add_table(
            "all_variants",
            Table::from_json(&json!([
                {"machine": "M001", "variant": "Fill,Seal"},
                {"machine": "M002", "variant": null},
                {"machine": "M003", "variant": "Seal"}
            ]))
            .unwrap(),
        );
        let fetcher = TableFetcher::new(source);

        let listing = variant_listing(&fetcher, "all_variants", 10).await;
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].machine, "M001");
        assert_eq!(listing.entries[0].diagram.edge_count(), 1);

        let limited = variant_listing(&fetcher, "all_variants", 1).await;
        assert_eq!(limited.entries.len(), 1);

        let missing = variant_listing(&fetcher, "nope", 10).await;
        assert!(missing.entries.is_empty());
        assert_eq!(missing.warnings.len(), 1);
    }
}
