use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
use process_analytics::server::create_router;
use process_analytics::{
    AppState, DashboardConfig, RestSourceConfig, RestTableSource, TableSource, TableSourceError,
    Value,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn mock_table(Path(table): Path<String>) -> Result<Json<JsonValue>, StatusCode> {
    match table.as_str() {
        "M001_Data" => Ok(Json(json!([
            {"Case ID": "c1", "Variant Rank": 1, "Variant": "Fill,Seal,Pack", "concept:name": "Fill", "Duration (Seconds)": 60},
            {"Case ID": "c2", "Variant Rank": 2, "Variant": "Fill,Pack", "concept:name": "Fill", "Duration (Seconds)": 180}
        ]))),
        "all_variants" => Ok(Json(json!([
            {"machine": "M001", "variant": "Fill,Seal,Pack"}
        ]))),
        "broken" => Ok(Json(json!({"unexpected": true}))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Serves `app` on an ephemeral loopback port and returns its base URL.
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_backend() -> String {
    spawn(Router::new().route("/rest/v1/:table", get(mock_table))).await
}

#[tokio::test]
async fn rest_source_reads_backend_tables() {
    init_logging();
    let base_url = spawn_backend().await;
    let source = RestTableSource::with_config(RestSourceConfig::new(base_url, "anon")).unwrap();

    let table = source.fetch_table("M001_Data").await.unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.row(1).unwrap().get("Case ID"), Some(&Value::from("c2")));

    let missing = source.fetch_table("M404_Data").await;
    assert!(matches!(missing, Err(TableSourceError::TableNotFound(_))));

    let broken = source.fetch_table("broken").await;
    assert!(matches!(broken, Err(TableSourceError::MalformedResponse(_))));
}

#[tokio::test]
async fn server_renders_views_from_rest_backend() {
    init_logging();
    let backend = spawn_backend().await;
    let source = RestTableSource::with_config(RestSourceConfig::new(backend, "anon")).unwrap();
    let state = AppState::new(source, DashboardConfig::default(), Duration::from_secs(600));
    let server = spawn(create_router(Arc::new(state))).await;
    let client = reqwest::Client::new();

    let health: JsonValue = client
        .get(format!("{}/health", server))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let render: JsonValue = client
        .post(format!("{}/views/steps/render", server))
        .json(&json!({"filters": {"Variant Rank": [2]}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(render["filtered_rows"], 1);
    assert_eq!(render["total_rows"], 2);
    assert_eq!(render["kpis"]["mean_duration_minutes"], 3.0);
    assert_eq!(render["process_maps"][0]["variant"], "Fill,Pack");

    let unknown = client
        .post(format!("{}/views/reports/render", server))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let csv = client
        .post(format!("{}/views/steps/export", server))
        .json(&json!({"filters": {"Variant Rank": [1]}}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("c1,"));

    let variants: JsonValue = client
        .get(format!("{}/variants", server))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(variants["entries"][0]["diagram"]["edges"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn server_reports_missing_tables_as_warnings() {
    init_logging();
    let backend = spawn_backend().await;
    let source = RestTableSource::with_config(RestSourceConfig::new(backend, "anon")).unwrap();
    let state = AppState::new(source, DashboardConfig::default(), Duration::from_secs(600));
    let server = spawn(create_router(Arc::new(state))).await;

    let response = reqwest::get(format!("{}/tables/ch1_bags_count_prod", server))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 0);
    assert_eq!(body["warnings"][0]["kind"], "DataUnavailable");
}
