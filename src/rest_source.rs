use crate::error::TableSourceError;
use crate::source::TableSource;
use crate::table::Table;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Configuration for the hosted REST backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSourceConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`
    pub base_url: String,
    /// Anonymous or service API key sent with every request
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

impl Default for RestSourceConfig {
    fn default() -> Self {
        RestSourceConfig {
            base_url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl RestSourceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        RestSourceConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

/// Table source backed by the hosted database's REST interface.
///
/// Issues `GET {base_url}/rest/v1/{table}?select=*` and reads the answer as a
/// list of records.
#[derive(Debug)]
pub struct RestTableSource {
    client: Client,
    config: RestSourceConfig,
}

impl RestTableSource {
    /// Creates a new REST source.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the base URL is invalid.
    pub fn with_config(config: RestSourceConfig) -> Result<Self, TableSourceError> {
        Url::parse(&config.base_url)
            .map_err(|e| TableSourceError::Other(format!("Invalid base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| TableSourceError::Other(format!("Client creation error: {}", e)))?;

        Ok(RestTableSource { client, config })
    }

    /// Builds the query URL for a table.
    pub fn table_url(&self, table_name: &str) -> Result<Url, TableSourceError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| TableSourceError::Other(format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TableSourceError::Other("Base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["rest", "v1", table_name]);
        url.query_pairs_mut().append_pair("select", "*");
        Ok(url)
    }

    /// Requests the raw JSON body for a table.
    ///
    /// # Errors
    /// Returns `TableSourceError` if the request fails, the backend answers
    /// with a non-success status, or the body is not JSON.
    pub async fn fetch_records(&self, table_name: &str) -> Result<JsonValue, TableSourceError> {
        let url = self.table_url(table_name)?;
        log::debug!("Requesting {}", url);

        let response = self
            .client
            .get(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TableSourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TableSourceError::TableNotFound(table_name.to_string()));
        }
        if !status.is_success() {
            return Err(TableSourceError::Api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| TableSourceError::MalformedResponse(e.to_string()))
    }

    pub fn config(&self) -> &RestSourceConfig {
        &self.config
    }
}

impl TableSource for RestTableSource {
    async fn fetch_table(&self, table_name: &str) -> Result<Table, TableSourceError> {
        let body = self.fetch_records(table_name).await?;
        let table = Table::from_json(&body);
        if let Err(e) = &table {
            log::warn!("Unexpected response shape for table {}: {}", table_name, e);
        }
        table
    }
}
