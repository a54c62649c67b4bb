//! Error types shared by the dashboard pipeline.
//!
//! `TableSourceError` is what a data source reports at its boundary.
//! `DashboardError` is the recovered-condition taxonomy of a render cycle:
//! every variant is converted into a degraded-but-renderable state and
//! reported alongside the result instead of aborting it.

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Errors that can occur when reading a table from a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSourceError {
    /// The named table does not exist in the source
    TableNotFound(String),
    /// The source answered with something that is not a list of records
    MalformedResponse(String),
    /// Transport-level failure (connection refused, timeout, ...)
    Network(String),
    /// The source answered with a non-success status
    Api(String),
    /// Generic error message
    Other(String),
}

impl std::fmt::Display for TableSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSourceError::TableNotFound(table) => write!(f, "Table not found: {}", table),
            TableSourceError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            TableSourceError::Network(msg) => write!(f, "Network error: {}", msg),
            TableSourceError::Api(msg) => write!(f, "API error: {}", msg),
            TableSourceError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TableSourceError {}

impl From<rusqlite::Error> for TableSourceError {
    fn from(err: rusqlite::Error) -> Self {
        TableSourceError::Other(format!("SQL error: {}", err))
    }
}

impl From<serde_json::Error> for TableSourceError {
    fn from(err: serde_json::Error) -> Self {
        TableSourceError::MalformedResponse(err.to_string())
    }
}

/// Conditions recovered during a render cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    /// A fetch produced no usable data; the cycle continues with an empty table
    DataUnavailable { table: String, reason: String },
    /// An aggregate was requested over zero usable records
    EmptyAggregation { column: String },
    /// A filter or aggregate referenced a column the table does not have
    UnknownColumn { column: String },
}

impl DashboardError {
    pub fn data_unavailable(table: impl Into<String>, reason: impl Into<String>) -> Self {
        DashboardError::DataUnavailable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn empty_aggregation(column: impl Into<String>) -> Self {
        DashboardError::EmptyAggregation {
            column: column.into(),
        }
    }

    pub fn unknown_column(column: impl Into<String>) -> Self {
        DashboardError::UnknownColumn {
            column: column.into(),
        }
    }

    /// Stable identifier used in API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::DataUnavailable { .. } => "DataUnavailable",
            DashboardError::EmptyAggregation { .. } => "EmptyAggregation",
            DashboardError::UnknownColumn { .. } => "UnknownColumn",
        }
    }
}

impl std::fmt::Display for DashboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DashboardError::DataUnavailable { table, reason } => {
                write!(f, "No data available for table '{}': {}", table, reason)
            }
            DashboardError::EmptyAggregation { column } => {
                write!(f, "No data to aggregate in column '{}'", column)
            }
            DashboardError::UnknownColumn { column } => write!(f, "Unknown column '{}'", column),
        }
    }
}

impl std::error::Error for DashboardError {}

impl Serialize for DashboardError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DashboardError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
