//! Dashboard view configuration.
//!
//! Each view names its table (or a machine -> table map), the columns users
//! can filter on, and the columns the aggregates read. The built-in defaults
//! describe the throughput and per-machine steps pages.

use crate::aggregate::DEFAULT_HISTOGRAM_BINS;
use crate::filter::FilterSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default number of process maps shown when no rank is selected.
pub const DEFAULT_MAX_PROCESS_MAPS: usize = 3;

/// A machine selectable in a view, and the table holding its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTable {
    pub machine: String,
    pub table: String,
}

/// Where a view reads its rows from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableBinding {
    /// A single fixed table
    Table(String),
    /// One table per machine
    Machines {
        tables: Vec<MachineTable>,
        #[serde(default)]
        default_machine: Option<String>,
    },
}

impl TableBinding {
    /// Resolves the machine to use: the requested one, else the configured
    /// default, else the first listed. `None` for fixed tables.
    pub fn machine<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        match self {
            TableBinding::Table(_) => None,
            TableBinding::Machines {
                tables,
                default_machine,
            } => requested
                .or(default_machine.as_deref())
                .or_else(|| tables.first().map(|entry| entry.machine.as_str())),
        }
    }

    /// Table name for the requested machine, or `None` if the machine is unknown.
    pub fn table_name(&self, requested: Option<&str>) -> Option<&str> {
        match self {
            TableBinding::Table(table) => Some(table.as_str()),
            TableBinding::Machines { tables, .. } => {
                let machine = self.machine(requested)?;
                tables
                    .iter()
                    .find(|entry| entry.machine == machine)
                    .map(|entry| entry.table.as_str())
            }
        }
    }

    pub fn machines(&self) -> Vec<&str> {
        match self {
            TableBinding::Table(_) => Vec::new(),
            TableBinding::Machines { tables, .. } => {
                tables.iter().map(|entry| entry.machine.as_str()).collect()
            }
        }
    }
}

fn default_histogram_bins() -> usize {
    DEFAULT_HISTOGRAM_BINS
}

fn default_max_process_maps() -> usize {
    DEFAULT_MAX_PROCESS_MAPS
}

/// One dashboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub source: TableBinding,
    /// Filterable columns, in display order
    #[serde(default)]
    pub filters: Vec<String>,
    /// Applied when a request carries no filter specification
    #[serde(default)]
    pub default_filters: FilterSpec,
    /// Columns converted to timestamps after fetching
    #[serde(default)]
    pub timestamp_columns: Vec<String>,
    /// Column the rows are sorted by (ascending) after fetching
    #[serde(default)]
    pub sort_by: Option<String>,
    /// Case duration in seconds
    #[serde(default)]
    pub duration_column: Option<String>,
    #[serde(default)]
    pub case_id_column: Option<String>,
    /// Comma-separated step sequence
    #[serde(default)]
    pub variant_column: Option<String>,
    #[serde(default)]
    pub rank_column: Option<String>,
    /// Step name, one histogram per distinct step
    #[serde(default)]
    pub step_column: Option<String>,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_max_process_maps")]
    pub max_process_maps: usize,
}

impl ViewConfig {
    /// Throughput page: bag counts per production line.
    pub fn throughput() -> Self {
        ViewConfig {
            name: "throughput".to_string(),
            title: "Throughput Analysis".to_string(),
            source: TableBinding::Table("ch1_bags_count_prod".to_string()),
            filters: vec!["color".to_string(), "section".to_string()],
            default_filters: FilterSpec::default(),
            timestamp_columns: vec!["time".to_string()],
            sort_by: None,
            duration_column: Some("Duration (Seconds)".to_string()),
            case_id_column: Some("Case ID".to_string()),
            variant_column: Some("Variant".to_string()),
            rank_column: None,
            step_column: None,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            max_process_maps: 1,
        }
    }

    /// Steps page: per-machine step sequences ranked by variant popularity.
    pub fn steps() -> Self {
        let tables = ["M001", "M002", "M003"]
            .iter()
            .map(|machine| MachineTable {
                machine: machine.to_string(),
                table: format!("{}_Data", machine),
            })
            .collect();

        ViewConfig {
            name: "steps".to_string(),
            title: "Steps Analysis".to_string(),
            source: TableBinding::Machines {
                tables,
                default_machine: Some("M001".to_string()),
            },
            filters: vec!["Variant Rank".to_string(), "concept:name".to_string()],
            default_filters: FilterSpec::default(),
            timestamp_columns: Vec::new(),
            sort_by: Some("Variant Rank".to_string()),
            duration_column: Some("Duration (Seconds)".to_string()),
            case_id_column: Some("Case ID".to_string()),
            variant_column: Some("Variant".to_string()),
            rank_column: Some("Variant Rank".to_string()),
            step_column: Some("concept:name".to_string()),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            max_process_maps: DEFAULT_MAX_PROCESS_MAPS,
        }
    }
}

/// All configured views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub views: Vec<ViewConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            views: vec![ViewConfig::throughput(), ViewConfig::steps()],
        }
    }
}

impl DashboardConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: DashboardConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn view(&self, name: &str) -> Option<&ViewConfig> {
        self.views.iter().find(|view| view.name == name)
    }

    /// Rejects unnamed views, duplicate names, and machine maps without machines.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for view in &self.views {
            if view.name.trim().is_empty() {
                return Err(ConfigError::Invalid("view name cannot be empty".to_string()));
            }
            if !names.insert(view.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate view name '{}'",
                    view.name
                )));
            }
            if let TableBinding::Machines { tables, .. } = &view.source {
                if tables.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "view '{}' lists no machines",
                        view.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Errors that can occur when loading dashboard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io(String),
    /// The configuration is not valid JSON for the expected shape
    Parse(String),
    /// The configuration parsed but is inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config read error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
