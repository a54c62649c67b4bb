//! Column/value filtering over a fetched table.
//!
//! The active filters are an explicit `FilterSpec` value: callers load one
//! into a `FilterEngine` at the start of a render cycle and read it back at
//! the end.

use crate::error::DashboardError;
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Accepted values per column. A column that is absent or has no values is
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    constraints: BTreeMap<String, Vec<Value>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accepted values of a column, dropping duplicates.
    /// An empty list removes the constraint.
    pub fn set(&mut self, column: impl Into<String>, values: Vec<Value>) {
        let column = column.into();
        let mut unique: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        if unique.is_empty() {
            self.constraints.remove(&column);
        } else {
            self.constraints.insert(column, unique);
        }
    }

    /// Builder-style variant of [`FilterSpec::set`].
    pub fn with(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.set(column, values);
        self
    }

    pub fn get(&self, column: &str) -> Option<&[Value]> {
        self.constraints
            .get(column)
            .map(Vec::as_slice)
            .filter(|values| !values.is_empty())
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constraints.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> + '_ {
        self.constraints
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(column, values)| (column.as_str(), values.as_slice()))
    }
}

/// Applies a `FilterSpec` to a table over a fixed list of filterable columns.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    table: Arc<Table>,
    columns: Vec<String>,
    spec: FilterSpec,
}

impl FilterEngine {
    pub fn new(table: Arc<Table>, columns: Vec<String>) -> Self {
        FilterEngine {
            table,
            columns,
            spec: FilterSpec::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn filter_columns(&self) -> &[String] {
        &self.columns
    }

    /// Records the accepted values for `column`. Empty `values` clears it.
    ///
    /// # Errors
    /// Returns `DashboardError::UnknownColumn` if `column` is not one of the
    /// filterable columns; the column then stays unconstrained.
    pub fn set_filter(&mut self, column: &str, values: Vec<Value>) -> Result<(), DashboardError> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(DashboardError::unknown_column(column));
        }
        self.spec.set(column, values);
        Ok(())
    }

    /// Loads every constraint of `spec`, returning the ones that were ignored.
    pub fn apply_spec(&mut self, spec: &FilterSpec) -> Vec<DashboardError> {
        spec.iter()
            .filter_map(|(column, values)| self.set_filter(column, values.to_vec()).err())
            .collect()
    }

    /// Currently active values for `column`, or `None` if unconstrained.
    pub fn get_filter_value(&self, column: &str) -> Option<&[Value]> {
        self.spec.get(column)
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Constrained columns the table does not have. They impose no restriction.
    pub fn unresolved_columns(&self) -> Vec<DashboardError> {
        if self.table.is_empty() {
            return Vec::new();
        }
        self.spec
            .iter()
            .filter(|(column, _)| !self.table.has_column(column))
            .map(|(column, _)| DashboardError::unknown_column(column))
            .collect()
    }

    /// Records satisfying every active constraint, in original order.
    pub fn filtered_view(&self) -> Table {
        let view = self.filtered_excluding(None);
        debug!(
            rows = view.len(),
            total = self.table.len(),
            "filters applied"
        );
        view
    }

    /// Values selectable for `column` given every other active constraint.
    ///
    /// Options are distinct, non-null, and in order of first appearance.
    pub fn filter_options(&self, column: &str) -> Vec<Value> {
        if !self.table.has_column(column) {
            return Vec::new();
        }
        self.filtered_excluding(Some(column)).distinct(column)
    }

    fn filtered_excluding(&self, skip: Option<&str>) -> Table {
        let active: Vec<(usize, HashSet<&Value>)> = self
            .spec
            .iter()
            .filter(|(column, _)| Some(*column) != skip)
            .filter_map(|(column, values)| {
                self.table
                    .column_index(column)
                    .map(|idx| (idx, values.iter().collect()))
            })
            .collect();

        if active.is_empty() {
            return (*self.table).clone();
        }

        self.table.select(|row| {
            active
                .iter()
                .all(|(idx, accepted)| accepted.contains(&row[*idx]))
        })
    }
}
