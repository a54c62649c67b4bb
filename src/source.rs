use crate::error::TableSourceError;
use crate::table::Table;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for table source abstraction.
///
/// The dashboard only ever asks a source for "all records of table T";
/// there is no server-side filtering, paging or schema negotiation.
///
/// Implementations can be:
/// - In-memory HashMap (for testing)
/// - The hosted REST backend
/// - A local SQLite snapshot
pub trait TableSource: Send + Sync {
    /// Retrieves every record of the named table.
    ///
    /// # Errors
    /// Returns an error if the table does not exist, the response cannot be
    /// read as a list of records, or the source cannot be reached.
    fn fetch_table(
        &self,
        table_name: &str,
    ) -> impl Future<Output = Result<Table, TableSourceError>> + Send;
}

/// In-memory table source for tests and demos.
///
/// Counts every fetch so callers can verify memoization.
#[derive(Debug, Default)]
pub struct InMemoryTableSource {
    tables: HashMap<String, Table>,
    fetches: AtomicUsize,
}

impl InMemoryTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table.
    pub fn add_table(&mut self, table_name: impl Into<String>, table: Table) {
        self.tables.insert(table_name.into(), table);
    }

    /// Number of `fetch_table` calls served so far, including failed ones.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TableSource for InMemoryTableSource {
    async fn fetch_table(&self, table_name: &str) -> Result<Table, TableSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| TableSourceError::TableNotFound(table_name.to_string()))
    }
}
