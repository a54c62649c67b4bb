use crate::error::TableSourceError;
use crate::source::TableSource;
use crate::table::{Table, Value};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-based table source.
///
/// Holds local snapshots of remote tables so dashboards can run offline.
/// Each snapshot keeps its column order and its rows as JSON objects in
/// their original order. Automatically creates schema on first use.
#[derive(Debug)]
pub struct SqliteTableSource {
    conn: Mutex<Connection>,
}

impl SqliteTableSource {
    /// Creates a new SQLite table source with a file-based database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file. If the file doesn't exist, it will be created.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let source = SqliteTableSource {
            conn: Mutex::new(Connection::open(db_path)?),
        };
        source.ensure_schema()?;
        Ok(source)
    }

    /// Creates a new SQLite table source with an in-memory database.
    ///
    /// Useful for testing.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let source = SqliteTableSource {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        source.ensure_schema()?;
        Ok(source)
    }

    fn ensure_schema(&self) -> SqliteResult<()> {
        let conn = self.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshot_tables (
                table_name TEXT PRIMARY KEY,
                columns TEXT NOT NULL,
                stored_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshot_rows (
                table_name TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                row_data TEXT NOT NULL,
                PRIMARY KEY (table_name, row_index)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshot_rows_table ON snapshot_rows(table_name)",
            [],
        )?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the snapshot of `table_name` with `table`.
    ///
    /// # Returns
    /// The number of rows written.
    pub fn store_table(&self, table_name: &str, table: &Table) -> Result<usize, TableSourceError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM snapshot_rows WHERE table_name = ?1",
            params![table_name],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot_tables (table_name, columns, stored_at) VALUES (?1, ?2, ?3)",
            params![
                table_name,
                serde_json::to_string(table.columns())?,
                Utc::now().to_rfc3339()
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshot_rows (table_name, row_index, row_data) VALUES (?1, ?2, ?3)",
            )?;
            for (idx, row) in table.rows().enumerate() {
                stmt.execute(params![table_name, idx as i64, serde_json::to_string(&row)?])?;
            }
        }

        tx.commit()?;
        Ok(table.len())
    }

    /// Loads a stored snapshot.
    ///
    /// # Errors
    /// Returns `TableSourceError::TableNotFound` if no snapshot exists for the table.
    pub fn load_table(&self, table_name: &str) -> Result<Table, TableSourceError> {
        let conn = self.lock();

        let columns_json: Option<String> = conn
            .query_row(
                "SELECT columns FROM snapshot_tables WHERE table_name = ?1",
                params![table_name],
                |row| row.get(0),
            )
            .optional()?;
        let columns_json =
            columns_json.ok_or_else(|| TableSourceError::TableNotFound(table_name.to_string()))?;
        let columns: Vec<String> = serde_json::from_str(&columns_json)?;

        let mut stmt = conn.prepare(
            "SELECT row_data FROM snapshot_rows WHERE table_name = ?1 ORDER BY row_index",
        )?;
        let rows = stmt.query_map(params![table_name], |row| row.get::<_, String>(0))?;

        let mut table = Table::new(columns.clone());
        for row_result in rows {
            let record: Map<String, JsonValue> = serde_json::from_str(&row_result?)?;
            let values = columns
                .iter()
                .map(|column| record.get(column).map(Value::from_json).unwrap_or(Value::Null))
                .collect();
            table.push_row(values)?;
        }

        Ok(table)
    }

    /// Names of all stored snapshots, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, TableSourceError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT table_name FROM snapshot_tables ORDER BY table_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(names)
    }
}

impl TableSource for SqliteTableSource {
    async fn fetch_table(&self, table_name: &str) -> Result<Table, TableSourceError> {
        self.load_table(table_name)
    }
}
