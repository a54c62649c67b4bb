use crate::error::TableSourceError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ordered_float::OrderedFloat;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// A single field value of a table record.
///
/// Numbers are stored as `OrderedFloat` so values can be hashed and used as
/// members of filter sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Creates a numeric value.
    pub fn number(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the numeric payload, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Converts a JSON field into a table value.
    ///
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map(Value::number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// Converts the value back into JSON. Integral numbers are emitted as integers.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => {
                let n = n.into_inner();
                if is_integral(n) {
                    JsonValue::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null)
                }
            }
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        }
    }

    /// Ascending sort order used for table sorting: numbers, strings,
    /// timestamps, booleans, and nulls last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| match (self, other) {
                (Value::Number(a), Value::Number(b)) => a.cmp(b),
                (Value::String(a), Value::String(b)) => a.cmp(b),
                (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
                (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Bool(_) => 3,
            Value::Null => 4,
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                let n = n.into_inner();
                if is_integral(n) {
                    write!(f, "{}", n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(|json| Value::from_json(&json))
    }
}

/// Parses the timestamp layouts the backend emits.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres text output, e.g. "2024-01-15 08:00:00+00"
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// An ordered sequence of records sharing one column set.
///
/// Every row holds exactly one value per column; fields a record did not
/// carry are stored as `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of a single table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Returns the value of `column`, or `None` if the table has no such column.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row. The row must carry one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableSourceError> {
        if row.len() != self.columns.len() {
            return Err(TableSourceError::MalformedResponse(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Normalizes JSON records into a table.
    ///
    /// The column set is the union of all record fields in order of first
    /// appearance.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Map<String, JsonValue>>,
    {
        let records: Vec<&Map<String, JsonValue>> = records.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for record in &records {
            for key in record.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(Value::from_json).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Table { columns, rows }
    }

    /// Builds a table from a query response.
    ///
    /// Accepts a bare JSON array of objects or an object wrapping that array
    /// under `data`.
    ///
    /// # Errors
    /// Returns `TableSourceError::MalformedResponse` for any other shape.
    pub fn from_json(value: &JsonValue) -> Result<Self, TableSourceError> {
        let items = match value {
            JsonValue::Array(items) => items,
            JsonValue::Object(envelope) => match envelope.get("data") {
                Some(JsonValue::Array(items)) => items,
                _ => {
                    return Err(TableSourceError::MalformedResponse(
                        "response object has no 'data' array".to_string(),
                    ))
                }
            },
            other => {
                return Err(TableSourceError::MalformedResponse(format!(
                    "expected a list of records, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            match item {
                JsonValue::Object(record) => records.push(record),
                other => {
                    return Err(TableSourceError::MalformedResponse(format!(
                        "record {} is {}, expected an object",
                        idx,
                        json_kind(other)
                    )))
                }
            }
        }

        Ok(Self::from_records(records))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Iterates the values of one column, or returns `None` for an unknown column.
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Distinct non-null values of a column in order of first appearance.
    pub fn distinct(&self, column: &str) -> Vec<Value> {
        let Some(values) = self.column_values(column) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        values
            .filter(|value| !value.is_null())
            .filter(|value| seen.insert(*value))
            .cloned()
            .collect()
    }

    /// Returns the rows for which `keep` holds, in original order.
    pub(crate) fn select<F>(&self, keep: F) -> Table
    where
        F: Fn(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Returns the first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Returns a copy with the string values of `column` parsed as timestamps.
    ///
    /// Values that cannot be parsed become `Value::Null`. An unknown column
    /// leaves the table unchanged.
    pub fn with_timestamps(&self, column: &str) -> Table {
        let mut table = self.clone();
        let Some(idx) = table.column_index(column) else {
            return table;
        };
        for row in &mut table.rows {
            let parsed = match &row[idx] {
                Value::Timestamp(ts) => Value::Timestamp(*ts),
                Value::String(text) => parse_timestamp(text)
                    .map(Value::Timestamp)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
            row[idx] = parsed;
        }
        table
    }

    /// Returns a copy stably sorted ascending by `column`.
    pub fn sorted_by(&self, column: &str) -> Table {
        let mut table = self.clone();
        if let Some(idx) = table.column_index(column) {
            table.rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
        }
        table
    }

    /// Renders the table as CSV with a header row. A table without columns
    /// renders as an empty document.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        if self.columns.is_empty() {
            return Ok(String::new());
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

struct RowList<'a>(&'a Table);

impl Serialize for RowList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows())
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Table", 2)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("rows", &RowList(self))?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_json(&json!([
            {"Case ID": "c1", "Variant Rank": 2, "Duration (Seconds)": 120},
            {"Case ID": "c2", "Variant Rank": 1, "Duration (Seconds)": 60.5},
            {"Case ID": null, "Variant Rank": 1, "Duration (Seconds)": 30}
        ]))
        .unwrap()
    }

    #[test]
    fn test_from_json_array_of_records() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.columns(),
            &["Case ID", "Variant Rank", "Duration (Seconds)"]
        );
        assert_eq!(
            table.row(1).unwrap().get("Duration (Seconds)"),
            Some(&Value::number(60.5))
        );
    }

    #[test]
    fn test_from_json_data_envelope() {
        let table = Table::from_json(&json!({"data": [{"machine": "M001"}], "count": null})).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.row(0).unwrap().get("machine"), Some(&Value::from("M001")));
    }

    #[test]
    fn test_from_json_rejects_unexpected_shapes() {
        assert!(matches!(
            Table::from_json(&json!({"error": "boom"})),
            Err(TableSourceError::MalformedResponse(_))
        ));
        assert!(matches!(
            Table::from_json(&json!("text")),
            Err(TableSourceError::MalformedResponse(_))
        ));
        assert!(matches!(
            Table::from_json(&json!([1, 2])),
            Err(TableSourceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_column_union_fills_missing_fields_with_null() {
        let table = Table::from_json(&json!([{"a": 1}, {"b": "x"}])).unwrap();
        assert_eq!(table.columns(), &["a", "b"]);
        assert_eq!(table.row(0).unwrap().get("b"), Some(&Value::Null));
        assert_eq!(table.row(1).unwrap().get("a"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_array_gives_empty_table() {
        let table = Table::from_json(&json!([])).unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        assert!(table.push_row(vec![Value::from(1i64), Value::Null]).is_ok());
        assert!(table.push_row(vec![Value::from(1i64)]).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_skips_nulls_and_keeps_first_appearance() {
        let table = sample();
        assert_eq!(
            table.distinct("Variant Rank"),
            vec![Value::number(2.0), Value::number(1.0)]
        );
        assert_eq!(
            table.distinct("Case ID"),
            vec![Value::from("c1"), Value::from("c2")]
        );
        assert!(table.distinct("missing").is_empty());
    }

    #[test]
    fn test_sorted_by_is_stable_with_nulls_last() {
        let table = Table::from_json(&json!([
            {"rank": null, "id": "a"},
            {"rank": 2, "id": "b"},
            {"rank": 1, "id": "c"},
            {"rank": 2, "id": "d"}
        ]))
        .unwrap();
        let ids: Vec<String> = table
            .sorted_by("rank")
            .rows()
            .map(|row| row.get("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_with_timestamps_parses_known_layouts() {
        let table = Table::from_json(&json!([
            {"time": "2024-01-15T08:30:00Z"},
            {"time": "2024-01-15 08:30:00"},
            {"time": "2024-01-15 08:30:00+00"},
            {"time": "2024-01-15"},
            {"time": "not a date"}
        ]))
        .unwrap()
        .with_timestamps("time");

        let expected = Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap());
        let values: Vec<&Value> = table.column_values("time").unwrap().collect();
        assert_eq!(values[0], &expected);
        assert_eq!(values[1], &expected);
        assert_eq!(values[2], &expected);
        assert_eq!(
            values[3],
            &Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(values[4], &Value::Null);
    }

    #[test]
    fn test_number_display_and_json() {
        assert_eq!(Value::number(3.0).to_string(), "3");
        assert_eq!(Value::number(2.5).to_string(), "2.5");
        assert_eq!(Value::number(3.0).to_json(), json!(3));
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_to_csv_writes_header_and_rows() {
        let csv = sample().head(2).to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Case ID,Variant Rank,Duration (Seconds)");
        assert_eq!(lines[1], "c1,2,120");
        assert_eq!(lines[2], "c2,1,60.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_to_csv_without_columns_is_empty() {
        assert_eq!(Table::default().to_csv().unwrap(), "");
    }

    #[test]
    fn test_serialize_as_columns_and_row_objects() {
        let table = sample().head(1);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            json!({
                "columns": ["Case ID", "Variant Rank", "Duration (Seconds)"],
                "rows": [{"Case ID": "c1", "Variant Rank": 2, "Duration (Seconds)": 120}]
            })
        );
    }

    #[test]
    fn test_value_deserializes_from_json() {
        let values: Vec<Value> = serde_json::from_value(json!(["M001", 1, null, true])).unwrap();
        assert_eq!(
            values,
            vec![Value::from("M001"), Value::number(1.0), Value::Null, Value::Bool(true)]
        );
    }
}
