//! Tabular results returned by every runner call.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppError;

/// Column-oriented result of a procedure, function or Cypher call.
///
/// Every row holds exactly one value per column. A scalar result is one
/// column with one row; a side-effect-only call has columns (when the
/// server reported them) and no rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTabular")]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

/// Unchecked wire form; deserialization goes through [`TabularResult::new`].
#[derive(Deserialize)]
struct RawTabular {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

impl TryFrom<RawTabular> for TabularResult {
    type Error = AppError;

    fn try_from(raw: RawTabular) -> Result<Self, Self::Error> {
        Self::new(raw.columns, raw.rows)
    }
}

impl TabularResult {
    /// Creates a result from column names and row-aligned values.
    ///
    /// # Errors
    ///
    /// Returns an error if any row's length differs from the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Result<Self, AppError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(AppError::Internal(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// A result with the given columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// A single-column, single-row result.
    pub fn scalar(column: impl Into<String>, value: JsonValue) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![value]],
        }
    }

    /// Builds a result from keyed records, taking the column order of the
    /// first record. Keys missing from later records become `null`.
    pub fn from_records(records: Vec<IndexMap<String, JsonValue>>) -> Self {
        let mut columns: Vec<String> = records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();

        for record in records.iter().skip(1) {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.swap_remove(c).unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a column, in row order.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &JsonValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn row(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Returns the only value of a one-column, one-row result.
    pub fn squeeze(&self) -> Option<&JsonValue> {
        match (self.columns.len(), self.rows.as_slice()) {
            (1, [row]) => row.first(),
            _ => None,
        }
    }

    /// Keeps only the given columns, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first column that isn't present.
    pub fn project(&self, fields: &[String]) -> Result<TabularResult, AppError> {
        let indices = fields
            .iter()
            .map(|f| {
                self.column_index(f)
                    .ok_or_else(|| AppError::Internal(format!("column not found: {}", f)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns: fields.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Converts the result into keyed records.
    pub fn into_records(self) -> Vec<IndexMap<String, JsonValue>> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// A borrowed view of one row of a [`TabularResult`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [JsonValue],
}

impl<'a> Row<'a> {
    /// Gets a value from the row by column name, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is not found or if deserialization fails.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let name: String = row.get("graphName")?;
    /// let count: i64 = row.get("nodeCount")?;
    /// ```
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, AppError> {
        self.get_raw(key)
            .ok_or_else(|| AppError::Internal(format!("column not found: {}", key)))
            .and_then(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    AppError::Internal(format!("failed to deserialize '{}': {}", key, e))
                })
            })
    }

    /// Gets a value from the row, returning `None` if the column doesn't exist
    /// or is null.
    ///
    /// Still returns an error if the value exists but deserialization fails.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.get_raw(key) {
            Some(v) if v.is_null() => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| AppError::Internal(format!("failed to deserialize '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    /// Returns the raw JSON value for a column, if it exists.
    pub fn get_raw(&self, key: &str) -> Option<&'a JsonValue> {
        self.columns
            .iter()
            .position(|c| c == key)
            .map(|idx| &self.values[idx])
    }

    pub fn values(&self) -> &'a [JsonValue] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_rejects_ragged_rows() {
        let err = serde_json::from_value::<TabularResult>(json!({
            "columns": ["nodeId", "age"],
            "rows": [[0]]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("row 0 has 1 values, expected 2"));

        let result: TabularResult = serde_json::from_value(json!({
            "columns": ["nodeId", "age"],
            "rows": [[0, 30]]
        }))
        .unwrap();
        assert_eq!(result.row(0).unwrap().get::<i64>("age").unwrap(), 30);
    }

    fn graphs() -> TabularResult {
        TabularResult::new(
            vec!["graphName".into(), "nodeCount".into()],
            vec![vec![json!("a"), json!(10)], vec![json!("b"), JsonValue::Null]],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let result = TabularResult::new(vec!["x".into()], vec![vec![json!(1), json!(2)]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_get() {
        let result = graphs();
        let row = result.row(0).unwrap();
        let name: String = row.get("graphName").unwrap();
        let count: i64 = row.get("nodeCount").unwrap();
        assert_eq!(name, "a");
        assert_eq!(count, 10);
    }

    #[test]
    fn test_row_get_missing_key() {
        let result = graphs();
        let row = result.row(0).unwrap();
        assert!(row.get::<String>("missing").is_err());
    }

    #[test]
    fn test_row_get_opt_null() {
        let result = graphs();
        let row = result.row(1).unwrap();
        let count: Option<i64> = row.get_opt("nodeCount").unwrap();
        assert_eq!(count, None);
        let missing: Option<i64> = row.get_opt("missing").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_column() {
        let result = graphs();
        let names: Vec<_> = result.column("graphName").unwrap().collect();
        assert_eq!(names, vec![&json!("a"), &json!("b")]);
        assert!(result.column("nope").is_none());
    }

    #[test]
    fn test_squeeze() {
        assert_eq!(TabularResult::scalar("x", json!(1)).squeeze(), Some(&json!(1)));
        assert_eq!(graphs().squeeze(), None);
        assert_eq!(TabularResult::empty(vec!["x".into()]).squeeze(), None);
    }

    #[test]
    fn test_project() {
        let projected = graphs().project(&["nodeCount".to_string()]).unwrap();
        assert_eq!(projected.columns(), ["nodeCount".to_string()]);
        assert_eq!(projected.len(), 2);
        assert!(graphs().project(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_from_records_fills_missing_keys() {
        let mut first = IndexMap::new();
        first.insert("b".to_string(), json!(1));
        first.insert("a".to_string(), json!(2));
        let mut second = IndexMap::new();
        second.insert("a".to_string(), json!(3));
        second.insert("c".to_string(), json!(4));

        let result = TabularResult::from_records(vec![first, second]);
        assert_eq!(result.columns(), ["b", "a", "c"].map(String::from));
        assert_eq!(result.row(1).unwrap().values(), &[JsonValue::Null, json!(3), json!(4)]);

        let records = result.into_records();
        assert_eq!(records[0].get("c"), Some(&JsonValue::Null));
    }
}
