//! Ordered column → value rows.

use crate::error::StoreError;
use crate::value::{FromValue, Value};

/// One row: ordered column names with their values.
///
/// Entities convert to and from records; stores read and write them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Set `column` to `value`, replacing an existing entry in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
        self
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|idx| &self.values[idx])
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.position(column)?;
        self.columns.remove(idx);
        Some(self.values.remove(idx))
    }

    /// Decode a required column.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T, StoreError> {
        let value = self
            .get(column)
            .ok_or_else(|| StoreError::decode(column, "column not present in row"))?;
        T::from_value(value).map_err(|e| with_column(e, column))
    }

    /// Decode a column, falling back to `T::default()` when the row does not carry it.
    ///
    /// Rows produced by a restricted projection only hold the selected columns.
    pub fn get_or_default<T: FromValue + Default>(&self, column: &str) -> Result<T, StoreError> {
        match self.get(column) {
            Some(value) => T::from_value(value).map_err(|e| with_column(e, column)),
            None => Ok(T::default()),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Keep only the given columns, in the given order.
    pub fn project(&self, columns: &[&str]) -> Record {
        let mut out = Record::with_capacity(columns.len());
        for column in columns {
            if let Some(value) = self.get(column) {
                out.set(*column, value.clone());
            }
        }
        out
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter().zip(self.values)
    }
}

fn with_column(err: StoreError, column: &str) -> StoreError {
    match err {
        StoreError::Decode { column: c, message } if c.is_empty() => StoreError::Decode {
            column: column.to_string(),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut r = Record::new();
        r.set("id", 1).set("name", "a").set("id", 2);
        assert_eq!(r.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(r.get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn try_get_names_the_column() {
        let r = Record::new().with("age", "old");
        let err = r.try_get::<i32>("age").unwrap_err();
        assert!(err.to_string().contains("'age'"));
        assert!(r.try_get::<i32>("missing").is_err());
    }

    #[test]
    fn missing_columns_default() {
        let r = Record::new().with("name", "a");
        assert_eq!(r.get_or_default::<i64>("age").unwrap(), 0);
        assert_eq!(r.get_or_default::<String>("name").unwrap(), "a");
    }

    #[test]
    fn project_keeps_order() {
        let r = Record::new().with("a", 1).with("b", 2).with("c", 3);
        let p = r.project(&["c", "a"]);
        assert_eq!(p.columns(), &["c".to_string(), "a".to_string()]);
    }
}
