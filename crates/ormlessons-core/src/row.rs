//! Result rows and typed column access.

use crate::Result;
use crate::error::{ConversionError, Error};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column names of one result set, shared by all of its rows.
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One row of a SELECT, as handed to `Model::from_row`.
///
/// Entities read their columns by name, so a mapping survives a reordered
/// projection (`SELECT blogs.*` after a join, for instance).
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::sharing(Arc::new(Columns::new(names)), values)
    }

    /// A row whose column names are shared with the rest of its result set.
    pub fn sharing(columns: Arc<Columns>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.values.get(i))
    }

    /// Read column `name` as `T`.
    ///
    /// A missing column and an incompatible value both come back as
    /// `Error::Conversion` naming the column, so a mapping typo and a schema
    /// drift read the same in the logs.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let converted = match self.get_by_name(name) {
            Some(value) => T::from_value(value),
            None => Err(Error::Conversion(ConversionError {
                expected: std::any::type_name::<T>(),
                found: "no such column".to_string(),
                column: None,
            })),
        };
        converted.map_err(|err| match err {
            Error::Conversion(mut e) => {
                e.column = Some(name.to_string());
                Error::Conversion(e)
            }
            other => other,
        })
    }

    /// `(column, value)` pairs in SELECT order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(&self.values)
    }
}

/// Conversion from a fetched column into a model field.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| value.conversion_error("bool"))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| value.conversion_error("i64"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| value.conversion_error("f64"))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| value.conversion_error("String"))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| value.conversion_error("Vec<u8>"))
    }
}

/// NULL reads as `None`; anything else must convert as `T`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
