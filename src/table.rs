//! In-memory named-column tables
//!
//! Interaction data, recommendation output and evaluation input all travel as
//! a [`Table`]: an ordered set of uniquely named, equally long columns.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 2^63; numeric identifiers must lie in `[-2^63, 2^63)`
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// User or item identifier
///
/// Integers order before text; within a kind the natural order applies. This
/// order is the tie-break order of every ranking in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(v) => write!(f, "{}", v),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Int(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Text(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Text(value)
    }
}

impl Id {
    /// Parse a raw field: integers become `Int`, anything else `Text`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(v) => Id::Int(v),
            Err(_) => Id::Text(raw.to_string()),
        }
    }
}

/// A single table column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Ids(Vec<Id>),
    Numbers(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Ids(v) => v.len(),
            Column::Numbers(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Ids(_) => "ids",
            Column::Numbers(_) => "numbers",
            Column::Text(_) => "text",
        }
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Ids(v) => Column::Ids(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Numbers(v) => Column::Numbers(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }
}

/// Ordered collection of uniquely named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Table::push_column`]
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Append a column; its length must match the existing columns
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.names.iter().any(|n| *n == name) {
            return Err(Error::invalid_format(format!(
                "duplicate column '{}'",
                name
            )));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(Error::invalid_format(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::schema(name, "required column is missing"))
    }

    /// Read a column as identifiers
    ///
    /// Integral numbers within `i64` range and text are accepted as
    /// identifiers; anything else is not.
    pub fn ids(&self, name: &str) -> Result<Cow<'_, [Id]>> {
        match self.require(name)? {
            Column::Ids(v) => Ok(Cow::Borrowed(v.as_slice())),
            Column::Text(v) => Ok(Cow::Owned(v.iter().map(|s| Id::Text(s.clone())).collect())),
            Column::Numbers(v) => v
                .iter()
                .map(|&x| {
                    if x.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&x) {
                        Ok(Id::Int(x as i64))
                    } else {
                        Err(Error::schema(
                            name,
                            format!("value {} is not a valid identifier", x),
                        ))
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Cow::Owned),
        }
    }

    /// Read a numeric column
    pub fn numbers(&self, name: &str) -> Result<&[f64]> {
        match self.require(name)? {
            Column::Numbers(v) => Ok(v),
            other => Err(Error::schema(
                name,
                format!("expected a numeric column, found {}", other.kind()),
            )),
        }
    }

    /// Read a text column
    pub fn texts(&self, name: &str) -> Result<&[String]> {
        match self.require(name)? {
            Column::Text(v) => Ok(v),
            other => Err(Error::schema(
                name,
                format!("expected a text column, found {}", other.kind()),
            )),
        }
    }

    /// New table holding the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
        }
    }
}
