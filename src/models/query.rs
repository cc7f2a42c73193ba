//! Query-related data models.
//!
//! This module defines bound statement parameters and [`QueryResult`], the
//! wrapper that exposes a driver result set as mappings or scalars.

use crate::error::{DbError, DbResult};
use crate::models::Shape;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// One row keyed by projected column name, in projection order.
pub type Mapping = serde_json::Map<String, JsonValue>;

/// A parameter value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    /// Bound with the driver's own timestamp type, not as text
    Timestamp(NaiveDateTime),
}

impl Param {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

macro_rules! impl_param_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::$variant(v.into())
                }
            }
        )+
    };
}

impl_param_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    JsonValue => Json,
    NaiveDateTime => Timestamp,
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

/// Result of executing one statement.
///
/// Rows are fetched eagerly by the driver; views over them ([`Mappings`],
/// [`Scalars`]) are built lazily and consume the result.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    columns: Arc<[String]>,
    rows: Vec<Vec<JsonValue>>,
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl QueryResult {
    pub(crate) fn from_rows(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
            rows_affected: 0,
            last_insert_id: None,
        }
    }

    pub(crate) fn from_write(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }

    /// Column names of the result set. Empty for writes and empty result sets.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows changed by an INSERT/UPDATE/DELETE.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Row id assigned by the last INSERT (SQLite, MySQL).
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    /// Row mappings keyed by projected column names.
    pub fn mappings(self) -> Mappings {
        Mappings {
            columns: self.columns,
            rows: self.rows.into_iter(),
        }
    }

    /// All row mappings.
    pub fn all(self) -> Vec<Mapping> {
        self.mappings().collect()
    }

    /// First row, ignoring the rest.
    pub fn first(self) -> Option<Mapping> {
        self.mappings().next()
    }

    /// At most one row; more than one is an error.
    pub fn one_or_none(self) -> DbResult<Option<Mapping>> {
        match self.rows.len() {
            0 | 1 => Ok(self.first()),
            n => Err(DbError::multiple_results(n)),
        }
    }

    /// Exactly one row.
    pub fn one(self) -> DbResult<Mapping> {
        self.one_or_none()?.ok_or(DbError::NoResult)
    }

    /// First column of the first row, or `None` when there are no rows.
    pub fn scalar(&self) -> Option<JsonValue> {
        self.rows.first().and_then(|row| row.first()).cloned()
    }

    /// First column of the only row; more than one row is an error.
    pub fn scalar_one_or_none(&self) -> DbResult<Option<JsonValue>> {
        match self.rows.len() {
            0 | 1 => Ok(self.scalar()),
            n => Err(DbError::multiple_results(n)),
        }
    }

    /// First-column values of every row.
    ///
    /// Kept for parity with scalar-style call sites. Prefer [`Self::mappings`]
    /// for shaped results: scalars drop every column after the first.
    pub fn scalars(self) -> Scalars {
        Scalars {
            rows: self.rows.into_iter(),
        }
    }

    /// Validate every row into the shape `T`.
    pub fn into_shapes<T: Shape>(self) -> DbResult<Vec<T>> {
        self.mappings().map(T::from_mapping).collect()
    }
}

/// Single-pass iterator over row mappings.
#[derive(Debug)]
pub struct Mappings {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<JsonValue>>,
}

impl Iterator for Mappings {
    type Item = Mapping;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(self.columns.iter().cloned().zip(row).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Mappings {}

/// Single-pass iterator over first-column values.
#[derive(Debug)]
pub struct Scalars {
    rows: std::vec::IntoIter<Vec<JsonValue>>,
}

impl Iterator for Scalars {
    type Item = JsonValue;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.into_iter().next().unwrap_or(JsonValue::Null))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Scalars {}
