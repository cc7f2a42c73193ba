//! Row decoding into JSON values.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Decoded rows feed [`QueryResult`](crate::models::QueryResult), whose
//! mappings are then deserialised into result shapes.

use crate::models::DatabaseType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    match lower.as_str() {
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "timestamptz" | "timestamp with time zone" => return TypeCategory::TimestampTz,
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        _ => {}
    }

    // MySQL reports BOOLEAN columns as TINYINT(1), which stays an integer
    if (lower.contains("int") && lower != "interval")
        || lower.contains("serial")
        || lower.contains("tiny")
    {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Wrapper type for raw MySQL DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary columns are exposed as base64 strings.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Decode a nullable column as `T` and render it with `render`.
///
/// A value the driver cannot decode as `T` is an error, never NULL.
fn decode_as<'r, R, T>(
    row: &'r R,
    idx: usize,
    render: impl FnOnce(T) -> JsonValue,
) -> Result<JsonValue, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(row
        .try_get::<Option<T>, _>(idx)?
        .map_or(JsonValue::Null, render))
}

fn text(v: String) -> JsonValue {
    JsonValue::String(v)
}

fn timestamp(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn timestamp_tz(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn date(v: NaiveDate) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn time(v: NaiveTime) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn binary(v: Vec<u8>) -> JsonValue {
    encode_binary_value(&v)
}

/// Trait for converting database rows to positional JSON values.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_values(&self) -> Result<Vec<JsonValue>, sqlx::Error>;
}

impl RowToJson for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Result<Vec<JsonValue>, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Result<Vec<JsonValue>, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Result<Vec<JsonValue>, sqlx::Error> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                sqlite::decode_column(self, idx, declared)
            })
            .collect()
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<JsonValue, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_as(row, idx, binary),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            // TIMESTAMP columns decode without a zone, like DATETIME
            TypeCategory::Timestamp | TypeCategory::TimestampTz => decode_as(row, idx, timestamp),
            TypeCategory::Date => decode_as(row, idx, date),
            TypeCategory::Time => decode_as(row, idx, time),
            _ => decode_as(row, idx, text),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<JsonValue, sqlx::Error> {
        decode_as(row, idx, |v: i64| JsonValue::from(v))
            .or_else(|_| decode_as(row, idx, |v: i32| JsonValue::from(v)))
            .or_else(|_| decode_as(row, idx, |v: i16| JsonValue::from(v)))
            .or_else(|_| decode_as(row, idx, |v: i8| JsonValue::from(v)))
            .or_else(|_| decode_as(row, idx, |v: u64| JsonValue::from(v)))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<JsonValue, sqlx::Error> {
        decode_as(row, idx, float_value)
            .or_else(|_| decode_as(row, idx, |v: f32| float_value(v as f64)))
    }
}

mod postgres {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<JsonValue, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: Decimal| JsonValue::String(v.to_string())),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_as(row, idx, binary),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            TypeCategory::Uuid => decode_as(row, idx, |v: Uuid| JsonValue::String(v.to_string())),
            TypeCategory::Timestamp => decode_as(row, idx, timestamp),
            TypeCategory::TimestampTz => decode_as(row, idx, timestamp_tz),
            TypeCategory::Date => decode_as(row, idx, date),
            TypeCategory::Time => decode_as(row, idx, time),
            _ => decode_as(row, idx, text),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<JsonValue, sqlx::Error> {
        decode_as(row, idx, |v: i64| JsonValue::from(v))
            .or_else(|_| decode_as(row, idx, |v: i32| JsonValue::from(v)))
            .or_else(|_| decode_as(row, idx, |v: i16| JsonValue::from(v)))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<JsonValue, sqlx::Error> {
        decode_as(row, idx, float_value)
            .or_else(|_| decode_as(row, idx, |v: f32| float_value(v as f64)))
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed: the declared type only decides booleans
    /// and JSON, the stored value's own type decides everything else.
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        declared: TypeCategory,
    ) -> Result<JsonValue, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(JsonValue::Null);
        }
        let stored = categorize_type(raw.type_info().name(), DatabaseType::SQLite);

        match (declared, stored) {
            (TypeCategory::Boolean, TypeCategory::Integer) => decode_as(row, idx, JsonValue::Bool),
            (TypeCategory::Json, TypeCategory::Text) => decode_as(row, idx, |v: String| {
                serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
            }),
            (_, TypeCategory::Integer) => decode_as(row, idx, |v: i64| JsonValue::from(v)),
            (_, TypeCategory::Float) => decode_as(row, idx, float_value),
            (_, TypeCategory::Binary) => decode_as(row, idx, binary),
            _ => decode_as(row, idx, text),
        }
    }
}
