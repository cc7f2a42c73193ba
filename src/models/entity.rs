//! Entity descriptions: the persisted record types a projection narrows.
//!
//! An [`EntityDescription`] is an ordered list of [`ColumnDef`]s for one
//! table. Declaration order is significant: projections always emit columns
//! in this order so the generated SQL is stable across calls.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Logical column type, rendered per dialect when creating tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    BigInt,
    Float,
    Boolean,
    Text,
    /// Bounded string, `VARCHAR(n)`
    String(u32),
    Binary,
    Json,
    Timestamp,
}

impl ColumnType {
    /// SQL type name for the given dialect.
    pub fn sql_type(&self, db: DatabaseType) -> String {
        match (self, db) {
            (Self::Integer, _) => "INTEGER".to_string(),
            (Self::BigInt, _) => "BIGINT".to_string(),
            (Self::Float, DatabaseType::PostgreSQL) => "DOUBLE PRECISION".to_string(),
            (Self::Float, DatabaseType::MySQL) => "DOUBLE".to_string(),
            (Self::Float, DatabaseType::SQLite) => "REAL".to_string(),
            (Self::Boolean, _) => "BOOLEAN".to_string(),
            (Self::Text, _) => "TEXT".to_string(),
            (Self::String(len), _) => format!("VARCHAR({len})"),
            (Self::Binary, DatabaseType::PostgreSQL) => "BYTEA".to_string(),
            (Self::Binary, _) => "BLOB".to_string(),
            (Self::Json, DatabaseType::PostgreSQL) => "JSONB".to_string(),
            (Self::Json, DatabaseType::MySQL) => "JSON".to_string(),
            (Self::Json, DatabaseType::SQLite) => "TEXT".to_string(),
            (Self::Timestamp, DatabaseType::MySQL) => "DATETIME".to_string(),
            (Self::Timestamp, _) => "TIMESTAMP".to_string(),
        }
    }
}

/// Metadata for one persisted column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Attribute name that result shapes refer to.
    pub field: String,
    /// SQL column name. Usually the same as `field`.
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub autoincrement: bool,
}

impl ColumnDef {
    /// A nullable, non-key column whose field and column names match.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            field: name.clone(),
            name,
            column_type,
            primary_key: false,
            nullable: true,
            autoincrement: false,
        }
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Let the database assign values (integer primary keys only).
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Expose the column under a different attribute name.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Whether the projected column needs an alias to carry its field name.
    pub fn is_aliased(&self) -> bool {
        self.field != self.name
    }
}

/// Ordered description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    table: String,
    columns: Vec<ColumnDef>,
}

impl EntityDescription {
    /// Build an entity, rejecting empty or ambiguous column lists.
    pub fn new(
        table: impl Into<String>,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) -> DbResult<Self> {
        let table = table.into();
        let columns: Vec<ColumnDef> = columns.into_iter().collect();

        if table.is_empty() {
            return Err(DbError::schema_mismatch("", "table name cannot be empty"));
        }
        if columns.is_empty() {
            return Err(DbError::schema_mismatch(&table, "entity declares no columns"));
        }

        let mut fields = HashSet::new();
        let mut names = HashSet::new();
        for column in &columns {
            if !fields.insert(column.field.as_str()) {
                return Err(DbError::schema_mismatch(
                    &table,
                    format!("duplicate field '{}'", column.field),
                ));
            }
            if !names.insert(column.name.as_str()) {
                return Err(DbError::schema_mismatch(
                    &table,
                    format!("duplicate column '{}'", column.name),
                ));
            }
            if column.autoincrement
                && !matches!(column.column_type, ColumnType::Integer | ColumnType::BigInt)
            {
                return Err(DbError::schema_mismatch(
                    &table,
                    format!("autoincrement column '{}' must be an integer", column.name),
                ));
            }
        }

        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Look up a column by field name.
    pub fn field(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// Registry of entities, bound to an engine by `Engine::init_db`.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    entities: Vec<Arc<EntityDescription>>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Registering a second entity for the same table
    /// is an error.
    pub fn register(&mut self, entity: EntityDescription) -> DbResult<Arc<EntityDescription>> {
        if self.entity(entity.table()).is_some() {
            return Err(DbError::schema_mismatch(
                entity.table(),
                "an entity for this table is already registered",
            ));
        }
        let entity = Arc::new(entity);
        self.entities.push(Arc::clone(&entity));
        Ok(entity)
    }

    pub fn entity(&self, table: &str) -> Option<&Arc<EntityDescription>> {
        self.entities.iter().find(|e| e.table() == table)
    }

    /// Entities in registration order.
    pub fn entities(&self) -> &[Arc<EntityDescription>] {
        &self.entities
    }
}
