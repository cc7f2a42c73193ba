//! INSERT, UPDATE and DELETE builders bound to an entity.
//!
//! Values are addressed by field name and checked against the entity when
//! the statement is compiled. Filters use SQL column names, as with
//! [`Select`](crate::sql::Select).

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, EntityDescription, Param};
use crate::sql::expr::Expr;
use crate::sql::{Compiled, Executable, SqlWriter};
use std::collections::HashSet;

/// Resolve `(field, value)` pairs to `(column, value)` pairs.
fn resolve_assignments<'a>(
    entity: &'a EntityDescription,
    values: &'a [(String, Param)],
) -> DbResult<Vec<(&'a str, &'a Param)>> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|(field, value)| {
            let column = entity.field(field).ok_or_else(|| {
                DbError::schema_mismatch(entity.table(), format!("unknown field '{field}'"))
            })?;
            if !seen.insert(field.as_str()) {
                return Err(DbError::invalid_input(format!(
                    "field '{field}' is assigned more than once"
                )));
            }
            Ok((column.name.as_str(), value))
        })
        .collect()
}

fn write_filters(w: &mut SqlWriter, filters: &[Expr]) -> DbResult<()> {
    if filters.is_empty() {
        return Ok(());
    }
    w.push(" WHERE ");
    w.push_list(filters, " AND ", |w, f| f.write(w))
}

/// `INSERT INTO <table> (...) VALUES (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    entity: EntityDescription,
    values: Vec<(String, Param)>,
}

impl Insert {
    pub fn into(entity: &EntityDescription) -> Self {
        Self {
            entity: entity.clone(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, field: impl Into<String>, value: impl Into<Param>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }
}

impl Executable for Insert {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let assignments = resolve_assignments(&self.entity, &self.values)?;
        let mut w = SqlWriter::new(db);
        w.push("INSERT INTO ");
        w.push_ident(self.entity.table());

        if assignments.is_empty() {
            w.push(match db {
                DatabaseType::MySQL => " () VALUES ()",
                DatabaseType::PostgreSQL | DatabaseType::SQLite => " DEFAULT VALUES",
            });
            return Ok(w.finish(false));
        }

        w.push(" (");
        w.push_list(&assignments, ", ", |w, (column, _)| {
            w.push_ident(column);
            Ok(())
        })?;
        w.push(") VALUES (");
        w.push_list(&assignments, ", ", |w, (_, value)| {
            w.push_value(value);
            Ok(())
        })?;
        w.push(")");
        Ok(w.finish(false))
    }
}

/// `UPDATE <table> SET ... [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    entity: EntityDescription,
    values: Vec<(String, Param)>,
    filters: Vec<Expr>,
}

impl Update {
    pub fn table(entity: &EntityDescription) -> Self {
        Self {
            entity: entity.clone(),
            values: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Param>) -> Self {
        self.values.push((field.into(), value.into()));
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }
}

impl Executable for Update {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let assignments = resolve_assignments(&self.entity, &self.values)?;
        if assignments.is_empty() {
            return Err(DbError::invalid_input(format!(
                "UPDATE of '{}' sets no fields",
                self.entity.table()
            )));
        }

        let mut w = SqlWriter::new(db);
        w.push("UPDATE ");
        w.push_ident(self.entity.table());
        w.push(" SET ");
        w.push_list(&assignments, ", ", |w, (column, value)| {
            w.push_ident(column);
            w.push(" = ");
            w.push_value(value);
            Ok(())
        })?;
        write_filters(&mut w, &self.filters)?;
        Ok(w.finish(false))
    }
}

/// `DELETE FROM <table> [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    filters: Vec<Expr>,
}

impl Delete {
    pub fn from(entity: &EntityDescription) -> Self {
        Self {
            table: entity.table().to_string(),
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }
}

impl Executable for Delete {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let mut w = SqlWriter::new(db);
        w.push("DELETE FROM ");
        w.push_ident(&self.table);
        write_filters(&mut w, &self.filters)?;
        Ok(w.finish(false))
    }
}
