//! Statement building and rendering.
//!
//! Statements are plain values: building one performs no I/O and keeps it
//! composable (`filter`, `order_by`, `limit`, ...). A statement becomes SQL
//! only when compiled for a concrete [`DatabaseType`], which picks identifier
//! quoting and placeholder style:
//!
//! - `?` placeholders for MySQL and SQLite
//! - `$n` placeholders for PostgreSQL
//!
//! Values are always bound as parameters, never spliced into the SQL text.
//! The one exception is NULL in builder values, which renders as the `NULL`
//! keyword: a bound NULL carries a type on PostgreSQL and would be rejected
//! by non-text columns.

pub mod ddl;
pub mod expr;
pub mod raw;
pub mod select;
pub mod write;

pub use expr::{BinaryOp, Expr, OrderBy, col, val};
pub use raw::{RawSql, StatementKind, classify};
pub use select::{Count, Select};
pub use write::{Delete, Insert, Update};

use crate::error::DbResult;
use crate::models::{DatabaseType, Param};

/// SQL text plus its bound parameters, ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    sql: String,
    params: Vec<Param>,
    returns_rows: bool,
}

impl Compiled {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether the driver should fetch rows rather than report affected rows.
    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }
}

/// Anything a session can execute.
pub trait Executable {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled>;
}

impl<T: Executable + ?Sized> Executable for &T {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        (**self).compile(db)
    }
}

/// Accumulates SQL text and parameters while rendering.
pub(crate) struct SqlWriter {
    db: DatabaseType,
    sql: String,
    params: Vec<Param>,
}

impl SqlWriter {
    pub(crate) fn new(db: DatabaseType) -> Self {
        Self {
            db,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    pub(crate) fn db(&self) -> DatabaseType {
        self.db
    }

    pub(crate) fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub(crate) fn push_ident(&mut self, ident: &str) {
        let quoted = self.db.quote_ident(ident);
        self.sql.push_str(&quoted);
    }

    /// Bind a parameter and emit its placeholder.
    pub(crate) fn push_param(&mut self, param: Param) {
        self.params.push(param);
        let placeholder = self.db.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    /// Emit a builder value: `NULL` as a keyword, anything else bound.
    pub(crate) fn push_value(&mut self, param: &Param) {
        if param.is_null() {
            self.sql.push_str("NULL");
        } else {
            self.push_param(param.clone());
        }
    }

    /// Emit `items` separated by `sep`, rendering each with `f`.
    pub(crate) fn push_list<T>(
        &mut self,
        items: &[T],
        sep: &str,
        mut f: impl FnMut(&mut Self, &T) -> DbResult<()>,
    ) -> DbResult<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            f(self, item)?;
        }
        Ok(())
    }

    pub(crate) fn finish(self, returns_rows: bool) -> Compiled {
        Compiled {
            sql: self.sql,
            params: self.params,
            returns_rows,
        }
    }
}
