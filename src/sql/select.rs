//! Projected SELECT statements and their derived COUNT statements.

use crate::error::DbResult;
use crate::models::{ColumnDef, DatabaseType};
use crate::sql::expr::{Expr, OrderBy};
use crate::sql::{Compiled, Executable, SqlWriter};

/// Alias given to the derived table when counting a limited or distinct
/// statement.
const COUNT_SOURCE_ALIAS: &str = "page_source";

/// One projected column, aliased when the field name differs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectColumn {
    name: String,
    alias: Option<String>,
}

/// A SELECT over an explicit column list.
///
/// Built by the projection layer; never selects `*`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    columns: Vec<SelectColumn>,
    filters: Vec<Expr>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl Select {
    pub(crate) fn new<'a>(table: &str, columns: impl IntoIterator<Item = &'a ColumnDef>) -> Self {
        let columns = columns
            .into_iter()
            .map(|c| SelectColumn {
                name: c.name.clone(),
                alias: c.is_aliased().then(|| c.field.clone()),
            })
            .collect();
        Self {
            table: table.to_string(),
            columns,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Keys of the resulting row mappings, in projection order.
    pub fn output_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.alias.as_deref().unwrap_or(&c.name))
            .collect()
    }

    /// Add a WHERE condition. Several filters are joined with AND.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by.push(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Same statement restricted to one window of rows. Any existing
    /// limit or offset is replaced.
    pub fn window(&self, offset: u64, limit: u64) -> Self {
        let mut window = self.clone();
        window.offset = Some(offset);
        window.limit = Some(limit);
        window
    }

    /// Statement counting the rows this one would return.
    pub fn count(&self) -> Count {
        Count {
            source: self.clone(),
        }
    }

    fn write_filters(&self, w: &mut SqlWriter) -> DbResult<()> {
        if self.filters.is_empty() {
            return Ok(());
        }
        w.push(" WHERE ");
        w.push_list(&self.filters, " AND ", |w, f| f.write(w))
    }

    fn write_to(&self, w: &mut SqlWriter) -> DbResult<()> {
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        w.push_list(&self.columns, ", ", |w, c| {
            w.push_ident(&c.name);
            if let Some(alias) = &c.alias {
                w.push(" AS ");
                w.push_ident(alias);
            }
            Ok(())
        })?;
        w.push(" FROM ");
        w.push_ident(&self.table);
        self.write_filters(w)?;

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            w.push_list(&self.order_by, ", ", |w, o| o.write(w))?;
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                w.push(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    w.push(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => {
                // MySQL and SQLite only accept OFFSET after a LIMIT
                match w.db() {
                    DatabaseType::PostgreSQL => {}
                    DatabaseType::SQLite => w.push(" LIMIT -1"),
                    DatabaseType::MySQL => w.push(&format!(" LIMIT {}", u64::MAX)),
                }
                w.push(&format!(" OFFSET {offset}"));
            }
            (None, None) => {}
        }
        Ok(())
    }
}

impl Executable for Select {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let mut w = SqlWriter::new(db);
        self.write_to(&mut w)?;
        Ok(w.finish(true))
    }
}

/// `SELECT COUNT(*)` derived from a [`Select`].
///
/// Projection and ordering do not change the count, so a plain statement is
/// counted directly against its table. Once a limit, offset or DISTINCT is
/// involved the original statement is wrapped as a derived table instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    source: Select,
}

impl Count {
    fn is_simple(&self) -> bool {
        self.source.limit.is_none() && self.source.offset.is_none() && !self.source.distinct
    }
}

impl Executable for Count {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let mut w = SqlWriter::new(db);
        w.push("SELECT COUNT(*) FROM ");
        if self.is_simple() {
            w.push_ident(&self.source.table);
            self.source.write_filters(&mut w)?;
        } else {
            w.push("(");
            self.source.write_to(&mut w)?;
            w.push(") AS ");
            w.push_ident(COUNT_SOURCE_ALIAS);
        }
        Ok(w.finish(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use crate::sql::col;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", ColumnType::Integer).primary_key(),
            ColumnDef::new("user_name", ColumnType::Text).field("username"),
        ]
    }

    fn select() -> Select {
        Select::new("users", &columns())
    }

    #[test]
    fn test_select_aliases_renamed_fields() {
        let compiled = select().compile(DatabaseType::SQLite).unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT \"id\", \"user_name\" AS \"username\" FROM \"users\""
        );
        assert!(compiled.returns_rows());
        assert_eq!(select().output_names(), ["id", "username"]);
    }

    #[test]
    fn test_select_composes() {
        let stmt = select()
            .filter(col("id").gt(5))
            .filter(col("user_name").like("a%"))
            .order_by(col("id").desc())
            .limit(10)
            .offset(20);
        let compiled = stmt.compile(DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT \"id\", \"user_name\" AS \"username\" FROM \"users\" \
             WHERE \"id\" > $1 AND \"user_name\" LIKE $2 ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(compiled.params().len(), 2);
    }

    #[test]
    fn test_offset_without_limit() {
        let stmt = select().offset(5);
        let sqlite = stmt.compile(DatabaseType::SQLite).unwrap();
        assert!(sqlite.sql().ends_with(" LIMIT -1 OFFSET 5"));
        let pg = stmt.compile(DatabaseType::PostgreSQL).unwrap();
        assert!(pg.sql().ends_with("\"users\" OFFSET 5"));
        let mysql = stmt.compile(DatabaseType::MySQL).unwrap();
        assert!(mysql.sql().contains(" LIMIT 18446744073709551615 OFFSET 5"));
    }

    #[test]
    fn test_window_replaces_limit_and_offset() {
        let stmt = select().limit(3).offset(1).window(20, 10);
        assert_eq!(stmt.get_limit(), Some(10));
        assert_eq!(stmt.get_offset(), Some(20));
    }

    #[test]
    fn test_count_plain_statement() {
        let stmt = select().filter(col("id").gt(1)).order_by(col("id"));
        let compiled = stmt.count().compile(DatabaseType::SQLite).unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT COUNT(*) FROM \"users\" WHERE \"id\" > ?"
        );
        assert_eq!(compiled.params().len(), 1);
    }

    #[test]
    fn test_count_wraps_distinct_or_limited() {
        let compiled = select()
            .distinct()
            .count()
            .compile(DatabaseType::MySQL)
            .unwrap();
        assert_eq!(
            compiled.sql(),
            "SELECT COUNT(*) FROM (SELECT DISTINCT `id`, `user_name` AS `username` FROM `users`) AS `page_source`"
        );

        let compiled = select()
            .limit(5)
            .count()
            .compile(DatabaseType::SQLite)
            .unwrap();
        assert!(compiled.sql().starts_with("SELECT COUNT(*) FROM (SELECT"));
        assert!(compiled.sql().contains("LIMIT 5)"));
    }
}
