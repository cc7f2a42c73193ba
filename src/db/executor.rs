//! Statement execution on a single connection.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and write operations
//! - `postgres`: PostgreSQL-specific fetch and write operations
//! - `sqlite`: SQLite-specific fetch and write operations
//!
//! Statements without parameters are sent as raw SQL, which lets the driver
//! run text it cannot prepare (several statements, some DDL).

use crate::db::connection::DbConnection;
use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::impl_db_dispatch;
use crate::models::QueryResult;
use crate::sql::Compiled;
use sqlx::Executor;
use tracing::debug;

/// Run a compiled statement, fetching rows or reporting affected rows as the
/// statement requires.
pub(crate) async fn run(conn: &mut DbConnection, compiled: &Compiled) -> DbResult<QueryResult> {
    debug!(
        sql = %compiled.sql(),
        params = compiled.params().len(),
        returns_rows = compiled.returns_rows(),
        "Executing statement"
    );

    impl_db_dispatch!(conn, {
        MySql(c) => mysql::run(c, compiled).await,
        Postgres(c) => postgres::run(c, compiled).await,
        SQLite(c) => sqlite::run(c, compiled).await,
    })
}

/// Run a statement on its own, outside any parameter binding. Used for
/// transaction control.
pub(crate) async fn run_raw(conn: &mut DbConnection, sql: &str) -> DbResult<()> {
    debug!(sql = %sql, "Executing control statement");
    impl_db_dispatch!(conn, {
        MySql(c) => c.execute(sql).await.map(|_| ())?,
        Postgres(c) => c.execute(sql).await.map(|_| ())?,
        SQLite(c) => c.execute(sql).await.map(|_| ())?,
    });
    Ok(())
}

/// Process rows from any database type into a QueryResult.
///
/// A column the driver cannot decode fails the whole result.
fn rows_to_result<R: RowToJson>(rows: Vec<R>) -> DbResult<QueryResult> {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let values = rows
        .iter()
        .map(|r| r.to_json_values())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::from_rows(columns, values))
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

mod mysql {
    use super::*;
    use sqlx::MySqlConnection;

    pub async fn run(conn: &mut MySqlConnection, compiled: &Compiled) -> DbResult<QueryResult> {
        let (sql, params) = (compiled.sql(), compiled.params());

        if compiled.returns_rows() {
            let rows = if params.is_empty() {
                conn.fetch_all(sql).await?
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                query.fetch_all(&mut *conn).await?
            };
            return rows_to_result(rows);
        }

        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(&mut *conn).await?
        };
        let last_id = i64::try_from(result.last_insert_id())
            .ok()
            .filter(|id| *id > 0);
        Ok(QueryResult::from_write(result.rows_affected(), last_id))
    }
}

mod postgres {
    use super::*;
    use sqlx::PgConnection;

    pub async fn run(conn: &mut PgConnection, compiled: &Compiled) -> DbResult<QueryResult> {
        let (sql, params) = (compiled.sql(), compiled.params());

        if compiled.returns_rows() {
            let rows = if params.is_empty() {
                conn.fetch_all(sql).await?
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                query.fetch_all(&mut *conn).await?
            };
            return rows_to_result(rows);
        }

        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(&mut *conn).await?
        };
        // PostgreSQL has no session-wide last insert id; use RETURNING
        Ok(QueryResult::from_write(result.rows_affected(), None))
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;

    pub async fn run(conn: &mut SqliteConnection, compiled: &Compiled) -> DbResult<QueryResult> {
        let (sql, params) = (compiled.sql(), compiled.params());

        if compiled.returns_rows() {
            let rows = if params.is_empty() {
                conn.fetch_all(sql).await?
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                query.fetch_all(&mut *conn).await?
            };
            return rows_to_result(rows);
        }

        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(&mut *conn).await?
        };
        let last_id = Some(result.last_insert_rowid()).filter(|id| *id > 0);
        Ok(QueryResult::from_write(result.rows_affected(), last_id))
    }
}
