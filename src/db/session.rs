//! Sessions: one leased connection, statements in issue order, scoped
//! transactions.

use crate::db::connection::DriverConnector;
use crate::db::executor;
use crate::db::pool::{ConnectionPool, Lease};
use crate::error::{DbError, DbResult, is_connection_broken};
use crate::models::{DatabaseType, QueryResult};
use crate::sql::{Compiled, Executable};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A unit of work bound to one pooled connection.
///
/// The connection goes back to the pool when the session is dropped or
/// closed. A session dropped inside a transaction (for example when its task
/// is cancelled) has its connection closed rather than reused.
pub struct Session {
    pool: ConnectionPool<DriverConnector>,
    lease: Lease<DriverConnector>,
    db_type: DatabaseType,
    statement_timeout: Option<Duration>,
    /// Open transaction levels; 0 outside any transaction.
    depth: u32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("db_type", &self.db_type)
            .field("depth", &self.depth)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) async fn open(
        pool: &ConnectionPool<DriverConnector>,
        statement_timeout: Option<Duration>,
    ) -> DbResult<Self> {
        let lease = pool.acquire().await?;
        debug!("Session opened");
        Ok(Self {
            pool: pool.clone(),
            lease,
            db_type: pool.connector().db_type(),
            statement_timeout,
            depth: 0,
        })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Compile and run a statement.
    pub async fn execute(&mut self, stmt: impl Executable) -> DbResult<QueryResult> {
        let compiled = stmt.compile(self.db_type)?;
        self.execute_compiled(&compiled).await
    }

    /// First column of the first row.
    pub async fn scalar(&mut self, stmt: impl Executable) -> DbResult<Option<JsonValue>> {
        Ok(self.execute(stmt).await?.scalar())
    }

    pub(crate) async fn execute_compiled(&mut self, compiled: &Compiled) -> DbResult<QueryResult> {
        // a connection inside a transaction must never be swapped out
        if self.depth == 0 {
            self.pool.recycle_if_stale(&mut self.lease).await?;
        }
        let conn = self.lease.get_mut()?;
        let (outcome, broken) = guarded(self.statement_timeout, executor::run(conn, compiled)).await;
        if broken {
            self.lease.mark_broken();
        }
        outcome
    }

    async fn control(&mut self, sql: &str) -> DbResult<()> {
        let conn = self.lease.get_mut()?;
        let (outcome, broken) = guarded(self.statement_timeout, executor::run_raw(conn, sql)).await;
        if broken {
            self.lease.mark_broken();
        }
        outcome
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`.
    /// Called inside another transaction this opens a savepoint instead.
    ///
    /// The closure receives the session back and must return a boxed future:
    ///
    /// ```ignore
    /// session
    ///     .begin(|s| Box::pin(async move {
    ///         s.execute(Insert::into(&users).value("username", "ann")).await?;
    ///         Ok(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn begin<F, R>(&mut self, f: F) -> DbResult<R>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, DbResult<R>>,
    {
        let begin = self.db_type.begin_sql();
        self.scoped(begin, f).await
    }

    /// Run `f` so every read sees one snapshot. Reuses the current
    /// transaction when there is one.
    pub(crate) async fn read_consistent<F, R>(&mut self, f: F) -> DbResult<R>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, DbResult<R>>,
    {
        if self.in_transaction() {
            return f(self).await;
        }
        let begin = self.db_type.begin_snapshot_sql();
        self.scoped(begin, f).await
    }

    async fn scoped<F, R>(&mut self, begin: &str, f: F) -> DbResult<R>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, DbResult<R>>,
    {
        // raised before BEGIN and lowered after COMMIT/ROLLBACK, so a session
        // dropped during either statement is still seen as mid-transaction
        let level = self.depth;
        self.depth += 1;
        let opened = if level == 0 {
            match self.pool.recycle_if_stale(&mut self.lease).await {
                Ok(_) => self.control(begin).await,
                Err(e) => Err(e),
            }
        } else {
            let savepoint = savepoint_name(level);
            self.control(&format!("SAVEPOINT {savepoint}")).await
        };
        if let Err(e) = opened {
            self.depth = level;
            return Err(e);
        }

        let outcome = f(self).await;

        let commit = outcome.is_ok();
        let finish = match (level, commit) {
            (0, true) => "COMMIT".to_string(),
            (0, false) => "ROLLBACK".to_string(),
            (level, true) => format!("RELEASE SAVEPOINT {}", savepoint_name(level)),
            (level, false) => format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(level)),
        };
        let finished = self.control(&finish).await;
        self.depth = level;

        match (finished, outcome) {
            (Ok(()), outcome) => outcome,
            (Err(e), Ok(_)) => {
                // transaction state is unknown; never hand this connection out again
                self.lease.mark_broken();
                Err(e)
            }
            (Err(e), Err(original)) => {
                warn!(error = %e, "Rollback failed");
                self.lease.mark_broken();
                Err(original)
            }
        }
    }

    /// Release the connection back to the pool.
    pub async fn close(self) {
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.depth > 0 {
            warn!(depth = self.depth, "Session dropped inside a transaction");
            self.lease.mark_broken();
        }
        debug!("Session released");
    }
}

/// Apply the statement timeout. The flag reports whether the connection
/// must not be reused.
async fn guarded<T>(
    limit: Option<Duration>,
    call: impl Future<Output = DbResult<T>>,
) -> (DbResult<T>, bool) {
    let outcome = match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            // the statement may still be running server-side
            Err(_) => {
                return (
                    Err(DbError::timeout("statement", limit.as_millis() as u64)),
                    true,
                );
            }
        },
        None => call.await,
    };
    let broken = match &outcome {
        Err(DbError::Driver(e)) if is_connection_broken(e) => {
            warn!(error = %e, "Connection reported broken");
            true
        }
        _ => false,
    };
    (outcome, broken)
}

fn savepoint_name(depth: u32) -> String {
    format!("sp_{depth}")
}
