//! The engine: one connection pool plus the bound entity metadata.

use crate::config::{ConnectionPoolConfig, DatabaseUrl};
use crate::db::connection::DriverConnector;
use crate::db::pool::{ConnectionPool, PoolSettings, PoolState, PoolStatus};
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, MetaData};
use crate::sql::ddl::create_table_sql;
use crate::sql::RawSql;
use futures_util::future::BoxFuture;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::info;

/// Entry point: owns the pool and hands out sessions.
///
/// Building an engine performs no I/O; call [`Engine::connect`] before
/// opening sessions.
pub struct Engine {
    pool: ConnectionPool<DriverConnector>,
    statement_timeout: Option<Duration>,
    metadata: RwLock<Option<Arc<MetaData>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("db_type", &self.db_type())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine for `url`.
    ///
    /// Pool options in `config` win over options given as URL query
    /// parameters.
    pub fn new(url: &str, config: ConnectionPoolConfig) -> DbResult<Self> {
        let url = DatabaseUrl::parse(url)?;
        let config = config.or(url.pool_config);
        let settings = PoolSettings::from_config(&config, url.db_type)?;
        let connector = DriverConnector::new(url.db_type, &url.connection_string)?;

        Ok(Self {
            pool: ConnectionPool::new(connector, settings),
            statement_timeout: config.statement_timeout(),
            metadata: RwLock::new(None),
        })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.connector().db_type()
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Open the pool. Connecting an open engine is a no-op.
    pub async fn connect(&self) -> DbResult<()> {
        self.pool.connect().await?;
        info!(db_type = %self.db_type(), "Engine connected");
        Ok(())
    }

    /// Close the pool. The engine can be connected again afterwards.
    pub async fn disconnect(&self) {
        self.pool.disconnect().await;
        info!(db_type = %self.db_type(), "Engine disconnected");
    }

    /// Bind `metadata` and create every table it describes that does not
    /// exist yet, in one transaction.
    pub async fn init_db(&self, metadata: &MetaData) -> DbResult<()> {
        if self.pool.status().state != PoolState::Open {
            return Err(DbError::pool_closed(
                "init_db requires a connected engine",
            ));
        }

        let db_type = self.db_type();
        let statements: Vec<RawSql> = metadata
            .entities()
            .iter()
            .map(|entity| RawSql::new(create_table_sql(entity, db_type)))
            .collect();
        let tables = statements.len();

        let mut session = self.session().await?;
        session
            .begin(move |s| {
                Box::pin(async move {
                    for statement in &statements {
                        s.execute(statement).await?;
                    }
                    Ok(())
                })
            })
            .await?;
        session.close().await;

        *self
            .metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(metadata.clone()));
        info!(tables, "Schema initialized");
        Ok(())
    }

    /// Metadata bound by the last successful [`Engine::init_db`].
    pub fn metadata(&self) -> Option<Arc<MetaData>> {
        self.metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lease a connection and open a session on it.
    pub async fn session(&self) -> DbResult<Session> {
        Session::open(&self.pool, self.statement_timeout).await
    }

    /// Run `f` with a fresh session, releasing it afterwards whatever the
    /// outcome.
    pub async fn with_session<F, R>(&self, f: F) -> DbResult<R>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, DbResult<R>>,
    {
        let mut session = self.session().await?;
        let outcome = f(&mut session).await;
        session.close().await;
        outcome
    }
}
