//! Connection pool management.
//!
//! A bounded pool of driver connections, generic over a [`Connector`].
//!
//! # Design Decisions
//!
//! - **FIFO semaphore for capacity**: `tokio::sync::Semaphore` hands out one
//!   permit per leased or connecting connection. Releasing a lease wakes
//!   exactly one waiter, in arrival order.
//! - **`std::sync::Mutex` for bookkeeping**: idle list and counters are only
//!   touched in short synchronous sections, never across an `.await`, so the
//!   lease can return its connection from `Drop`.
//! - **RAII everywhere**: a [`Lease`] returns its connection on drop and a
//!   `SizeReservation` undoes a half-finished acquisition when the acquire
//!   future is dropped, so cancellation never leaks capacity.
//! - **Weak maintenance task**: keeps `min_size` warm and closes stale idle
//!   connections; it exits on its own once the pool is dropped.
//!
//! # Invariants
//!
//! - `size` (idle + leased + connecting) never exceeds `max_size`.
//! - A connection marked broken, or returned after the pool closed or
//!   reopened, is closed instead of going back to the idle list.

use crate::config::ConnectionPoolConfig;
use crate::db::connection::Connector;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Resolved pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub min_size: u32,
    pub max_size: u32,
    pub pool_recycle: Option<Duration>,
    /// `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
    pub test_before_acquire: bool,
    pub maintenance_interval: Duration,
}

impl PoolSettings {
    /// Validate `config` and apply the defaults for `db_type`.
    pub fn from_config(config: &ConnectionPoolConfig, db_type: DatabaseType) -> DbResult<Self> {
        config.validate(db_type)?;
        Ok(Self {
            min_size: config.min_size_or_default(),
            max_size: config.max_size_or_default(db_type),
            pool_recycle: config.pool_recycle(),
            acquire_timeout: config.acquire_timeout_or_default(),
            test_before_acquire: config.test_before_acquire_or_default(),
            maintenance_interval: config.maintenance_interval_or_default(),
        })
    }
}

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    /// Built, never connected
    Created,
    Open,
    /// Disconnected; `connect()` reopens
    Closed,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub state: PoolState,
    /// Open connections, including ones being opened
    pub size: u32,
    pub idle: u32,
    pub leased: u32,
    pub min_size: u32,
    pub max_size: u32,
}

struct PooledConnection<T> {
    conn: T,
    created_at: Instant,
}

impl<T> PooledConnection<T> {
    fn new(conn: T) -> Self {
        Self {
            conn,
            created_at: Instant::now(),
        }
    }
}

struct Shared<T> {
    state: PoolState,
    /// Bumped on every connect; leases from an older generation are closed
    /// when returned.
    generation: u64,
    idle: VecDeque<PooledConnection<T>>,
    size: u32,
    leased: u32,
    maintenance: Option<JoinHandle<()>>,
}

struct PoolInner<C: Connector> {
    connector: C,
    settings: PoolSettings,
    semaphore: Arc<Semaphore>,
    shared: Mutex<Shared<C::Connection>>,
    /// Signalled whenever a lease is returned.
    released: Notify,
}

impl<C: Connector> PoolInner<C> {
    fn lock(&self) -> MutexGuard<'_, Shared<C::Connection>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, pooled: &PooledConnection<C::Connection>) -> bool {
        self.settings
            .pool_recycle
            .is_some_and(|recycle| pooled.created_at.elapsed() >= recycle)
    }

    fn ensure_open(&self) -> DbResult<u64> {
        let shared = self.lock();
        match shared.state {
            PoolState::Open => Ok(shared.generation),
            PoolState::Created => Err(DbError::pool_closed("the engine has not been connected")),
            PoolState::Closed => Err(DbError::pool_closed("the engine has been disconnected")),
        }
    }

    /// Close a connection from synchronous code.
    fn close_detached(self: &Arc<Self>, conn: C::Connection) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                handle.spawn(async move {
                    inner.connector.close(conn).await;
                });
            }
            // No runtime left to close on; the driver closes on drop
            Err(_) => drop(conn),
        }
    }

    /// Take back a leased connection. `None` means the lease lost its
    /// connection; its slot is released either way.
    fn check_in(
        self: &Arc<Self>,
        pooled: Option<PooledConnection<C::Connection>>,
        broken: bool,
        generation: u64,
    ) {
        let mut shared = self.lock();
        shared.leased = shared.leased.saturating_sub(1);

        let Some(pooled) = pooled else {
            shared.size = shared.size.saturating_sub(1);
            return;
        };

        let stale = self.is_stale(&pooled);
        let current = shared.state == PoolState::Open && shared.generation == generation;
        if !broken && !stale && current {
            shared.idle.push_back(pooled);
            return;
        }

        shared.size = shared.size.saturating_sub(1);
        drop(shared);
        if broken {
            warn!("Discarding broken connection");
        } else {
            debug!(stale, "Closing returned connection");
        }
        self.close_detached(pooled.conn);
    }

    fn lease(
        self: &Arc<Self>,
        pooled: PooledConnection<C::Connection>,
        permit: OwnedSemaphorePermit,
        generation: u64,
    ) -> Lease<C> {
        self.lock().leased += 1;
        Lease {
            pool: Arc::clone(self),
            conn: Some(pooled),
            permit: Some(permit),
            generation,
            broken: false,
        }
    }

    /// Open connections until `min_size` is reached. Only free capacity is
    /// used; waiting acquirers are never starved by a refill.
    async fn fill_to_min(self: &Arc<Self>) -> DbResult<()> {
        loop {
            let generation = {
                let shared = self.lock();
                if shared.state != PoolState::Open || shared.size >= self.settings.min_size {
                    return Ok(());
                }
                shared.generation
            };
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                return Ok(());
            };

            let reservation = SizeReservation::new_slot(self);
            let conn = self.connector.connect().await?;
            reservation.commit();

            let leftover = {
                let mut shared = self.lock();
                if shared.state == PoolState::Open && shared.generation == generation {
                    shared.idle.push_back(PooledConnection::new(conn));
                    None
                } else {
                    shared.size = shared.size.saturating_sub(1);
                    Some(conn)
                }
            };
            drop(permit);

            if let Some(conn) = leftover {
                self.connector.close(conn).await;
                return Ok(());
            }
        }
    }

    async fn maintain(self: &Arc<Self>) {
        let stale: Vec<_> = {
            let mut shared = self.lock();
            if shared.state != PoolState::Open {
                return;
            }
            let (stale, fresh): (Vec<_>, Vec<_>) =
                shared.idle.drain(..).partition(|p| self.is_stale(p));
            shared.idle = fresh.into();
            shared.size = shared.size.saturating_sub(stale.len() as u32);
            stale
        };

        if !stale.is_empty() {
            debug!(count = stale.len(), "Closing stale idle connections");
        }
        for pooled in stale {
            self.connector.close(pooled.conn).await;
        }

        if let Err(e) = self.fill_to_min().await {
            warn!(error = %e, "Failed to replenish connection pool");
        }
    }

    /// Background maintenance loop.
    ///
    /// Uses a Weak reference to the pool to avoid circular reference memory leaks.
    /// The task automatically exits when the pool is dropped or closed.
    async fn maintenance_task(weak: Weak<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

        loop {
            ticker.tick().await;

            let Some(inner) = weak.upgrade() else {
                debug!("Connection pool dropped, maintenance task exiting");
                return;
            };
            if inner.lock().state != PoolState::Open {
                return;
            }
            inner.maintain().await;

            // Drop strong reference before sleeping to allow pool deallocation
            drop(inner);
        }
    }
}

impl<C: Connector> Drop for PoolInner<C> {
    fn drop(&mut self) {
        let shared = self
            .shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = shared.maintenance.take() {
            handle.abort();
        }
    }
}

/// Counts a connection slot in `size` until committed. Dropping an
/// uncommitted reservation gives the slot back.
struct SizeReservation<'a, C: Connector> {
    inner: &'a PoolInner<C>,
    armed: bool,
}

impl<'a, C: Connector> SizeReservation<'a, C> {
    /// Reserve a slot for a connection about to be opened.
    fn new_slot(inner: &'a PoolInner<C>) -> Self {
        inner.lock().size += 1;
        Self { inner, armed: true }
    }

    /// Take over the slot of an existing idle connection.
    fn existing(inner: &'a PoolInner<C>) -> Self {
        Self { inner, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<C: Connector> Drop for SizeReservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            let mut shared = self.inner.lock();
            shared.size = shared.size.saturating_sub(1);
        }
    }
}

/// A bounded async connection pool.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("settings", &self.inner.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool in the `Created` state. No connection is opened.
    pub fn new(connector: C, settings: PoolSettings) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_size as usize));
        Self {
            inner: Arc::new(PoolInner {
                connector,
                settings,
                semaphore,
                shared: Mutex::new(Shared {
                    state: PoolState::Created,
                    generation: 0,
                    idle: VecDeque::new(),
                    size: 0,
                    leased: 0,
                    maintenance: None,
                }),
                released: Notify::new(),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    pub fn status(&self) -> PoolStatus {
        let shared = self.inner.lock();
        PoolStatus {
            state: shared.state,
            size: shared.size,
            idle: shared.idle.len() as u32,
            leased: shared.leased,
            min_size: self.inner.settings.min_size,
            max_size: self.inner.settings.max_size,
        }
    }

    /// Open the pool, warm `min_size` connections and start maintenance.
    ///
    /// Connecting an open pool is a no-op. A failure to open the initial
    /// connections closes the pool again.
    pub async fn connect(&self) -> DbResult<()> {
        {
            let mut shared = self.inner.lock();
            if shared.state == PoolState::Open {
                return Ok(());
            }
            shared.state = PoolState::Open;
            shared.generation += 1;
        }

        if let Err(e) = self.inner.fill_to_min().await {
            self.disconnect().await;
            return Err(e);
        }

        let handle = tokio::spawn(PoolInner::maintenance_task(
            Arc::downgrade(&self.inner),
            self.inner.settings.maintenance_interval,
        ));
        {
            let mut shared = self.inner.lock();
            if shared.state == PoolState::Open {
                if let Some(previous) = shared.maintenance.replace(handle) {
                    previous.abort();
                }
            } else {
                handle.abort();
            }
        }

        info!(
            min_size = self.inner.settings.min_size,
            max_size = self.inner.settings.max_size,
            "Connection pool opened"
        );
        Ok(())
    }

    /// Close the pool.
    ///
    /// New acquisitions fail with `PoolClosed` immediately. Outstanding
    /// leases are waited for (bounded by the acquire timeout); leases still
    /// out after that are closed whenever they come back.
    pub async fn disconnect(&self) {
        let maintenance = {
            let mut shared = self.inner.lock();
            if shared.state != PoolState::Open {
                return;
            }
            shared.state = PoolState::Closed;
            shared.maintenance.take()
        };
        if let Some(handle) = maintenance {
            handle.abort();
        }

        let drained = async {
            loop {
                let notified = self.inner.released.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let leased = self.inner.lock().leased;
                if leased == 0 {
                    break;
                }
                debug!(leased, "Waiting for leased connections");
                notified.await;
            }
        };
        match self.inner.settings.acquire_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, drained).await.is_err() {
                    warn!(
                        leased = self.inner.lock().leased,
                        "Timed out waiting for leased connections; they will be closed on return"
                    );
                }
            }
            None => drained.await,
        }

        let idle: Vec<_> = {
            let mut shared = self.inner.lock();
            let idle: Vec<_> = shared.idle.drain(..).collect();
            shared.size = shared.size.saturating_sub(idle.len() as u32);
            idle
        };
        for pooled in idle {
            self.inner.connector.close(pooled.conn).await;
        }
        info!("Connection pool closed");
    }

    /// Lease a connection, waiting for capacity if the pool is at `max_size`.
    ///
    /// Fails with `PoolClosed` when the pool is not open and with
    /// `PoolExhausted` once the acquire timeout elapses.
    pub async fn acquire(&self) -> DbResult<Lease<C>> {
        let inner = &self.inner;
        inner.ensure_open()?;

        let started = Instant::now();
        let waiting = Arc::clone(&inner.semaphore).acquire_owned();
        let permit = match inner.settings.acquire_timeout {
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(permit) => permit,
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!(waited_ms, "Timed out waiting for a connection");
                    return Err(DbError::pool_exhausted(waited_ms, inner.settings.max_size));
                }
            },
            None => waiting.await,
        }
        .map_err(|_| DbError::pool_closed("the pool has shut down"))?;

        loop {
            let (candidate, generation) = {
                let mut shared = inner.lock();
                if shared.state != PoolState::Open {
                    return Err(DbError::pool_closed("the engine has been disconnected"));
                }
                (shared.idle.pop_back(), shared.generation)
            };

            let Some(mut pooled) = candidate else {
                let reservation = SizeReservation::new_slot(inner);
                let conn = inner.connector.connect().await?;
                reservation.commit();
                debug!("Opened new connection");
                return Ok(inner.lease(PooledConnection::new(conn), permit, generation));
            };

            let reservation = SizeReservation::existing(inner);
            if inner.is_stale(&pooled) {
                drop(reservation);
                debug!("Recycling stale idle connection");
                inner.connector.close(pooled.conn).await;
                continue;
            }
            if inner.settings.test_before_acquire {
                if let Err(e) = inner.connector.ping(&mut pooled.conn).await {
                    drop(reservation);
                    warn!(error = %e, "Idle connection failed ping, discarding");
                    inner.connector.close(pooled.conn).await;
                    continue;
                }
            }
            reservation.commit();
            return Ok(inner.lease(pooled, permit, generation));
        }
    }

    /// Return a lease explicitly. Equivalent to dropping it.
    pub fn release(&self, lease: Lease<C>) {
        drop(lease);
    }

    /// Replace the lease's connection if it is older than `pool_recycle`.
    ///
    /// Returns whether the connection was replaced. If reconnecting fails the
    /// lease is left without a connection and its slot is freed on drop.
    pub async fn recycle_if_stale(&self, lease: &mut Lease<C>) -> DbResult<bool> {
        let stale = match &lease.conn {
            Some(pooled) => self.inner.is_stale(pooled),
            None => return Err(Lease::<C>::lost()),
        };
        if !stale {
            return Ok(false);
        }

        if let Some(old) = lease.conn.take() {
            debug!("Recycling stale leased connection");
            self.inner.connector.close(old.conn).await;
        }
        let conn = self.inner.connector.connect().await?;
        lease.conn = Some(PooledConnection::new(conn));
        lease.broken = false;
        Ok(true)
    }

    /// Run one maintenance pass now: close stale idle connections and
    /// refill to `min_size`.
    pub async fn maintain(&self) {
        self.inner.maintain().await;
    }
}

/// A connection leased from a [`ConnectionPool`].
///
/// Dropping the lease returns the connection, or closes it when it was
/// marked broken, on every exit path.
pub struct Lease<C: Connector> {
    pool: Arc<PoolInner<C>>,
    conn: Option<PooledConnection<C::Connection>>,
    permit: Option<OwnedSemaphorePermit>,
    generation: u64,
    broken: bool,
}

impl<C: Connector> std::fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("has_connection", &self.conn.is_some())
            .field("generation", &self.generation)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Lease<C> {
    fn lost() -> DbError {
        DbError::connection(
            "the leased connection was lost",
            "Open a new session; the previous connection could not be replaced",
        )
    }

    /// The underlying connection.
    pub fn get_mut(&mut self) -> DbResult<&mut C::Connection> {
        self.conn
            .as_mut()
            .map(|pooled| &mut pooled.conn)
            .ok_or_else(Self::lost)
    }

    /// Close the connection on release instead of returning it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Time since the connection was opened.
    pub fn age(&self) -> Option<Duration> {
        self.conn.as_ref().map(|pooled| pooled.created_at.elapsed())
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        self.pool
            .check_in(self.conn.take(), self.broken, self.generation);
        // the connection is idle again before a waiter can take the permit
        drop(self.permit.take());
        self.pool.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let settings =
            PoolSettings::from_config(&ConnectionPoolConfig::default(), DatabaseType::SQLite)
                .unwrap();
        assert_eq!(settings.min_size, 1);
        assert_eq!(settings.max_size, 4);
        assert_eq!(settings.acquire_timeout, Some(Duration::from_secs(30)));
        assert!(settings.test_before_acquire);

        let invalid = ConnectionPoolConfig {
            min_size: Some(3),
            max_size: Some(1),
            ..Default::default()
        };
        assert!(PoolSettings::from_config(&invalid, DatabaseType::MySQL).is_err());
    }

    #[test]
    fn test_pool_status_serializes_state() {
        let status = PoolStatus {
            state: PoolState::Open,
            size: 2,
            idle: 1,
            leased: 1,
            min_size: 1,
            max_size: 4,
        };
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value["state"], "open");
        assert_eq!(value["leased"], 1);
    }
}
