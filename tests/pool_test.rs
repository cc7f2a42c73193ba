//! Integration tests for the connection pool.
//!
//! Tests verify that:
//! - Acquisition blocks at max_size and each release wakes exactly one waiter
//! - Cancelled acquisitions give their capacity back
//! - Stale, broken and dead connections are never handed out again
//! - The Created -> Open -> Closed lifecycle is enforced

use dbshape::db::{ConnectionPool, Connector, PoolSettings, PoolState};
use dbshape::error::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready};

#[derive(Default)]
struct MockConnector {
    opened: AtomicUsize,
    closed: AtomicUsize,
    pings: AtomicUsize,
    fail_ping: AtomicBool,
    connect_delay: Option<Duration>,
}

#[derive(Debug)]
struct MockConn {
    id: usize,
}

impl Connector for MockConnector {
    type Connection = MockConn;

    async fn connect(&self) -> DbResult<MockConn> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConn { id })
    }

    async fn ping(&self, _conn: &mut MockConn) -> DbResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(DbError::connection("ping failed", "reconnect"));
        }
        Ok(())
    }

    async fn close(&self, _conn: MockConn) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockConnector {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

fn settings(min_size: u32, max_size: u32) -> PoolSettings {
    PoolSettings {
        min_size,
        max_size,
        pool_recycle: None,
        acquire_timeout: None,
        test_before_acquire: false,
        maintenance_interval: Duration::from_secs(3600),
    }
}

async fn open_pool(connector: MockConnector, settings: PoolSettings) -> ConnectionPool<MockConnector> {
    let pool = ConnectionPool::new(connector, settings);
    pool.connect().await.unwrap();
    pool
}

/// Let detached close tasks run.
async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_acquire_before_connect_is_pool_closed() {
    let pool = ConnectionPool::new(MockConnector::default(), settings(1, 2));
    assert_eq!(pool.status().state, PoolState::Created);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, DbError::PoolClosed { .. }));
    assert_eq!(pool.connector().opened(), 0);
}

#[tokio::test]
async fn test_connect_warms_min_size() {
    let pool = open_pool(MockConnector::default(), settings(2, 4)).await;

    let status = pool.status();
    assert_eq!(status.state, PoolState::Open);
    assert_eq!(status.size, 2);
    assert_eq!(status.idle, 2);
    assert_eq!(status.leased, 0);
    assert_eq!(pool.connector().opened(), 2);

    // idle connections are reused before new ones are opened
    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
    assert_eq!(pool.connector().opened(), 2);
    let _c = pool.acquire().await.unwrap();
    assert_eq!(pool.connector().opened(), 3);
    assert_eq!(pool.status().leased, 3);
}

#[tokio::test]
async fn test_release_wakes_exactly_one_waiter() {
    let pool = open_pool(MockConnector::default(), settings(0, 2)).await;

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();

    let mut third = task::spawn(pool.acquire());
    let mut fourth = task::spawn(pool.acquire());
    assert_pending!(third.poll());
    assert_pending!(fourth.poll());

    drop(first);
    assert!(third.is_woken());
    assert!(!fourth.is_woken());

    let third = assert_ready!(third.poll()).unwrap();
    assert_pending!(fourth.poll());
    assert_eq!(pool.status().size, 2);
    assert_eq!(pool.status().leased, 2);

    pool.release(second);
    assert!(fourth.is_woken());
    let fourth = assert_ready!(fourth.poll()).unwrap();

    assert_eq!(pool.connector().opened(), 2);
    drop((third, fourth));
    assert_eq!(pool.status().idle, 2);
}

#[tokio::test]
async fn test_dropped_waiter_leaks_no_capacity() {
    let pool = open_pool(MockConnector::default(), settings(0, 1)).await;

    let lease = pool.acquire().await.unwrap();
    let mut waiter = task::spawn(pool.acquire());
    assert_pending!(waiter.poll());
    drop(waiter);
    drop(lease);

    let again = pool.acquire().await.unwrap();
    assert_eq!(pool.status().size, 1);
    drop(again);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_connect_releases_reserved_slot() {
    let connector = MockConnector {
        connect_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let pool = open_pool(connector, settings(0, 1)).await;

    let mut acquiring = task::spawn(pool.acquire());
    assert_pending!(acquiring.poll());
    // the slot is reserved while the connection is being opened
    assert_eq!(pool.status().size, 1);

    drop(acquiring);
    assert_eq!(pool.status().size, 0);

    let lease = pool.acquire().await.unwrap();
    assert_eq!(pool.status().size, 1);
    drop(lease);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_timeout_is_pool_exhausted() {
    let mut settings = settings(0, 1);
    settings.acquire_timeout = Some(Duration::from_secs(2));
    let pool = open_pool(MockConnector::default(), settings).await;

    let _held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    match err {
        DbError::PoolExhausted {
            waited_ms,
            max_size,
        } => {
            assert!(waited_ms >= 2000);
            assert_eq!(max_size, 1);
        }
        other => panic!("expected PoolExhausted, got {other:?}"),
    }
    assert!(DbError::pool_exhausted(0, 1).is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_stale_idle_connection_is_replaced() {
    let mut settings = settings(1, 2);
    settings.pool_recycle = Some(Duration::from_secs(60));
    let pool = open_pool(MockConnector::default(), settings).await;

    let lease = pool.acquire().await.unwrap();
    drop(lease);
    tokio::time::advance(Duration::from_secs(61)).await;

    let mut lease = pool.acquire().await.unwrap();
    assert_eq!(lease.get_mut().unwrap().id, 2);
    assert_eq!(pool.connector().closed(), 1);
    assert_eq!(pool.status().size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recycle_if_stale_swaps_leased_connection() {
    let mut settings = settings(0, 1);
    settings.pool_recycle = Some(Duration::from_secs(60));
    let pool = open_pool(MockConnector::default(), settings).await;

    let mut lease = pool.acquire().await.unwrap();
    assert!(!pool.recycle_if_stale(&mut lease).await.unwrap());

    tokio::time::advance(Duration::from_secs(90)).await;
    assert!(pool.recycle_if_stale(&mut lease).await.unwrap());
    assert_eq!(lease.get_mut().unwrap().id, 2);
    assert!(lease.age().unwrap() < Duration::from_secs(1));
    assert_eq!(pool.connector().closed(), 1);
    assert_eq!(pool.status().size, 1);
}

#[tokio::test]
async fn test_broken_lease_is_never_reused() {
    let pool = open_pool(MockConnector::default(), settings(0, 2)).await;

    let mut lease = pool.acquire().await.unwrap();
    assert_eq!(lease.get_mut().unwrap().id, 1);
    lease.mark_broken();
    drop(lease);

    assert_eq!(pool.status().idle, 0);
    assert_eq!(pool.status().size, 0);
    settle().await;
    assert_eq!(pool.connector().closed(), 1);

    let mut lease = pool.acquire().await.unwrap();
    assert_eq!(lease.get_mut().unwrap().id, 2);
}

#[tokio::test]
async fn test_failed_ping_discards_idle_connection() {
    let mut settings = settings(1, 2);
    settings.test_before_acquire = true;
    let pool = open_pool(MockConnector::default(), settings).await;
    pool.connector().fail_ping.store(true, Ordering::SeqCst);

    let mut lease = pool.acquire().await.unwrap();
    assert_eq!(lease.get_mut().unwrap().id, 2);
    assert_eq!(pool.connector().closed(), 1);
    assert_eq!(pool.connector().pings.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status().size, 1);
}

#[tokio::test]
async fn test_maintain_refills_min_size() {
    let pool = open_pool(MockConnector::default(), settings(2, 3)).await;

    let mut a = pool.acquire().await.unwrap();
    let mut b = pool.acquire().await.unwrap();
    a.mark_broken();
    b.mark_broken();
    drop((a, b));
    assert_eq!(pool.status().size, 0);

    pool.maintain().await;
    assert_eq!(pool.status().size, 2);
    assert_eq!(pool.status().idle, 2);
    assert_eq!(pool.connector().opened(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_waits_then_closes_late_leases() {
    let mut settings = settings(1, 2);
    settings.acquire_timeout = Some(Duration::from_secs(1));
    let pool = open_pool(MockConnector::default(), settings).await;

    let held = pool.acquire().await.unwrap();
    pool.disconnect().await;

    assert_eq!(pool.status().state, PoolState::Closed);
    assert!(matches!(
        pool.acquire().await,
        Err(DbError::PoolClosed { .. })
    ));

    // returned after the pool closed: closed, not pooled
    drop(held);
    settle().await;
    let status = pool.status();
    assert_eq!(status.size, 0);
    assert_eq!(status.idle, 0);
    assert_eq!(pool.connector().closed(), 1);

    pool.connect().await.unwrap();
    assert_eq!(pool.status().state, PoolState::Open);
    assert_eq!(pool.status().size, 1);
    let _lease = pool.acquire().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_closes_idle_connections() {
    let pool = open_pool(MockConnector::default(), settings(3, 3)).await;
    pool.disconnect().await;

    assert_eq!(pool.connector().closed(), 3);
    assert_eq!(pool.status().size, 0);
}
