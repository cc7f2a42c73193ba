//! Integration tests for sessions and scoped transactions on SQLite.
//!
//! Tests verify that:
//! - A failing statement still returns its connection to the pool
//! - Transactions commit on Ok and roll back on Err
//! - Nested transactions use savepoints
//! - A session cancelled mid-transaction never hands its connection out again

use dbshape::config::ConnectionPoolConfig;
use dbshape::db::Engine;
use dbshape::error::DbError;
use dbshape::models::{ColumnDef, ColumnType, EntityDescription, MetaData, ShapeDescription};
use dbshape::projection::select_for;
use dbshape::sql::{Delete, Insert, RawSql, Select, Update, col};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio_test::{assert_pending, task};

/// Engine over a fresh SQLite file with a `users` table.
async fn setup_engine(max_size: u32) -> (Engine, Arc<EntityDescription>, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("session.db").display());
    let config = ConnectionPoolConfig {
        max_size: Some(max_size),
        ..Default::default()
    };
    let engine = Engine::new(&url, config).unwrap();
    engine.connect().await.unwrap();

    let mut metadata = MetaData::new();
    let users = metadata
        .register(
            EntityDescription::new(
                "users",
                [
                    ColumnDef::new("id", ColumnType::Integer)
                        .primary_key()
                        .autoincrement(),
                    ColumnDef::new("username", ColumnType::Text).not_null(),
                    ColumnDef::new("email", ColumnType::Text),
                ],
            )
            .unwrap(),
        )
        .unwrap();
    engine.init_db(&metadata).await.unwrap();

    (engine, users, dir)
}

fn all_usernames(users: &EntityDescription) -> Select {
    select_for(users, &ShapeDescription::new("names", ["username"]))
        .unwrap()
        .order_by(col("id"))
}

async fn usernames(engine: &Engine, users: &EntityDescription) -> Vec<String> {
    let mut session = engine.session().await.unwrap();
    let result = session.execute(all_usernames(users)).await.unwrap();
    result
        .scalars()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_init_db_binds_metadata() {
    let (engine, _users, _dir) = setup_engine(2).await;

    let metadata = engine.metadata().unwrap();
    assert_eq!(metadata.entities().len(), 1);
    assert!(metadata.entity("users").is_some());

    let mut session = engine.session().await.unwrap();
    let count = session
        .scalar(RawSql::new("SELECT COUNT(*) FROM users"))
        .await
        .unwrap();
    assert_eq!(count, Some(json!(0)));
}

#[tokio::test]
async fn test_write_statements() {
    let (engine, users, _dir) = setup_engine(2).await;
    let mut session = engine.session().await.unwrap();

    let inserted = session
        .execute(
            Insert::into(&users)
                .value("username", "ann")
                .value("email", "ann@example.com"),
        )
        .await
        .unwrap();
    assert_eq!(inserted.rows_affected(), 1);
    assert_eq!(inserted.last_insert_id(), Some(1));

    session
        .execute(Insert::into(&users).value("username", "bob"))
        .await
        .unwrap();

    let updated = session
        .execute(
            Update::table(&users)
                .set("email", "bob@example.com")
                .filter(col("username").eq("bob")),
        )
        .await
        .unwrap();
    assert_eq!(updated.rows_affected(), 1);

    let email = session
        .scalar(RawSql::with_params(
            "SELECT email FROM users WHERE username = ?",
            ["bob"],
        ))
        .await
        .unwrap();
    assert_eq!(email, Some(json!("bob@example.com")));

    let deleted = session
        .execute(Delete::from(&users).filter(col("email").is_null()))
        .await
        .unwrap();
    assert_eq!(deleted.rows_affected(), 0);
}

#[tokio::test]
async fn test_failing_session_returns_its_connection() {
    let (engine, users, _dir) = setup_engine(1).await;

    {
        let mut session = engine.session().await.unwrap();
        let err = session
            .execute(RawSql::new("SELECT * FROM no_such_table"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Driver(_)));
    }

    let status = engine.status();
    assert_eq!(status.leased, 0);
    assert_eq!(status.idle, 1);

    // the single connection is usable again
    assert!(usernames(&engine, &users).await.is_empty());
}

#[tokio::test]
async fn test_transaction_commits_on_ok() {
    let (engine, users, _dir) = setup_engine(2).await;
    let mut session = engine.session().await.unwrap();

    let entity = Arc::clone(&users);
    let id = session
        .begin(move |s| {
            Box::pin(async move {
                let result = s
                    .execute(Insert::into(&entity).value("username", "ann"))
                    .await?;
                Ok(result.last_insert_id())
            })
        })
        .await
        .unwrap();
    assert_eq!(id, Some(1));
    assert!(!session.in_transaction());
    session.close().await;

    assert_eq!(usernames(&engine, &users).await, ["ann"]);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_err() {
    let (engine, users, _dir) = setup_engine(2).await;
    let mut session = engine.session().await.unwrap();

    let entity = Arc::clone(&users);
    let err = session
        .begin(move |s| {
            Box::pin(async move {
                s.execute(Insert::into(&entity).value("username", "ann"))
                    .await?;
                Err::<(), _>(DbError::invalid_input("abort"))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
    session.close().await;

    assert!(usernames(&engine, &users).await.is_empty());
}

#[tokio::test]
async fn test_nested_transaction_uses_savepoint() {
    let (engine, users, _dir) = setup_engine(2).await;
    let mut session = engine.session().await.unwrap();

    let entity = Arc::clone(&users);
    session
        .begin(move |s| {
            Box::pin(async move {
                s.execute(Insert::into(&entity).value("username", "ann"))
                    .await?;

                let inner = Arc::clone(&entity);
                let nested = s
                    .begin(move |s| {
                        Box::pin(async move {
                            s.execute(Insert::into(&inner).value("username", "bob"))
                                .await?;
                            Err::<(), _>(DbError::invalid_input("undo bob"))
                        })
                    })
                    .await;
                assert!(nested.is_err());
                assert!(s.in_transaction());

                let kept = Arc::clone(&entity);
                s.begin(move |s| {
                    Box::pin(async move {
                        s.execute(Insert::into(&kept).value("username", "cat"))
                            .await?;
                        Ok(())
                    })
                })
                .await
            })
        })
        .await
        .unwrap();
    session.close().await;

    assert_eq!(usernames(&engine, &users).await, ["ann", "cat"]);
}

#[tokio::test]
async fn test_cancelled_transaction_discards_connection() {
    let (engine, users, _dir) = setup_engine(1).await;
    let mut session = engine.session().await.unwrap();

    let entity = Arc::clone(&users);
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        session.begin(move |s| {
            Box::pin(async move {
                s.execute(Insert::into(&entity).value("username", "ghost"))
                    .await?;
                std::future::pending::<()>().await;
                Ok(())
            })
        }),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(session.in_transaction());

    drop(session);
    let status = engine.status();
    assert_eq!(status.leased, 0);
    assert_eq!(status.idle, 0);

    // the uncommitted insert went away with the connection
    assert!(usernames(&engine, &users).await.is_empty());
}

#[tokio::test]
async fn test_cancelled_commit_discards_connection() {
    let (engine, users, _dir) = setup_engine(2).await;
    let mut writer = engine.session().await.unwrap();
    let mut reader = engine.session().await.unwrap();

    // an open read transaction holds a shared lock, so the writer's COMMIT
    // waits on it instead of finishing
    let (locked_tx, locked_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let entity = Arc::clone(&users);
    let reading = tokio::spawn(async move {
        let outcome = reader
            .begin(move |s| {
                Box::pin(async move {
                    s.execute(all_usernames(&entity)).await?;
                    let _ = locked_tx.send(());
                    let _ = release_rx.await;
                    Ok(())
                })
            })
            .await;
        reader.close().await;
        outcome
    });
    locked_rx.await.unwrap();

    let body_done = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&body_done);
    let entity = Arc::clone(&users);
    let mut committing = task::spawn(writer.begin(move |s| {
        Box::pin(async move {
            s.execute(Insert::into(&entity).value("username", "ann"))
                .await?;
            done.store(true, Ordering::SeqCst);
            Ok(())
        })
    }));
    loop {
        assert_pending!(committing.poll());
        if body_done.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // cancelled while COMMIT is in flight
    drop(committing);
    assert!(writer.in_transaction());
    drop(writer);

    release_tx.send(()).unwrap();
    reading.await.unwrap().unwrap();

    let status = engine.status();
    assert_eq!(status.leased, 0);
    assert_eq!(status.idle, 1);
    assert_eq!(status.size, 1);
}

#[tokio::test]
async fn test_with_session_releases_on_err() {
    let (engine, users, _dir) = setup_engine(1).await;

    let entity = Arc::clone(&users);
    let err = engine
        .with_session(move |s| {
            Box::pin(async move {
                s.execute(Insert::into(&entity).value("username", "ann"))
                    .await?;
                s.execute(RawSql::new("SELECT * FROM no_such_table")).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Driver(_)));
    assert_eq!(engine.status().leased, 0);

    // outside a transaction the first insert stays
    let names = engine
        .with_session(|s| {
            Box::pin(async move {
                let result = s.execute(RawSql::new("SELECT username FROM users")).await?;
                Ok(result.scalars().collect::<Vec<_>>())
            })
        })
        .await
        .unwrap();
    assert_eq!(names, [json!("ann")]);
    assert_eq!(engine.status().idle, 1);
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    let (engine, users, _dir) = setup_engine(2).await;

    engine.disconnect().await;
    assert!(matches!(
        engine.session().await,
        Err(DbError::PoolClosed { .. })
    ));

    engine.connect().await.unwrap();
    assert!(usernames(&engine, &users).await.is_empty());
}
