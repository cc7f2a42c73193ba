//! Integration tests for projected queries and query methods on SQLite.
//!
//! Uses the users(id, username, email, bio) table: a shape naming only
//! `username` and `email` must select exactly those columns.

use dbshape::config::ConnectionPoolConfig;
use dbshape::db::Engine;
use dbshape::error::DbError;
use dbshape::models::{ColumnDef, ColumnType, EntityDescription, MetaData};
use dbshape::projection::select_for_shape;
use dbshape::query_method::{Many, QueryMethod, Single};
use dbshape::sql::{Executable, Insert, col};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct UserContact {
    username: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UserNickname {
    #[allow(dead_code)]
    nickname: String,
}

async fn setup_engine() -> (Engine, Arc<EntityDescription>, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("users.db").display());
    let engine = Engine::new(&url, ConnectionPoolConfig::default()).unwrap();
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
                    ColumnDef::new("username", ColumnType::String(64)).not_null(),
                    ColumnDef::new("email", ColumnType::Text),
                    ColumnDef::new("bio", ColumnType::Text),
                ],
            )
            .unwrap(),
        )
        .unwrap();
    engine.init_db(&metadata).await.unwrap();

    let mut session = engine.session().await.unwrap();
    for (username, email, bio) in [
        ("ann", Some("ann@example.com"), "likes tea"),
        ("bob", None, "likes coffee"),
        ("cat", Some("cat@example.com"), "likes tea"),
    ] {
        session
            .execute(
                Insert::into(&users)
                    .value("username", username)
                    .value("email", email)
                    .value("bio", bio),
            )
            .await
            .unwrap();
    }
    session.close().await;

    (engine, users, dir)
}

#[tokio::test]
async fn test_projection_selects_only_shape_columns() {
    let (engine, users, _dir) = setup_engine().await;

    let select = select_for_shape::<UserContact>(&users)
        .unwrap()
        .order_by(col("id"));
    let compiled = select.compile(engine.db_type()).unwrap();
    assert_eq!(
        compiled.sql(),
        r#"SELECT "username", "email" FROM "users" ORDER BY "id" ASC"#
    );

    let mut session = engine.session().await.unwrap();
    let result = session.execute(&select).await.unwrap();
    assert_eq!(result.columns(), ["username", "email"]);

    let mappings: Vec<_> = result.mappings().collect();
    assert_eq!(mappings.len(), 3);
    assert_eq!(mappings[0].get("username"), Some(&json!("ann")));
    assert_eq!(mappings[1].get("email"), Some(&json!(null)));
    assert!(mappings.iter().all(|m| !m.contains_key("bio")));
}

#[tokio::test]
async fn test_unknown_shape_field_is_schema_mismatch() {
    let (_engine, users, _dir) = setup_engine().await;
    let err = select_for_shape::<UserNickname>(&users).unwrap_err();
    assert!(matches!(err, DbError::SchemaMismatch { .. }));
    assert!(err.to_string().contains("nickname"));
}

#[tokio::test]
async fn test_many_returns_every_match() {
    let (engine, users, _dir) = setup_engine().await;

    let by_bio = QueryMethod::<UserContact, &str, Many>::many(Arc::clone(&users), |q, bio| {
        q.filter(col("bio").eq(bio)).order_by(col("username"))
    });
    let tea = by_bio.call(&engine, "likes tea").await.unwrap();
    assert_eq!(
        tea,
        [
            UserContact {
                username: "ann".into(),
                email: Some("ann@example.com".into())
            },
            UserContact {
                username: "cat".into(),
                email: Some("cat@example.com".into())
            },
        ]
    );
    assert!(by_bio.call(&engine, "likes juice").await.unwrap().is_empty());
    assert_eq!(engine.status().leased, 0);
}

#[tokio::test]
async fn test_single_zero_one_and_many_rows() {
    let (engine, users, _dir) = setup_engine().await;

    let by_bio = QueryMethod::<UserContact, &str, Single>::single(Arc::clone(&users), |q, bio| {
        q.filter(col("bio").eq(bio))
    });

    let none = by_bio.call(&engine, "likes juice").await.unwrap();
    assert_eq!(none, None);

    let one = by_bio.call(&engine, "likes coffee").await.unwrap();
    assert_eq!(
        one,
        Some(UserContact {
            username: "bob".into(),
            email: None
        })
    );

    let err = by_bio.call(&engine, "likes tea").await.unwrap_err();
    assert!(matches!(err, DbError::MultipleResults { count: 2 }));
    assert_eq!(engine.status().leased, 0);
}

#[tokio::test]
async fn test_single_with_limit_one_still_detects_duplicates() {
    let (engine, users, _dir) = setup_engine().await;

    let first_by_bio = QueryMethod::<UserContact, &str, Single>::single(Arc::clone(&users), |q, bio| {
        q.filter(col("bio").eq(bio)).limit(1)
    });

    let err = first_by_bio.call(&engine, "likes tea").await.unwrap_err();
    assert!(matches!(err, DbError::MultipleResults { count: 2 }));
    assert!(first_by_bio.call(&engine, "likes coffee").await.unwrap().is_some());
}

#[tokio::test]
async fn test_call_in_reuses_session() {
    let (engine, users, _dir) = setup_engine().await;

    let by_name = QueryMethod::<UserContact, String, Single>::single(Arc::clone(&users), |q, name| {
        q.filter(col("username").eq(name))
    });

    let mut session = engine.session().await.unwrap();
    let entity = Arc::clone(&users);
    let found = session
        .begin(move |s| {
            Box::pin(async move {
                s.execute(Insert::into(&entity).value("username", "dan"))
                    .await?;
                by_name.call_in(s, "dan".to_string()).await
            })
        })
        .await
        .unwrap();
    assert_eq!(found.map(|u| u.username), Some("dan".to_string()));
    assert_eq!(engine.status().leased, 1);
}
