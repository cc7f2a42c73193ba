//! Reusable projected queries.
//!
//! A [`QueryMethod`] pairs an entity and a result shape with a `refine`
//! function that adds filters and ordering from call arguments. Calling it
//! opens a session (or reuses one), builds the projected SELECT, executes it
//! and converts the rows into the shape.
//!
//! ```ignore
//! let by_name = QueryMethod::<UserOut, &str, Single>::single(users.clone(), |q, name| {
//!     q.filter(col("username").eq(name))
//! });
//! let user: Option<UserOut> = by_name.call(&engine, "ann").await?;
//! ```

use crate::db::{Engine, Session};
use crate::error::DbResult;
use crate::models::{EntityDescription, QueryResult, Shape};
use crate::projection::select_for_shape;
use crate::sql::Select;
use std::marker::PhantomData;
use std::sync::Arc;

/// How many rows a query method returns.
pub trait Cardinality {
    type Output<T>;

    /// Last adjustment to the refined statement.
    fn prepare(select: Select) -> Select {
        select
    }

    fn collect<T: Shape>(result: QueryResult) -> DbResult<Self::Output<T>>;
}

/// Every matching row.
#[derive(Debug, Clone, Copy)]
pub struct Many;

impl Cardinality for Many {
    type Output<T> = Vec<T>;

    fn collect<T: Shape>(result: QueryResult) -> DbResult<Vec<T>> {
        result.into_shapes()
    }
}

/// At most one row. More than one is a `MultipleResults` error.
#[derive(Debug, Clone, Copy)]
pub struct Single;

impl Cardinality for Single {
    type Output<T> = Option<T>;

    /// Two rows are enough to detect a violation. A smaller caller limit
    /// would hide one, so it is raised to two.
    fn prepare(select: Select) -> Select {
        let limit = select.get_limit().map_or(2, |limit| limit.max(2));
        select.limit(limit)
    }

    fn collect<T: Shape>(result: QueryResult) -> DbResult<Option<T>> {
        result.one_or_none()?.map(T::from_mapping).transpose()
    }
}

type Refine<A> = dyn Fn(Select, A) -> Select + Send + Sync;

/// A projected query over one entity, parameterised by call arguments `A`.
pub struct QueryMethod<T, A, K = Many> {
    entity: Arc<EntityDescription>,
    refine: Box<Refine<A>>,
    _marker: PhantomData<fn() -> (T, K)>,
}

impl<T, A, K> std::fmt::Debug for QueryMethod<T, A, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMethod")
            .field("entity", &self.entity.table())
            .field("shape", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: Shape, A> QueryMethod<T, A, Many> {
    /// A query method returning every matching row.
    pub fn many(
        entity: impl Into<Arc<EntityDescription>>,
        refine: impl Fn(Select, A) -> Select + Send + Sync + 'static,
    ) -> Self {
        Self::with_refine(entity.into(), Box::new(refine))
    }
}

impl<T: Shape, A> QueryMethod<T, A, Single> {
    /// A query method returning at most one row.
    pub fn single(
        entity: impl Into<Arc<EntityDescription>>,
        refine: impl Fn(Select, A) -> Select + Send + Sync + 'static,
    ) -> Self {
        Self::with_refine(entity.into(), Box::new(refine))
    }
}

impl<T: Shape, A, K: Cardinality> QueryMethod<T, A, K> {
    fn with_refine(entity: Arc<EntityDescription>, refine: Box<Refine<A>>) -> Self {
        Self {
            entity,
            refine,
            _marker: PhantomData,
        }
    }

    pub fn entity(&self) -> &EntityDescription {
        &self.entity
    }

    /// The statement a call with `args` would run.
    pub fn statement(&self, args: A) -> DbResult<Select> {
        let base = select_for_shape::<T>(&self.entity)?;
        Ok(K::prepare((self.refine)(base, args)))
    }

    /// Run in a session of its own.
    pub async fn call(&self, engine: &Engine, args: A) -> DbResult<K::Output<T>> {
        // projection errors surface before a connection is leased
        let statement = self.statement(args)?;
        let mut session = engine.session().await?;
        let result = session.execute(&statement).await;
        session.close().await;
        K::collect::<T>(result?)
    }

    /// Run in an existing session, for example inside a transaction.
    pub async fn call_in(&self, session: &mut Session, args: A) -> DbResult<K::Output<T>> {
        let statement = self.statement(args)?;
        K::collect::<T>(session.execute(&statement).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::{ColumnDef, ColumnType, DatabaseType};
    use crate::sql::{Executable, col};
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct UserName {
        username: String,
    }

    fn users() -> EntityDescription {
        EntityDescription::new(
            "users",
            [
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("username", ColumnType::Text).not_null(),
                ColumnDef::new("email", ColumnType::Text),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_single_adds_limit_two() {
        let method = QueryMethod::<UserName, i64, Single>::single(users(), |q, id| {
            q.filter(col("id").eq(id))
        });
        let sql = method
            .statement(7)
            .unwrap()
            .compile(DatabaseType::SQLite)
            .unwrap();
        assert_eq!(
            sql.sql(),
            r#"SELECT "username" FROM "users" WHERE "id" = ? LIMIT 2"#
        );
    }

    #[test]
    fn test_single_raises_limit_below_two() {
        let method = QueryMethod::<UserName, (), Single>::single(users(), |q, ()| q.limit(1));
        assert_eq!(method.statement(()).unwrap().get_limit(), Some(2));

        let method = QueryMethod::<UserName, (), Single>::single(users(), |q, ()| q.limit(10));
        assert_eq!(method.statement(()).unwrap().get_limit(), Some(10));
    }

    #[test]
    fn test_many_leaves_limit_unset() {
        let method = QueryMethod::<UserName, (), Many>::many(users(), |q, ()| q);
        assert_eq!(method.statement(()).unwrap().get_limit(), None);
    }

    #[test]
    fn test_single_collect() {
        let none = QueryResult::from_rows(vec!["username".into()], vec![]);
        assert_eq!(Single::collect::<UserName>(none).unwrap(), None);

        let one = QueryResult::from_rows(vec!["username".into()], vec![vec![json!("ann")]]);
        assert_eq!(
            Single::collect::<UserName>(one).unwrap(),
            Some(UserName {
                username: "ann".into()
            })
        );

        let two = QueryResult::from_rows(
            vec!["username".into()],
            vec![vec![json!("ann")], vec![json!("bob")]],
        );
        assert!(matches!(
            Single::collect::<UserName>(two),
            Err(DbError::MultipleResults { count: 2 })
        ));
    }
}
