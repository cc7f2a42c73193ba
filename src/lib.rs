//! dbshape library
//!
//! Schema-driven projected queries, pooled async sessions and pagination for
//! SQL databases (SQLite, PostgreSQL, MySQL).
//!
//! - [`projection`] narrows an entity to the columns a result shape needs
//! - [`db`] owns the connection pool, sessions and statement execution
//! - [`pagination`] reads a page and its total count from one snapshot
//! - [`query_method`] packages a projected query as a reusable call

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod projection;
pub mod query_method;
pub mod sql;

pub use config::{Config, ConnectionPoolConfig};
pub use db::{Engine, Session};
pub use error::{DbError, DbResult};
pub use models::{
    ColumnDef, ColumnType, DatabaseType, EntityDescription, MetaData, PageResult, Param,
    QueryResult, Shape, ShapeDescription,
};
pub use pagination::fetch_page;
pub use projection::{resolve_columns, select_for, select_for_shape};
pub use query_method::{Many, QueryMethod, Single};
