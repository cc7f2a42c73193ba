//! Database dispatch macros for reducing code duplication.
//!
//! The macro expands to a plain `match` over [`DbConnection`] variants, so
//! each backend arm keeps its concrete sqlx connection type.
//!
//! [`DbConnection`]: crate::db::connection::DbConnection

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::run(c, compiled).await,
///     Postgres(c) => postgres::run(c, compiled).await,
///     SQLite(c) => sqlite::run(c, compiled).await,
/// })
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
