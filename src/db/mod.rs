//! Database access layer.
//!
//! This module provides database access functionality:
//! - Driver connections behind the [`Connector`] trait
//! - Connection pool management
//! - Sessions and scoped transactions
//! - Statement execution and type mappings
//! - Database dispatch macros for reducing code duplication

pub mod connection;
pub mod engine;
pub(crate) mod executor;
#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod pool;
pub mod session;
pub mod types;

pub use connection::{Connector, DbConnection, DriverConnector};
pub use engine::Engine;
pub use pool::{ConnectionPool, Lease, PoolSettings, PoolState, PoolStatus};
pub use session::Session;
