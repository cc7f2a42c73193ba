//! Data models for dbshape.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod entity;
pub mod page;
pub mod query;
pub mod shape;

// Re-export commonly used types
pub use connection::{DatabaseType, mask_connection_string};
pub use entity::{ColumnDef, ColumnType, EntityDescription, MetaData};
pub use page::{PageRequest, PageResult};
pub use query::{Mapping, Mappings, Param, QueryResult, Scalars};
pub use shape::{Shape, ShapeDescription};
