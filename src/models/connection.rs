//! Connection-related data models.
//!
//! This module defines the supported database backends and the dialect
//! details the statement renderer needs from each of them.

use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    ///
    /// A `+driver` suffix on the scheme (`sqlite+aiosqlite://`,
    /// `postgresql+asyncpg://`) is ignored.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        let scheme = lower.split(':').next().unwrap_or_default();
        let base = scheme.split('+').next().unwrap_or_default();
        match base {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::MySQL => format!("`{}`", ident.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Render the placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${index}"),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Statement that opens an outermost transaction.
    pub(crate) fn begin_sql(&self) -> &'static str {
        match self {
            Self::MySQL => "START TRANSACTION",
            Self::PostgreSQL | Self::SQLite => "BEGIN",
        }
    }

    /// Statement that opens a transaction whose reads all see one snapshot.
    pub(crate) fn begin_snapshot_sql(&self) -> &'static str {
        match self {
            Self::MySQL => "START TRANSACTION WITH CONSISTENT SNAPSHOT",
            Self::PostgreSQL => "BEGIN ISOLATION LEVEL REPEATABLE READ",
            Self::SQLite => "BEGIN",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Strip the `+driver` part of a scheme so the driver sees a plain URL.
pub(crate) fn strip_driver_suffix(connection_string: &str) -> String {
    match connection_string.split_once(':') {
        Some((scheme, rest)) if scheme.contains('+') => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}:{rest}")
        }
        _ => connection_string.to_string(),
    }
}

/// Get a display-safe version of a connection string (credentials masked).
pub fn mask_connection_string(connection_string: &str) -> String {
    if let Some(at_pos) = connection_string.find('@') {
        let scheme_end = connection_string.find("://").map(|p| p + 3).unwrap_or(0);
        if let Some(colon_pos) = connection_string[scheme_end..at_pos].rfind(':') {
            let colon_pos = scheme_end + colon_pos;
            let prefix = &connection_string[..colon_pos + 1];
            let suffix = &connection_string[at_pos..];
            return format!("{}****{}", prefix, suffix);
        }
    }
    connection_string.to_string()
}
