use std::fmt;

use crate::ids::LinkId;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Referenced entity does not exist.
    NotFound(String),
    /// A link already connects the requested port pair.
    DuplicateLink { existing: LinkId },
    /// Uniqueness, kind or ownership constraint violated.
    Constraint(String),
    /// Transaction misuse (nested begin, unknown savepoint, etc.).
    Transaction(String),
    /// Underlying SQLite failure.
    Sqlite(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::DuplicateLink { existing } => {
                write!(f, "a link already connects these ports ({existing})")
            }
            Self::Constraint(msg) => write!(f, "constraint violation: {msg}"),
            Self::Transaction(msg) => write!(f, "transaction error: {msg}"),
            Self::Sqlite(msg) => write!(f, "sqlite error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e.to_string())
    }
}
