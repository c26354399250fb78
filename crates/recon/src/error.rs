use std::fmt;

use netinv_graph::StoreError;
use serde::Serialize;

use crate::schema::Side;

/// Why a single row could not be applied. Recovered into a `Failed` outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    /// Cell does not parse as its column's declared kind.
    InvalidFormat { column: String, value: String, kind: String },
    /// Enumerated cell outside the declared value set.
    InvalidEnumValue { column: String, value: String, allowed: Vec<String> },
    /// Missing or ambiguous identity segment on one endpoint.
    IncompleteIdentity { side: Side, reason: String },
    /// Row width does not match the header.
    SchemaMismatch { expected: usize, found: usize },
    /// Both endpoints resolve to the same port.
    SameEndpoint,
    /// The Link ID column names a live link with different endpoints.
    LinkIdConflict { link_id: i64 },
    Store(StoreError),
}

impl RowError {
    /// Stable machine-readable code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "invalid_format",
            Self::InvalidEnumValue { .. } => "invalid_enum_value",
            Self::IncompleteIdentity { .. } => "incomplete_identity",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::SameEndpoint => "same_endpoint",
            Self::LinkIdConflict { .. } => "link_id_conflict",
            Self::Store(_) => "store",
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { column, value, kind } => {
                write!(f, "column '{column}': cannot parse '{value}' as {kind}")
            }
            Self::InvalidEnumValue { column, value, allowed } => write!(
                f,
                "column '{column}': '{value}' is not one of [{}]",
                allowed.join(", ")
            ),
            Self::IncompleteIdentity { side, reason } => {
                write!(f, "endpoint {side}: incomplete identity: {reason}")
            }
            Self::SchemaMismatch { expected, found } => {
                write!(f, "row has {found} cells, header has {expected}")
            }
            Self::SameEndpoint => write!(f, "both endpoints resolve to the same port"),
            Self::LinkIdConflict { link_id } => write!(
                f,
                "link {link_id} does not connect the ports named in this row"
            ),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RowError {}

impl From<StoreError> for RowError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// A failed row as carried by [`ImportError::Aborted`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub code: String,
    pub message: String,
}

impl RowFailure {
    pub fn new(row_index: usize, err: &RowError) -> Self {
        Self {
            row_index,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Batch-level failure.
#[derive(Debug)]
pub enum ImportError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty name, bad delimiter, etc.).
    ConfigValidation(String),
    /// Header does not match the row schema.
    SchemaMismatch(String),
    /// All-or-nothing batch rolled back because rows failed.
    Aborted { failures: Vec<RowFailure> },
    /// Requested transaction mode is not available on this store.
    Unsupported(String),
    Store(StoreError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::SchemaMismatch(msg) => write!(f, "header does not match row schema: {msg}"),
            Self::Aborted { failures } => {
                write!(f, "import aborted, {} row(s) failed", failures.len())?;
                for failure in failures {
                    write!(f, "\n  row {}: {}", failure.row_index, failure.message)?;
                }
                Ok(())
            }
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
