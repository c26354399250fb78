//! `netinv-recon`: Import reconciliation for inventory link rows.
//!
//! Pure engine crate: receives decoded string rows, reconciles them against
//! a [`netinv_graph::GraphStore`] and returns a per-row report. No CSV or
//! CLI dependencies.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod matcher;
pub mod model;
pub mod resolver;
pub mod schema;

pub use config::{ImportConfig, TransactionMode};
pub use engine::run;
pub use error::{ImportError, RowError, RowFailure};
pub use export::export_links;
pub use model::{ImportReport, ImportSummary, RowOutcome, RowRecord};
pub use schema::{PropertyCell, RowSchema, Side};
