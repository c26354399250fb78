use serde::Serialize;

use netinv_graph::LinkId;

use crate::config::TransactionMode;
use crate::error::{RowError, RowFailure};
use crate::resolver::CreatedEntities;

// ---------------------------------------------------------------------------
// Per-row outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// No link connected the endpoints; one was created.
    Created,
    /// Matched an existing link and changed at least one value.
    Updated,
    /// Matched an existing link whose values already agreed with the row.
    Unchanged,
    Failed,
}

impl std::fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRecord {
    /// Position in the input; the header is row 0.
    pub row_index: usize,
    pub outcome: RowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<LinkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowRecord {
    pub fn applied(row_index: usize, outcome: RowOutcome, link_id: LinkId) -> Self {
        Self {
            row_index,
            outcome,
            link_id: Some(link_id),
            error_code: None,
            error: None,
        }
    }

    pub fn failed(row_index: usize, err: &RowError) -> Self {
        Self {
            row_index,
            outcome: RowOutcome::Failed,
            link_id: None,
            error_code: Some(err.code().to_string()),
            error: Some(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

/// Entities written by committed rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub locations: usize,
    pub equipment: usize,
    pub ports: usize,
    pub links: usize,
    pub property_values: usize,
}

impl EntityCounts {
    pub fn add_resolved(&mut self, created: CreatedEntities) {
        self.locations += created.locations;
        self.equipment += created.equipment;
        self.ports += created.ports;
    }

    pub fn add(&mut self, other: EntityCounts) {
        self.locations += other.locations;
        self.equipment += other.equipment;
        self.ports += other.ports;
        self.links += other.links;
        self.property_values += other.property_values;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// New entities; property values count every write, not only new ones.
    pub entities: EntityCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportMeta {
    pub config_name: String,
    /// Mode the batch actually ran in (`auto` resolved).
    pub transaction_mode: TransactionMode,
    pub engine_version: String,
    pub run_at: String,
    pub batch_id: String,
    /// SHA-256 of the input file, filled in by callers that read one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub meta: ImportMeta,
    pub summary: ImportSummary,
    pub rows: Vec<RowRecord>,
}

impl ImportReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn failures(&self) -> Vec<RowFailure> {
        self.rows
            .iter()
            .filter(|r| r.outcome == RowOutcome::Failed)
            .map(|r| RowFailure {
                row_index: r.row_index,
                code: r.error_code.clone().unwrap_or_default(),
                message: r.error.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// Count outcomes over a finished row list.
pub fn compute_summary(rows: &[RowRecord], entities: EntityCounts) -> ImportSummary {
    let mut summary = ImportSummary {
        total_rows: rows.len(),
        entities,
        ..Default::default()
    };
    for row in rows {
        match row.outcome {
            RowOutcome::Created => summary.created += 1,
            RowOutcome::Updated => summary.updated += 1,
            RowOutcome::Unchanged => summary.unchanged += 1,
            RowOutcome::Failed => summary.failed += 1,
        }
    }
    summary
}
