use netinv_graph::{EntityRef, GraphStore, LinkId, StoreError, TypedValue};

use crate::config::{ImportConfig, TransactionMode};
use crate::error::{ImportError, RowError, RowFailure};
use crate::matcher::{create_or_match, LinkMatch};
use crate::model::{
    compute_summary, EntityCounts, ImportMeta, ImportReport, RowOutcome, RowRecord,
};
use crate::resolver::Resolver;
use crate::schema::{BoundSchema, PropertyCell, RowSchema};

const ROW_SAVEPOINT: &str = "netinv_row";

/// Reconcile `rows` (header first) against the graph in `store`.
///
/// In atomic mode any failed row rolls the whole batch back and the failures
/// come back as [`ImportError::Aborted`]. In per-row mode the report lists
/// which rows landed.
pub fn run<S: GraphStore + ?Sized>(
    store: &mut S,
    config: &ImportConfig,
    rows: &[Vec<String>],
) -> Result<ImportReport, ImportError> {
    let mode = effective_mode(config.transaction.mode, store)?;
    let schema = RowSchema::load(store)?;

    let (header, data) = rows
        .split_first()
        .ok_or_else(|| ImportError::SchemaMismatch("input has no header row".into()))?;
    let bound = schema
        .bind(header, config.header.validate)
        .map_err(ImportError::SchemaMismatch)?;

    log::info!(
        "import '{}': {} row(s), mode {mode}, {} property column(s)",
        config.name,
        data.len(),
        (0..schema.properties.len()).filter(|i| bound.is_present(*i)).count()
    );

    let mut batch = Batch {
        bound: &bound,
        resolver: Resolver::new(schema.location_types.iter().map(|lt| lt.id).collect()),
        apply_defaults: config.defaults.apply_on_create,
        records: Vec::with_capacity(data.len()),
        entities: EntityCounts::default(),
    };

    match mode {
        TransactionMode::Atomic => batch.run_atomic(store, data)?,
        _ => batch.run_per_row(store, data)?,
    }

    let summary = compute_summary(&batch.records, batch.entities);
    log::info!(
        "import '{}' done: {} created, {} updated, {} unchanged, {} failed",
        config.name,
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.failed
    );

    Ok(ImportReport {
        meta: ImportMeta {
            config_name: config.name.clone(),
            transaction_mode: mode,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            batch_id: uuid::Uuid::new_v4().to_string(),
            input_sha256: None,
        },
        summary,
        rows: batch.records,
    })
}

/// Resolve `Auto` against the store's capabilities.
pub fn effective_mode<S: GraphStore + ?Sized>(
    requested: TransactionMode,
    store: &S,
) -> Result<TransactionMode, ImportError> {
    match requested {
        TransactionMode::Atomic if !store.supports_atomic_batches() => Err(
            ImportError::Unsupported("store cannot commit a batch atomically".into()),
        ),
        TransactionMode::Auto if store.supports_atomic_batches() => Ok(TransactionMode::Atomic),
        TransactionMode::Auto => Ok(TransactionMode::PerRow),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// Batch driver
// ---------------------------------------------------------------------------

struct Batch<'a> {
    bound: &'a BoundSchema<'a>,
    resolver: Resolver,
    apply_defaults: bool,
    records: Vec<RowRecord>,
    entities: EntityCounts,
}

/// A row that made it to the store.
struct Applied {
    outcome: RowOutcome,
    link: LinkId,
    links_created: usize,
    values_written: usize,
}

impl Batch<'_> {
    fn run_atomic<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        data: &[Vec<String>],
    ) -> Result<(), ImportError> {
        store.begin()?;
        if let Err(e) = self.process_in_savepoints(store, data) {
            if let Err(rb) = store.rollback() {
                log::error!("rollback after failed batch also failed: {rb}");
            }
            return Err(e.into());
        }

        let failures: Vec<RowFailure> = self
            .records
            .iter()
            .filter(|r| r.outcome == RowOutcome::Failed)
            .map(|r| RowFailure {
                row_index: r.row_index,
                code: r.error_code.clone().unwrap_or_default(),
                message: r.error.clone().unwrap_or_default(),
            })
            .collect();
        if !failures.is_empty() {
            store.rollback()?;
            self.resolver.reset();
            log::warn!("import aborted, {} row(s) failed; nothing was written", failures.len());
            return Err(ImportError::Aborted { failures });
        }
        store.commit()?;
        Ok(())
    }

    fn process_in_savepoints<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        data: &[Vec<String>],
    ) -> Result<(), StoreError> {
        for (i, row) in data.iter().enumerate() {
            let row_index = i + 1;
            store.savepoint(ROW_SAVEPOINT)?;
            self.resolver.begin_row();
            match self.apply_row(store, row_index, row) {
                Ok(applied) => {
                    store.release(ROW_SAVEPOINT)?;
                    self.keep(row_index, applied);
                }
                Err(e) => {
                    store.rollback_to(ROW_SAVEPOINT)?;
                    store.release(ROW_SAVEPOINT)?;
                    self.discard(row_index, &e);
                }
            }
        }
        Ok(())
    }

    fn run_per_row<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        data: &[Vec<String>],
    ) -> Result<(), ImportError> {
        for (i, row) in data.iter().enumerate() {
            let row_index = i + 1;
            store.begin()?;
            self.resolver.begin_row();
            match self.apply_row(store, row_index, row) {
                Ok(applied) => {
                    store.commit()?;
                    self.keep(row_index, applied);
                }
                Err(e) => {
                    store.rollback()?;
                    self.discard(row_index, &e);
                }
            }
        }
        Ok(())
    }

    fn keep(&mut self, row_index: usize, applied: Applied) {
        self.entities.add_resolved(self.resolver.commit_row());
        self.entities.links += applied.links_created;
        self.entities.property_values += applied.values_written;
        log::debug!("row {row_index}: {} {}", applied.outcome, applied.link);
        self.records
            .push(RowRecord::applied(row_index, applied.outcome, applied.link));
    }

    fn discard(&mut self, row_index: usize, err: &RowError) {
        self.resolver.rollback_row();
        log::debug!("row {row_index}: failed: {err}");
        self.records.push(RowRecord::failed(row_index, err));
    }

    // -----------------------------------------------------------------------
    // One row: parse, resolve, match, apply
    // -----------------------------------------------------------------------

    fn apply_row<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        row_index: usize,
        row: &[String],
    ) -> Result<Applied, RowError> {
        let parsed = self.bound.parse_row(row)?;

        let a = self.resolver.resolve_endpoint(store, &parsed.a)?;
        let b = self.resolver.resolve_endpoint(store, &parsed.b)?;
        if a.port == b.port {
            return Err(RowError::SameEndpoint);
        }

        let mut named = None;
        if let Some(id) = parsed.link_id {
            match store.link(id)? {
                Some(link) if link.connects(a.port, b.port) => named = Some(id),
                Some(_) => return Err(RowError::LinkIdConflict { link_id: id.raw() }),
                None => log::warn!(
                    "row {row_index}: link {} no longer exists, matching by endpoints",
                    id.raw()
                ),
            }
        }

        let matched = match named {
            Some(id) => LinkMatch::Existing(id),
            None => create_or_match(store, a.port, b.port)?,
        };

        let properties = &self.bound.schema().properties;
        let owner = EntityRef::Link(matched.id());
        let mut values_written = 0;

        match matched {
            LinkMatch::Existing(link) => {
                for (pt, cell) in properties.iter().zip(&parsed.cells) {
                    let PropertyCell::Value(value) = cell else {
                        continue;
                    };
                    let current = store.property_value(owner, pt.id)?;
                    if current.as_ref() == Some(value) || (current.is_none() && is_empty_string(value)) {
                        continue;
                    }
                    store.upsert_property_value(owner, pt.id, value.clone())?;
                    values_written += 1;
                }
                Ok(Applied {
                    outcome: if values_written > 0 {
                        RowOutcome::Updated
                    } else {
                        RowOutcome::Unchanged
                    },
                    link,
                    links_created: 0,
                    values_written,
                })
            }
            LinkMatch::Created(link) => {
                for (pt, cell) in properties.iter().zip(&parsed.cells) {
                    let value = match cell {
                        PropertyCell::Value(v) => v.clone(),
                        PropertyCell::Absent if self.apply_defaults => match &pt.default {
                            Some(default) => default.clone(),
                            None => continue,
                        },
                        _ => continue,
                    };
                    store.upsert_property_value(owner, pt.id, value)?;
                    values_written += 1;
                }
                Ok(Applied {
                    outcome: RowOutcome::Created,
                    link,
                    links_created: 1,
                    values_written,
                })
            }
        }
    }
}

/// Export writes an unset string property as `""`, so on a matched link an
/// empty string cell only overwrites a value that exists.
fn is_empty_string(value: &TypedValue) -> bool {
    matches!(value, TypedValue::String(s) if s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
