//! Dirty checking and flush ordering.
//!
//! The session keeps a snapshot of every row it knows to exist in the
//! database. At flush time the current row images of all resident aggregates
//! are compared against those snapshots:
//!
//! - no snapshot: INSERT
//! - snapshot differs: UPDATE of the changed columns
//! - snapshot with no current image (orphaned or deleted): DELETE
//!
//! Inserts run parents first and deletes children first, following the
//! foreign keys between tables. Inserts and single-key deletes of one table
//! are batched into multi-row statements of `batch_size` rows (0 means one
//! statement per row).

use ormlessons_core::{Connection, FieldInfo, Result, RowImage, Value};
use ormlessons_schema::quote_ident;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Bound on parameters in one statement (SQLite's compiled-in limit).
const MAX_PARAMS: usize = 32_766;

type RowKey = (&'static str, String);

fn row_key(image: &RowImage) -> Result<RowKey> {
    Ok((image.table, serde_json::to_string(&image.pk)?))
}

#[derive(Debug, Clone)]
struct Snapshot {
    json: String,
    image: RowImage,
}

/// A pending database operation.
#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    Insert {
        key: RowKey,
        json: String,
        image: RowImage,
    },
    Update {
        key: RowKey,
        json: String,
        image: RowImage,
        /// Changed non-key columns
        changed: Vec<(&'static str, Value)>,
    },
    Delete {
        key: RowKey,
        image: RowImage,
    },
}

impl PendingOp {
    fn image(&self) -> &RowImage {
        match self {
            PendingOp::Insert { image, .. }
            | PendingOp::Update { image, .. }
            | PendingOp::Delete { image, .. } => image,
        }
    }

    fn table(&self) -> &'static str {
        self.image().table
    }
}

/// Orders tables by foreign-key depth.
///
/// A table's depth is one more than the deepest table it references; tables
/// referencing nothing (or only tables never seen) have depth 0.
#[derive(Debug, Default)]
pub struct FlushOrderer {
    fields: HashMap<&'static str, &'static [FieldInfo]>,
}

impl FlushOrderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table's mapped fields.
    pub fn register(&mut self, table: &'static str, fields: &'static [FieldInfo]) {
        self.fields.entry(table).or_insert(fields);
    }

    pub fn depth(&self, table: &str) -> usize {
        self.depth_inner(table, &mut Vec::new())
    }

    fn depth_inner<'a>(&'a self, table: &'a str, visiting: &mut Vec<&'a str>) -> usize {
        if visiting.contains(&table) {
            return 0;
        }
        let Some(fields) = self.fields.get(table) else {
            return 0;
        };
        visiting.push(table);
        let depth = fields
            .iter()
            .filter_map(FieldInfo::referenced_table)
            .filter(|referenced| *referenced != table)
            .map(|referenced| self.depth_inner(referenced, visiting) + 1)
            .max()
            .unwrap_or(0);
        visiting.pop();
        depth
    }
}

/// Snapshots of the rows a session believes are in the database.
#[derive(Debug, Default)]
pub(crate) struct SnapshotStore {
    rows: HashMap<RowKey, Snapshot>,
    orderer: FlushOrderer,
}

impl SnapshotStore {
    /// Remember rows as persisted with their current content.
    pub(crate) fn track(&mut self, images: Vec<RowImage>) -> Result<()> {
        for image in images {
            self.orderer.register(image.table, image.fields);
            let key = row_key(&image)?;
            let json = serde_json::to_string(&image.columns)?;
            self.rows.insert(key, Snapshot { json, image });
        }
        Ok(())
    }

    /// Remember rows as persisted with unknown content, so the next flush
    /// rewrites every column.
    pub(crate) fn track_stale(&mut self, images: Vec<RowImage>) -> Result<()> {
        for mut image in images {
            self.orderer.register(image.table, image.fields);
            let key = row_key(&image)?;
            image.columns.clear();
            self.rows.insert(
                key,
                Snapshot {
                    json: String::new(),
                    image,
                },
            );
        }
        Ok(())
    }

    pub(crate) fn contains(&self, image: &RowImage) -> Result<bool> {
        Ok(self.rows.contains_key(&row_key(image)?))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }

    /// Compare the current images against the snapshots.
    pub(crate) fn plan(&mut self, images: Vec<RowImage>) -> Result<FlushPlan> {
        let mut seen = HashSet::new();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for image in images {
            self.orderer.register(image.table, image.fields);
            let key = row_key(&image)?;
            if !seen.insert(key.clone()) {
                continue;
            }
            let json = serde_json::to_string(&image.columns)?;
            match self.rows.get(&key) {
                None => inserts.push(PendingOp::Insert { key, json, image }),
                Some(snapshot) if snapshot.json != json => {
                    let changed = changed_columns(&snapshot.image, &image);
                    updates.push(PendingOp::Update {
                        key,
                        json,
                        image,
                        changed,
                    });
                }
                Some(_) => {}
            }
        }

        let mut deletes: Vec<PendingOp> = self
            .rows
            .iter()
            .filter(|(key, _)| !seen.contains(*key))
            .map(|(key, snapshot)| PendingOp::Delete {
                key: key.clone(),
                image: snapshot.image.clone(),
            })
            .collect();

        // Stable sorts keep registration order within a table.
        inserts.sort_by_key(|op| self.orderer.depth(op.table()));
        deletes.sort_by(|a, b| {
            let (da, db) = (self.orderer.depth(a.table()), self.orderer.depth(b.table()));
            db.cmp(&da)
                .then_with(|| a.table().cmp(b.table()))
                .then_with(|| op_key(a).cmp(op_key(b)))
        });

        Ok(FlushPlan {
            deletes,
            inserts,
            updates,
        })
    }

    /// Bring the snapshots in line with a plan that was executed.
    pub(crate) fn apply(&mut self, plan: FlushPlan) {
        for op in plan.deletes {
            if let PendingOp::Delete { key, .. } = op {
                self.rows.remove(&key);
            }
        }
        for op in plan.inserts.into_iter().chain(plan.updates) {
            match op {
                PendingOp::Insert { key, json, image } | PendingOp::Update { key, json, image, .. } => {
                    self.rows.insert(key, Snapshot { json, image });
                }
                PendingOp::Delete { .. } => {}
            }
        }
    }
}

fn op_key(op: &PendingOp) -> &str {
    match op {
        PendingOp::Insert { key, .. } | PendingOp::Update { key, .. } | PendingOp::Delete { key, .. } => {
            &key.1
        }
    }
}

fn changed_columns(before: &RowImage, after: &RowImage) -> Vec<(&'static str, Value)> {
    after
        .columns
        .iter()
        .filter(|(column, _)| !after.pk_columns.contains(column))
        .filter(|(column, value)| before.value(column) != Some(value))
        .cloned()
        .collect()
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushResult {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Write statements issued
    pub statements: usize,
}

/// Operations of one flush, in execution order per kind.
#[derive(Debug, Default)]
pub(crate) struct FlushPlan {
    /// Children first
    deletes: Vec<PendingOp>,
    /// Parents first
    inserts: Vec<PendingOp>,
    updates: Vec<PendingOp>,
}

impl FlushPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty() && self.updates.is_empty()
    }

    /// Execute deletes, then inserts, then updates.
    pub(crate) fn execute(&self, conn: &dyn Connection, batch_size: usize) -> Result<FlushResult> {
        tracing::debug!(
            deletes = self.deletes.len(),
            inserts = self.inserts.len(),
            updates = self.updates.len(),
            batch_size,
            "executing flush plan"
        );
        let mut result = FlushResult::default();

        for batch in batch_by_table(&self.deletes) {
            let (deleted, statements) = execute_delete_batch(conn, &batch, batch_size)?;
            result.deleted += deleted;
            result.statements += statements;
        }

        for batch in batch_by_table(&self.inserts) {
            result.statements += execute_insert_batch(conn, &batch, batch_size)?;
            result.inserted += batch.len();
        }

        for op in &self.updates {
            if let PendingOp::Update { image, changed, .. } = op {
                if changed.is_empty() {
                    continue;
                }
                execute_update(conn, image, changed)?;
                result.updated += 1;
                result.statements += 1;
            }
        }

        Ok(result)
    }
}

/// Group consecutive operations on the same table.
fn batch_by_table(ops: &[PendingOp]) -> Vec<Vec<&PendingOp>> {
    let mut batches: Vec<Vec<&PendingOp>> = Vec::new();
    for op in ops {
        match batches.last_mut() {
            Some(batch) if batch[0].table() == op.table() => batch.push(op),
            _ => batches.push(vec![op]),
        }
    }
    batches
}

fn rows_per_statement(batch_size: usize, params_per_row: usize) -> usize {
    let by_params = MAX_PARAMS / params_per_row.max(1);
    batch_size.clamp(1, by_params.max(1))
}

/// Multi-row INSERTs of `batch_size` rows. Returns the statements issued.
fn execute_insert_batch(conn: &dyn Connection, ops: &[&PendingOp], batch_size: usize) -> Result<usize> {
    let Some(first) = ops.first() else {
        return Ok(0);
    };
    let image = first.image();
    let columns: Vec<String> = image.columns.iter().map(|(c, _)| quote_ident(c)).collect();
    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(image.table),
        columns.join(", ")
    );

    let mut statements = 0;
    for chunk in ops.chunks(rows_per_statement(batch_size, columns.len())) {
        let sql = format!("{prefix}{}", vec![row_placeholders.as_str(); chunk.len()].join(", "));
        let params: Vec<Value> = chunk
            .iter()
            .flat_map(|op| op.image().columns.iter().map(|(_, v)| v.clone()))
            .collect();
        conn.execute(&sql, &params)?;
        statements += 1;
    }
    tracing::debug!(table = image.table, rows = ops.len(), statements, "insert batch");
    Ok(statements)
}

/// Deletes by key. Single-column keys are batched into `IN (...)` lists;
/// composite keys go one row at a time. Returns (rows, statements).
fn execute_delete_batch(
    conn: &dyn Connection,
    ops: &[&PendingOp],
    batch_size: usize,
) -> Result<(usize, usize)> {
    let Some(first) = ops.first() else {
        return Ok((0, 0));
    };
    let image = first.image();
    let table = quote_ident(image.table);
    let mut statements = 0;

    if let [pk_column] = image.pk_columns {
        for chunk in ops.chunks(rows_per_statement(batch_size, 1)) {
            let sql = format!(
                "DELETE FROM {table} WHERE {} IN ({})",
                quote_ident(pk_column),
                vec!["?"; chunk.len()].join(", ")
            );
            let params: Vec<Value> = chunk
                .iter()
                .filter_map(|op| op.image().pk.first().cloned())
                .collect();
            conn.execute(&sql, &params)?;
            statements += 1;
        }
    } else {
        for op in ops {
            let image = op.image();
            let sql = format!("DELETE FROM {table} WHERE {}", pk_condition(image.pk_columns));
            conn.execute(&sql, &image.pk)?;
            statements += 1;
        }
    }
    tracing::debug!(table = image.table, rows = ops.len(), statements, "delete batch");
    Ok((ops.len(), statements))
}

fn execute_update(
    conn: &dyn Connection,
    image: &RowImage,
    changed: &[(&'static str, Value)],
) -> Result<()> {
    let assignments: Vec<String> = changed
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(image.table),
        assignments.join(", "),
        pk_condition(image.pk_columns)
    );
    let params: Vec<Value> = changed
        .iter()
        .map(|(_, v)| v.clone())
        .chain(image.pk.iter().cloned())
        .collect();
    conn.execute(&sql, &params)?;
    Ok(())
}

fn pk_condition(pk_columns: &[&str]) -> String {
    pk_columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}
