//! Hi/lo identifier generation.
//!
//! Each table gets blocks of `block_size` identifiers. Reserving a block costs
//! one statement, which bumps the table's high value in the
//! `hilo_sequences` table and returns it; the identifiers inside the block are
//! then handed out from memory. Blocks for high value `h` cover
//! `(h - 1) * block_size + 1 ..= h * block_size`.
//!
//! The reservation runs on the shared connection, inside whatever transaction
//! is open there, so a rollback can take the high value back while a block
//! reserved under it is still cached (or already assigned). Generators that
//! share [`HighWaterMarks`] never accept a high value at or below the highest
//! one any of them was handed, which keeps their blocks disjoint across such
//! rollbacks.

use ormlessons_core::{Connection, Error, Result, Value};
use ormlessons_schema::{HILO_TABLE, quote_ident};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Highest high value handed out per table, shared by every generator of one
/// session factory.
#[derive(Debug, Default)]
pub struct HighWaterMarks {
    marks: Mutex<HashMap<&'static str, i64>>,
}

impl HighWaterMarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest high value seen for `table` (0 when none).
    pub fn get(&self, table: &str) -> Result<i64> {
        let marks = self
            .marks
            .lock()
            .map_err(|_| Error::poisoned("hi/lo high-water marks"))?;
        Ok(marks.get(table).copied().unwrap_or(0))
    }

    fn raise(&self, table: &'static str, hi: i64) -> Result<()> {
        let mut marks = self
            .marks
            .lock()
            .map_err(|_| Error::poisoned("hi/lo high-water marks"))?;
        let mark = marks.entry(table).or_insert(0);
        *mark = (*mark).max(hi);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    next: i64,
    last: i64,
}

/// Hands out identifiers per table, one database round trip per block.
#[derive(Debug)]
pub struct HiLoGenerator {
    block_size: i64,
    blocks: HashMap<&'static str, Block>,
    high_water: Arc<HighWaterMarks>,
}

impl HiLoGenerator {
    /// A generator with high-water marks of its own.
    pub fn new(block_size: u32) -> Self {
        Self::shared(block_size, Arc::new(HighWaterMarks::new()))
    }

    /// A generator that keeps clear of every block handed out under
    /// `high_water`.
    pub fn shared(block_size: u32, high_water: Arc<HighWaterMarks>) -> Self {
        Self {
            block_size: i64::from(block_size.max(1)),
            blocks: HashMap::new(),
            high_water,
        }
    }

    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    /// Next identifier for `table`, reserving a new block through `conn` when
    /// the current one is used up.
    pub fn next_id(&mut self, conn: &dyn Connection, table: &'static str) -> Result<i64> {
        if let Some(block) = self.blocks.get_mut(table) {
            if block.next <= block.last {
                let id = block.next;
                block.next += 1;
                return Ok(id);
            }
        }

        let floor = self.high_water.get(table)? + 1;
        let hi = Self::reserve(conn, table, floor)?;
        self.high_water.raise(table, hi)?;
        let first = (hi - 1) * self.block_size + 1;
        let last = hi * self.block_size;
        tracing::debug!(table, hi, first, last, "reserved hi/lo block");
        self.blocks.insert(
            table,
            Block {
                next: first + 1,
                last,
            },
        );
        Ok(first)
    }

    /// Bump the stored high value for `table` to at least `floor` and return
    /// it.
    fn reserve(conn: &dyn Connection, table: &'static str, floor: i64) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {tbl} ({name}, {hi}) VALUES (?1, ?2) \
             ON CONFLICT ({name}) DO UPDATE SET {hi} = max({hi} + 1, ?2) \
             RETURNING {hi}",
            tbl = quote_ident(HILO_TABLE),
            name = quote_ident("table_name"),
            hi = quote_ident("next_hi"),
        );
        let row = conn
            .query_one(&sql, &[Value::Text(table.to_string()), Value::Integer(floor)])?
            .ok_or_else(|| Error::Custom(format!("no high value returned for '{table}'")))?;
        row.get_named::<i64>("next_hi")
    }

    /// Forget cached blocks. Identifiers already handed out stay reserved.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }
}
