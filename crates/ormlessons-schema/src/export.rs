//! Whole-schema export: drop and recreate every registered table.

use crate::{CreateTable, HILO_TABLE, drop_table_sql, quote_ident};
use ormlessons_core::{Connection, Model, Result};

/// DDL for one registered model.
#[derive(Debug, Clone)]
struct TableDdl {
    table: &'static str,
    create: String,
}

/// Generates the schema for a set of models and applies it to a connection.
///
/// Models are registered parents first; tables are dropped in reverse
/// registration order so foreign keys never dangle. The hi/lo sequence table
/// is always part of the export.
#[derive(Debug, Clone, Default)]
pub struct SchemaExport {
    tables: Vec<TableDdl>,
}

impl SchemaExport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. Call for referenced tables before referencing ones.
    pub fn register<M: Model>(mut self) -> Self {
        self.tables.push(TableDdl {
            table: M::TABLE_NAME,
            create: CreateTable::<M>::new().build(),
        });
        self
    }

    /// Registered table names, in creation order.
    pub fn tables(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.table).collect()
    }

    /// DROP statements, children first.
    pub fn drop_statements(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .tables
            .iter()
            .rev()
            .map(|t| drop_table_sql(t.table, true))
            .collect();
        out.push(drop_table_sql(HILO_TABLE, true));
        out
    }

    /// CREATE statements, parents first, followed by the hi/lo table.
    pub fn create_statements(&self) -> Vec<String> {
        let mut out: Vec<String> = self.tables.iter().map(|t| t.create.clone()).collect();
        out.push(hilo_table_sql());
        out
    }

    /// Drop and recreate the whole schema.
    #[tracing::instrument(level = "info", skip_all, fields(tables = self.tables.len()))]
    pub fn execute<C: Connection + ?Sized>(&self, conn: &C) -> Result<()> {
        for sql in self.drop_statements() {
            conn.execute_script(&sql)?;
        }
        for sql in self.create_statements() {
            conn.execute_script(&sql)?;
        }
        tracing::info!(tables = ?self.tables(), "schema exported");
        Ok(())
    }
}

/// CREATE TABLE for the hi/lo sequence table.
pub fn hilo_table_sql() -> String {
    format!(
        "CREATE TABLE {} (\n  {} TEXT NOT NULL PRIMARY KEY,\n  {} BIGINT NOT NULL\n)",
        quote_ident(HILO_TABLE),
        quote_ident("table_name"),
        quote_ident("next_hi")
    )
}
