//! Schema generation for ormlessons.
//!
//! This crate provides:
//! - CREATE TABLE generation from `Model` mapping declarations
//! - `SchemaExport`, which drops and recreates a registered set of tables
//!   (plus the hi/lo sequence table) on a connection

pub mod create;
pub mod export;

pub use create::CreateTable;
pub use export::{SchemaExport, hilo_table_sql};

use ormlessons_core::Model;

/// Table holding the next high value per entity table for hi/lo identifiers.
pub const HILO_TABLE: &str = "hilo_sequences";

/// Create a table for a model type.
///
/// # Example
///
/// ```ignore
/// let sql = create_table::<Blog>().if_not_exists().build();
/// ```
pub fn create_table<M: Model>() -> CreateTable<M> {
    CreateTable::new()
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate DROP TABLE SQL.
pub fn drop_table_sql(table_name: &str, if_exists: bool) -> String {
    if if_exists {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
    } else {
        format!("DROP TABLE {}", quote_ident(table_name))
    }
}
