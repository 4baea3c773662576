//! Model trait for mapping entities to tables.
//!
//! `Model` is the per-table half of a mapping declaration: table name, keys,
//! mapped fields, owned relationships, and the conversions between an entity
//! and a row. `ObjectGraph` is the aggregate half: it lets a session walk a
//! root and every loaded owned child when cascading saves and dirty checks.

use crate::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// Entity name used in diagnostics (`"Blog"`).
    const ENTITY_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Owned collections declared by this model.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Mapped fields, in column order.
    fn fields() -> &'static [FieldInfo];

    /// `RELATIONSHIPS` as a function, for use as a function pointer.
    fn relationships() -> &'static [RelationshipInfo] {
        Self::RELATIONSHIPS
    }

    /// Convert this model instance to (column, value) pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row. Owned collections come
    /// back unloaded.
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field(s).
    fn primary_key_value(&self) -> Vec<Value>;

    /// Check if this is a new record (primary key not assigned yet).
    fn is_new(&self) -> bool;

    /// Value of the natural-id column, if the model declares one.
    fn natural_id(&self) -> Option<Value> {
        let field = Self::fields().iter().find(|f| f.natural_id)?;
        self.to_row()
            .into_iter()
            .find(|(col, _)| *col == field.column_name)
            .map(|(_, v)| v)
    }
}

/// The persisted image of one row: where it lives and what it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RowImage {
    pub table: &'static str,
    pub pk_columns: &'static [&'static str],
    pub pk: Vec<Value>,
    pub columns: Vec<(&'static str, Value)>,
    /// Mapped fields of the table, for foreign-key ordering at flush.
    pub fields: &'static [FieldInfo],
}

impl RowImage {
    /// Capture the current row image of a model.
    pub fn of<M: Model>(model: &M) -> Self {
        Self {
            table: M::TABLE_NAME,
            pk_columns: M::PRIMARY_KEY,
            pk: model.primary_key_value(),
            columns: model.to_row(),
            fields: M::fields(),
        }
    }

    /// Value of a column in this image.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }
}

/// Source of identifiers for transient entities.
pub trait IdAllocator {
    /// Reserve the next identifier for a row of `table`.
    fn next_id(&mut self, table: &'static str) -> Result<i64>;
}

/// An aggregate root together with the owned children persisted with it.
pub trait ObjectGraph: Model {
    /// Append the row image of this object and of every loaded owned child,
    /// parents before children.
    fn collect_rows(&self, out: &mut Vec<RowImage>) {
        out.push(RowImage::of(self));
    }

    /// Assign identifiers to this object and any owned child still lacking
    /// one, and point children at their parent.
    fn assign_ids(&mut self, _ids: &mut dyn IdAllocator) -> Result<()> {
        Ok(())
    }

    /// Convenience wrapper around [`ObjectGraph::collect_rows`].
    fn row_images(&self) -> Vec<RowImage> {
        let mut out = Vec::new();
        self.collect_rows(&mut out);
        out
    }
}
