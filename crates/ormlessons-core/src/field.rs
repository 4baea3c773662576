//! Field and column definitions.
//!
//! A model's `fields()` slice is its mapping declaration: which properties are
//! persisted, under which column, and with what keys and constraints. Anything
//! not listed here is invisible to query translation.

use crate::types::SqlType;

/// Referential action for foreign key constraints (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    /// Raise an error if any references exist.
    #[default]
    NoAction,
    /// Same as NO ACTION.
    Restrict,
    /// Automatically delete referencing rows.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

/// Metadata about a mapped property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Property name used by expressions and specifications
    pub name: &'static str,
    /// Database column name
    pub column_name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Natural identifier: unique, and indexed by the session for cache lookups
    pub natural_id: bool,
    pub unique: bool,
    /// Foreign key reference (`table.column`)
    pub foreign_key: Option<&'static str>,
    /// Referential action for ON DELETE (only valid with foreign_key)
    pub on_delete: Option<ReferentialAction>,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name,
            sql_type,
            nullable: false,
            primary_key: false,
            natural_id: false,
            unique: false,
            foreign_key: None,
            on_delete: None,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Mark as the natural identifier (implies unique).
    pub const fn natural_id(mut self) -> Self {
        self.natural_id = true;
        self.unique = true;
        self
    }

    /// Set unique constraint flag.
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Set foreign key reference (`table.column`).
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Set ON DELETE action for the foreign key.
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Referenced table of the foreign key, if any.
    pub fn referenced_table(&self) -> Option<&'static str> {
        self.foreign_key
            .and_then(|fk| fk.split_once('.'))
            .map(|(table, _)| table)
    }
}

/// Find a mapped field by property name.
pub fn find_field(fields: &'static [FieldInfo], name: &str) -> Option<&'static FieldInfo> {
    fields.iter().find(|f| f.name == name)
}
