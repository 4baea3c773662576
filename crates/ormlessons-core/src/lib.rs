//! Core types and traits for the ormlessons persistence layer.
//!
//! - `Value` / `Row` for parameters and results
//! - `FieldInfo` / `RelationshipInfo` for mapping declarations
//! - `Collection` / `HasMany` for owned, lazily loaded collections
//! - `Model` / `ObjectGraph` for entity ↔ row mapping and aggregate walking
//! - `Connection` for synchronous database access
//! - `Error` for everything that can go wrong

pub mod connection;
pub mod error;
pub mod field;
pub mod model;
pub mod relationship;
pub mod row;
pub mod types;
pub mod value;

pub use connection::Connection;
pub use error::{
    DomainError, DomainErrorKind, Error, QueryError, QueryErrorKind, Result, TranslationError,
};
pub use field::{FieldInfo, ReferentialAction, find_field};
pub use model::{IdAllocator, Model, ObjectGraph, RowImage};
pub use relationship::{Cascade, Collection, HasMany, RelationshipInfo, find_relationship};
pub use row::{FromValue, Row};
pub use types::SqlType;
pub use value::Value;
