//! Filter expressions, SELECT building and specifications for ormlessons.
//!
//! `ormlessons-query` is the **query construction layer**. It turns
//! property-level predicates into SQL plus parameters by resolving them against
//! a model's mapping metadata.
//!
//! # Role In The Architecture
//!
//! - **Expression DSL**: `Expr` builds predicates over mapped properties and
//!   owned collections (`Expr::any`).
//! - **Translation**: `Scope` resolves properties to columns; anything the
//!   mapping does not persist is an `Error::Translation`.
//! - **Specifications**: `Specification` rules evaluate in memory and expose
//!   the same rule as an `Expr`.
//!
//! Queries execute through `ormlessons-session`, which owns the connection and
//! the identity map.

pub mod clause;
pub mod expr;
pub mod select;
pub mod specification;

pub use clause::{OrderBy, OrderDirection};
pub use expr::{BinaryOp, Expr, LIKE_ESCAPE, Scope, escape_like, quote_identifier};
pub use select::Select;
pub use specification::{
    AdHocSpecification, AndSpecification, NotSpecification, OrSpecification, Specification,
    SpecificationExt,
};

/// Create a SELECT query for a model.
///
/// # Example
///
/// ```ignore
/// let (sql, params) = select!(Blog)
///     .filter(Expr::prop("name").eq("rust"))
///     .build()?;
/// ```
#[macro_export]
macro_rules! select {
    ($model:ty) => {
        $crate::Select::<$model>::new()
    };
}
