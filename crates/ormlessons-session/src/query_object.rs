//! Named, reusable queries.
//!
//! A query object bundles a query (its filters, fetches and result shape)
//! behind one `result()` call. It receives the session it runs against when
//! it is built, so every caller shares the same identity map.

use ormlessons_core::Result;

/// A named query with a single entry point.
pub trait QueryObject {
    /// Shape of the result (`Option<ModelRef<Blog>>`, `Vec<ModelRef<Blog>>`).
    type Output;

    /// Run the query.
    fn result(&self) -> Result<Self::Output>;
}
