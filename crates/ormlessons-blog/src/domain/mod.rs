//! Entities of the lesson domains.
//!
//! Blogs own posts and posts own comments; children are created through
//! their parent's mutators, which enforce the invariants before appending.
//! Foo, Bar and FooBar form a separate domain with a composite key.

mod blog;
mod comment;
mod foo_bar;
mod post;

pub use blog::Blog;
pub use comment::{Comment, RESTRICTED_TERMS};
pub use foo_bar::{Bar, Foo, FooBar};
pub use post::Post;

use ormlessons::{DomainErrorKind, Error};

fn not_loaded(entity: &'static str, collection: &str) -> Error {
    Error::domain(
        DomainErrorKind::CollectionNotLoaded,
        entity,
        format!("{collection} were never loaded; load or fetch them first"),
    )
}
