//! Blog and foo/bar domains for the ORM lessons.
//!
//! This crate holds everything the lesson fixtures under `tests/` build on:
//!
//! - [`domain`]: entities guarding their own invariants (a post refuses
//!   comments once they are disabled)
//! - [`mapping`]: how each entity maps to a table and which collections it owns
//! - [`specifications`]: business rules usable in memory and in queries
//! - [`queries`]: named query objects
//! - [`mothers`]: randomized builders for fixture data
//!
//! There is no container: a fixture calls [`session_factory`] and passes the
//! sessions and units of work it opens down to whatever needs them.
//!
//! # Example
//!
//! ```ignore
//! let factory = ormlessons_blog::session_factory(
//!     SqliteConnection::open_memory()?,
//!     SessionConfig::default(),
//! )?;
//! let uow = factory.start_unit_of_work()?;
//! uow.save(BlogMother::create_blog_with_posts_and_comments("pitfalls", 5, 10)?)?;
//! uow.commit()?;
//! ```

pub mod domain;
pub mod mapping;
pub mod mothers;
pub mod queries;
pub mod specifications;

pub use domain::{Bar, Blog, Comment, Foo, FooBar, Post, RESTRICTED_TERMS};
pub use mothers::{BlogMother, FooBarMother, RandomValueProvider};
pub use queries::{BlogByName, BlogsWithPostsThatHaveComments};
pub use specifications::{BlogSpecifications, CommentSpecifications, PostSpecifications};

use ormlessons::{Connection, Result, SchemaExport, SessionConfig, SessionFactory};

/// Schema for every entity of both domains.
pub fn schema() -> SchemaExport {
    SchemaExport::new()
        .register::<Blog>()
        .register::<Post>()
        .register::<Comment>()
        .register::<Foo>()
        .register::<Bar>()
        .register::<FooBar>()
}

/// Create the schema on `connection` and build a factory over it.
#[tracing::instrument(level = "debug", skip_all)]
pub fn session_factory<C: Connection>(
    connection: C,
    config: SessionConfig,
) -> Result<SessionFactory<C>> {
    schema().execute(&connection)?;
    tracing::debug!(tables = ?schema().tables(), "schema exported");
    Ok(SessionFactory::new(connection, config))
}
