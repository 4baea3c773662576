//! ormlessons - ORM pitfalls and their remedies, worked through over SQLite.
//!
//! This facade re-exports the persistence collaborator the lessons run on:
//!
//! - Mapping declarations (`Model`, `ObjectGraph`, `FieldInfo`, `RelationshipInfo`)
//! - Owned, lazily loaded collections (`Collection`, `HasMany`)
//! - Property-level filters and specifications (`Expr`, `Specification`)
//! - Sessions, units of work and eager fetch plans (`SessionFactory`, `FetchMany`)
//! - The profiler whose alerts name each anti-pattern (`Profiler`, `Alert`)
//!
//! # Quick Start
//!
//! ```ignore
//! use ormlessons::prelude::*;
//!
//! let conn = SqliteConnection::open_memory()?;
//! SchemaExport::new().register::<Blog>().register::<Post>().execute(&conn)?;
//! let factory = SessionFactory::new(conn, SessionConfig::default());
//!
//! // Write
//! let uow = factory.start_unit_of_work()?;
//! let mut blog = Blog::new("pitfalls");
//! blog.add_post("Lazy loading in loops")?;
//! uow.save(blog)?;
//! uow.commit()?;
//!
//! // Read, with the posts fetched eagerly
//! let uow = factory.start_unit_of_work()?;
//! let blog = uow
//!     .query::<Blog>()
//!     .filter(Expr::prop("name").eq("pitfalls"))
//!     .fetch(FetchMany::new(Blog::POSTS))
//!     .first()?;
//! uow.commit()?;
//!
//! assert!(factory.profiler().alerts().is_empty());
//! ```
//!
//! # Design
//!
//! - **Synchronous**: every lesson is single threaded; what matters is which
//!   statements reach the database.
//! - **Explicit handles**: sessions and units of work are passed down call
//!   chains. There is no container and no ambient session.
//! - **One dialect**: SQLite, in memory.

pub use ormlessons_core::{
    Cascade, Collection, Connection, DomainError, DomainErrorKind, Error, FieldInfo, FromValue,
    HasMany, IdAllocator, Model, ObjectGraph, QueryError, QueryErrorKind, ReferentialAction,
    RelationshipInfo, Result, Row, RowImage, SqlType, TranslationError, Value,
};

pub use ormlessons_query::{
    AdHocSpecification, AndSpecification, Expr, NotSpecification, OrSpecification, OrderBy,
    OrderDirection, Select, Specification, SpecificationExt,
};

pub use ormlessons_schema::{CreateTable, SchemaExport, create_table};

pub use ormlessons_session::{
    Alert, AlertKind, FetchMany, FlushResult, IdentityMap, ModelReadGuard, ModelRef,
    ModelWriteGuard, N1DetectionScope, N1Stats, Profiler, QueryObject, RequestScope, Session,
    SessionConfig, SessionFactory, SessionQuery, UnitOfWork,
};

pub use ormlessons_sqlite::{SqliteConfig, SqliteConnection};

/// Everything a lesson needs, in one import.
pub mod prelude {
    pub use crate::{
        AdHocSpecification, Alert, AlertKind, Cascade, Collection, Connection, DomainErrorKind,
        Error, Expr, FetchMany, FieldInfo, HasMany, IdAllocator, Model, ModelRef, ObjectGraph,
        OrderBy, QueryObject, ReferentialAction, RelationshipInfo, Result, Row, RowImage,
        SchemaExport, Session, SessionConfig, SessionFactory, Specification, SpecificationExt,
        SqlType, SqliteConnection, UnitOfWork, Value,
    };
}
