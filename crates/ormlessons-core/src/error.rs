//! Error types for persistence and domain operations.
//!
//! Three families of failure matter to the lessons:
//!
//! - **Domain** errors: an entity refused an operation that would break one of
//!   its invariants (adding a comment to a post with comments disabled).
//! - **Translation** errors: a predicate could not be expressed against the
//!   mapped schema (a specification over a derived, non-persisted property).
//! - **Infrastructure** errors: whatever SQLite, the mapping or the
//!   environment throws at us.

use std::fmt;

/// The error type for all ormlessons operations.
#[derive(Debug)]
pub enum Error {
    /// The database file could not be opened.
    Connection(ConnectionError),
    /// SQLite rejected a statement.
    Query(QueryError),
    /// A column value could not be read as the requested Rust type.
    Conversion(ConversionError),
    /// Commit or rollback with no transaction open.
    Transaction(TransactionError),
    /// A row did not carry a column the mapping relies on.
    Mapping(MappingError),
    /// A `SessionConfig` environment variable did not parse.
    Config(ConfigError),
    /// An entity refused an operation that would violate its invariants.
    Domain(DomainError),
    /// A predicate could not be translated into SQL.
    Translation(TranslationError),
    /// Writing a rendered entity failed.
    Io(std::io::Error),
    /// Snapshot or alert serialization failed.
    Serde(String),
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    /// Path handed to `sqlite3_open_v2`.
    pub path: String,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
}

/// SQLite primary result codes, folded into the cases callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// `SQLITE_ERROR`: bad SQL or an unknown table or column.
    Syntax,
    /// `SQLITE_CONSTRAINT`: unique, foreign key, not null or check.
    Constraint,
    /// `SQLITE_BUSY` / `SQLITE_LOCKED`.
    Busy,
    /// `SQLITE_READONLY`, `SQLITE_PERM`, `SQLITE_AUTH`.
    ReadOnly,
    /// `SQLITE_TOOBIG`.
    TooBig,
    /// `SQLITE_INTERRUPT`.
    Interrupted,
    /// Anything else, including a failed parameter bind.
    Database,
}

#[derive(Debug)]
pub struct ConversionError {
    /// Rust type the caller asked for.
    pub expected: &'static str,
    /// Storage class actually found, or why no value was found at all.
    pub found: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    /// `"commit"` or `"rollback"`.
    pub operation: &'static str,
}

#[derive(Debug)]
pub struct MappingError {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// An invariant-guard violation raised by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub kind: DomainErrorKind,
    /// Entity type that refused the operation.
    pub entity: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainErrorKind {
    /// Comments were added to a post that has comments disabled.
    CommentsDisabled,
    /// A collection was mutated before it was loaded.
    CollectionNotLoaded,
    /// A reference was taken to an entity that has no identity yet.
    TransientReference,
}

/// A predicate that cannot be expressed against the mapped schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationError {
    /// Entity the predicate was translated against.
    pub entity: &'static str,
    /// Property (or predicate description) that failed to resolve.
    pub property: String,
    pub message: String,
}

impl Error {
    pub fn domain(
        kind: DomainErrorKind,
        entity: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::Domain(DomainError {
            kind,
            entity,
            message: message.into(),
        })
    }

    /// A property that does not resolve against `entity`.
    pub fn unresolved_property(entity: &'static str, property: impl Into<String>) -> Self {
        let property = property.into();
        Error::Translation(TranslationError {
            entity,
            message: format!(
                "property '{property}' is not mapped on '{entity}' and cannot be used in a query"
            ),
            property,
        })
    }

    /// A `std::sync` lock was poisoned by a panicking holder.
    pub fn poisoned(what: &str) -> Self {
        Error::Custom(format!("{what} lock poisoned"))
    }

    pub fn query(kind: QueryErrorKind, sql: &str, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            sql: Some(sql.to_string()),
            message: message.into(),
        })
    }

    pub fn is_domain(&self, kind: DomainErrorKind) -> bool {
        matches!(self, Error::Domain(e) if e.kind == kind)
    }

    pub fn is_translation(&self) -> bool {
        matches!(self, Error::Translation(_))
    }

    /// Is this a SQLite failure of the given kind?
    pub fn is_query(&self, kind: QueryErrorKind) -> bool {
        matches!(self, Error::Query(e) if e.kind == kind)
    }

    /// The statement SQLite rejected, if this is a query error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "cannot open '{}': {}", e.path, e.message),
            Error::Query(e) => write!(f, "query failed: {e}"),
            Error::Conversion(e) => write!(f, "conversion failed: {e}"),
            Error::Transaction(e) => write!(f, "cannot {}: no transaction is open", e.operation),
            Error::Mapping(e) => write!(
                f,
                "row from '{}' has no '{}' column",
                e.table, e.column
            ),
            Error::Config(e) => write!(f, "{}: {}", e.variable, e.message),
            Error::Domain(e) => write!(f, "{} refused the operation: {}", e.entity, e.message),
            Error::Translation(e) => write!(f, "unsupported translation: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Serde(msg) => write!(f, "serialization failed: {msg}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (in `{sql}`)", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "column '{col}' holds {}, not {}", self.found, self.expected),
            None => write!(f, "{} is not {}", self.found, self.expected),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<DomainError> for Error {
    fn from(err: DomainError) -> Self {
        Error::Domain(err)
    }
}

impl From<TranslationError> for Error {
    fn from(err: TranslationError) -> Self {
        Error::Translation(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_reports_entity() {
        let err = Error::domain(
            DomainErrorKind::CommentsDisabled,
            "Post",
            "comments are disabled",
        );
        assert!(err.is_domain(DomainErrorKind::CommentsDisabled));
        assert!(!err.is_domain(DomainErrorKind::CollectionNotLoaded));
        assert_eq!(
            err.to_string(),
            "Post refused the operation: comments are disabled"
        );
    }

    #[test]
    fn unresolved_property_names_the_property() {
        let err = Error::unresolved_property("Comment", "contains_restricted_language");
        assert!(err.is_translation());
        match err {
            Error::Translation(t) => {
                assert_eq!(t.entity, "Comment");
                assert_eq!(t.property, "contains_restricted_language");
                assert!(t.message.contains("not mapped"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn query_error_keeps_the_rejected_statement() {
        let err = Error::query(
            QueryErrorKind::Constraint,
            "INSERT INTO blogs (id, name) VALUES (?, ?)",
            "UNIQUE constraint failed: blogs.id",
        );
        assert!(err.is_query(QueryErrorKind::Constraint));
        assert!(!err.is_query(QueryErrorKind::Busy));
        assert_eq!(err.sql(), Some("INSERT INTO blogs (id, name) VALUES (?, ?)"));
        assert_eq!(
            err.to_string(),
            "query failed: UNIQUE constraint failed: blogs.id \
             (in `INSERT INTO blogs (id, name) VALUES (?, ?)`)"
        );
    }

    #[test]
    fn infrastructure_messages_name_their_subject() {
        let mapping = Error::Mapping(MappingError {
            table: "posts",
            column: "blog_id",
        });
        assert_eq!(mapping.to_string(), "row from 'posts' has no 'blog_id' column");

        let tx = Error::Transaction(TransactionError {
            operation: "commit",
        });
        assert_eq!(tx.to_string(), "cannot commit: no transaction is open");
        assert_eq!(tx.sql(), None);
    }

    #[test]
    fn config_error_chains_the_parse_failure() {
        let parse = "many".parse::<usize>().unwrap_err();
        let err = Error::Config(ConfigError {
            variable: "ORMLESSONS_BATCH_SIZE",
            message: "must be a non-negative integer, got 'many'".into(),
            source: Some(Box::new(parse)),
        });
        assert!(err.to_string().starts_with("ORMLESSONS_BATCH_SIZE:"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::other("pipe closed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
