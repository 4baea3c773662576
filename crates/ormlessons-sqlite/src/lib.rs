//! SQLite driver for ormlessons.
//!
//! Implements the synchronous `Connection` trait from ormlessons-core over the
//! bundled libsqlite3. Every lesson database is an in-memory SQLite database
//! shared by all sessions of one factory.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormlessons_core::{Connection, Value};
//! use ormlessons_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_script("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage class |
//! |-------|----------------------|
//! | `Bool` | INTEGER (0/1, read back as `Integer`) |
//! | `Integer` | INTEGER |
//! | `Real` | REAL |
//! | `Text` | TEXT |
//! | `Blob` | BLOB |
//! | `Null` | NULL |

#![allow(unsafe_code)]

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }
}
