//! Database connection trait.
//!
//! Synchronous: every lesson runs on a single thread and the point of
//! interest is *how many* statements reach the database, not how they are
//! scheduled.

use crate::Result;
use crate::row::Row;
use crate::value::Value;
use std::sync::Arc;

/// A database connection capable of executing statements.
///
/// Transactions nest: `begin` on a connection that already has an open
/// transaction starts a savepoint, and the matching `commit`/`rollback`
/// releases or rolls back to it.
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement and return the number of rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute one or more statements without parameters (DDL).
    fn execute_script(&self, sql: &str) -> Result<()>;

    /// Begin a transaction, or a savepoint inside the current one.
    fn begin(&self) -> Result<()>;

    /// Commit the innermost transaction level.
    fn commit(&self) -> Result<()>;

    /// Roll back the innermost transaction level.
    fn rollback(&self) -> Result<()>;

    /// Number of open transaction levels (0 when in autocommit).
    fn transaction_depth(&self) -> usize;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        (**self).execute_script(sql)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn transaction_depth(&self) -> usize {
        (**self).transaction_depth()
    }
}
