//! The SQLite handle behind every lesson session.
//!
//! One `SqliteConnection` is shared by all sessions a factory opens, so it
//! owns the transaction nesting: the first `begin` is a real `BEGIN`, every
//! further level is a savepoint named after its depth. Statements are logged
//! at `debug` under the `ormlessons::sql` target.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use ormlessons_core::{
    Connection, Error, QueryErrorKind, Result, Row, Value,
    error::{ConnectionError, TransactionError},
    row::Columns,
};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How to open a database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// File path, or `:memory:`.
    pub path: String,
    pub read_only: bool,
    /// How long a statement waits on a locked database before `SQLITE_BUSY`.
    pub busy_timeout: Duration,
    /// `PRAGMA foreign_keys`; the lesson schema declares its cascades as
    /// foreign keys, so this is on unless a test turns it off.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    fn open_flags(&self) -> c_int {
        // Serialized mode: sessions on other threads share this handle.
        let mode = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        mode | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

/// The open `sqlite3*` plus the nesting depth of its transactions.
struct Handle {
    db: *mut ffi::sqlite3,
    depth: usize,
}

// SAFETY: opened with SQLITE_OPEN_FULLMUTEX and only reached through the
// connection's Mutex.
unsafe impl Send for Handle {}

impl Handle {
    fn open(config: &SqliteConfig) -> Result<Self> {
        let open_error = |message: String| {
            Error::Connection(ConnectionError {
                path: config.path.clone(),
                message,
            })
        };
        let c_path = CString::new(config.path.as_str())
            .map_err(|_| open_error("path contains a NUL byte".to_string()))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: c_path outlives the call; db is written on success and on
        // most failures, and is closed below in the failure case.
        let rc = unsafe {
            ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.open_flags(), ptr::null())
        };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a handle sqlite allocated for this failed open
                unsafe {
                    let message = last_message(db);
                    ffi::sqlite3_close(db);
                    message
                }
            };
            return Err(open_error(message));
        }

        let millis = c_int::try_from(config.busy_timeout.as_millis()).unwrap_or(c_int::MAX);
        // SAFETY: db is open
        unsafe { ffi::sqlite3_busy_timeout(db, millis) };
        Ok(Self { db, depth: 0 })
    }

    fn exec(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut message: *mut c_char = ptr::null_mut();
        // SAFETY: db is open, c_sql outlives the call
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut message)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if message.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: sqlite allocated message and hands ownership to us
            unsafe {
                let text = CStr::from_ptr(message).to_string_lossy().into_owned();
                ffi::sqlite3_free(message.cast());
                text
            }
        };
        Err(Error::query(kind_of(rc), sql, message))
    }

    /// Prepare `sql` and bind `params` to `?1..?n` in order.
    fn prepare(&self, sql: &str, params: &[Value]) -> Result<Statement> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: db is open, c_sql outlives the call
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(self.failure(sql));
        }
        let stmt = Statement(raw);

        for (i, param) in params.iter().enumerate() {
            let index = (i + 1) as c_int;
            // SAFETY: stmt is prepared and index is within its parameters
            let rc = unsafe { types::bind_value(stmt.0, index, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is open
                let detail = unsafe { last_message(self.db) };
                return Err(Error::query(
                    QueryErrorKind::Database,
                    sql,
                    format!("cannot bind parameter {index} ({param}): {detail}"),
                ));
            }
        }
        Ok(stmt)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.prepare(sql, params)?;

        // SAFETY: stmt is prepared
        let width = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let names = (0..width)
            // SAFETY: i is a valid column index
            .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(Columns::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is prepared
            match unsafe { ffi::sqlite3_step(stmt.0) } {
                ffi::SQLITE_ROW => {
                    let values = (0..width)
                        // SAFETY: the step just produced a row of `width` columns
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect();
                    rows.push(Row::sharing(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => return Ok(rows),
                _ => return Err(self.failure(sql)),
            }
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = self.prepare(sql, params)?;
        // SAFETY: stmt is prepared
        match unsafe { ffi::sqlite3_step(stmt.0) } {
            // RETURNING statements produce a row; the write has happened.
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(u64::try_from(self.changes()).unwrap_or(0)),
            _ => Err(self.failure(sql)),
        }
    }

    fn changes(&self) -> i32 {
        // SAFETY: db is open
        unsafe { ffi::sqlite3_changes(self.db) }
    }

    fn failure(&self, sql: &str) -> Error {
        // SAFETY: db is open
        let (code, message) = unsafe { (ffi::sqlite3_errcode(self.db), last_message(self.db)) };
        Error::query(kind_of(code), sql, message)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: db was opened by Handle::open and is closed exactly once;
        // close_v2 defers if a statement is somehow still live
        unsafe { ffi::sqlite3_close_v2(self.db) };
    }
}

/// A prepared statement, finalized on drop.
struct Statement(*mut ffi::sqlite3_stmt);

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: prepared successfully and finalized once
        unsafe { ffi::sqlite3_finalize(self.0) };
    }
}

/// A thread-safe SQLite connection with nested transactions.
pub struct SqliteConnection {
    handle: Mutex<Handle>,
    path: String,
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let conn = Self {
            handle: Mutex::new(Handle::open(config)?),
            path: config.path.clone(),
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        tracing::debug!(path = %conn.path, read_only = config.read_only, "opened sqlite database");
        Ok(conn)
    }

    /// A private in-memory database, the default for every lesson.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn handle(&self) -> Result<MutexGuard<'_, Handle>> {
        self.handle
            .lock()
            .map_err(|_| Error::poisoned("sqlite connection"))
    }

    /// Run one or more `;`-separated statements without parameters.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let handle = self.handle()?;
        tracing::debug!(target: "ormlessons::sql", sql, "exec");
        handle.exec(sql)
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        let handle = self.handle()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(handle.db) })
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<i32> {
        Ok(self.handle()?.changes())
    }
}

fn savepoint(level: usize) -> String {
    format!("sp_{level}")
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let handle = self.handle()?;
        tracing::debug!(target: "ormlessons::sql", sql, params = params.len(), "query");
        handle.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let handle = self.handle()?;
        tracing::debug!(target: "ormlessons::sql", sql, params = params.len(), "execute");
        handle.execute(sql, params)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        self.execute_raw(sql)
    }

    fn begin(&self) -> Result<()> {
        let mut handle = self.handle()?;
        let sql = match handle.depth {
            0 => "BEGIN".to_string(),
            n => format!("SAVEPOINT {}", savepoint(n)),
        };
        tracing::debug!(target: "ormlessons::sql", sql = %sql, depth = handle.depth + 1, "begin");
        handle.exec(&sql)?;
        handle.depth += 1;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut handle = self.handle()?;
        let sql = match handle.depth {
            0 => return Err(Error::Transaction(TransactionError { operation: "commit" })),
            1 => "COMMIT".to_string(),
            n => format!("RELEASE SAVEPOINT {}", savepoint(n - 1)),
        };
        tracing::debug!(target: "ormlessons::sql", sql = %sql, depth = handle.depth, "commit");
        handle.exec(&sql)?;
        handle.depth -= 1;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut handle = self.handle()?;
        match handle.depth {
            0 => return Err(Error::Transaction(TransactionError { operation: "rollback" })),
            1 => {
                tracing::debug!(target: "ormlessons::sql", depth = 1, "rollback");
                handle.exec("ROLLBACK")?;
            }
            n => {
                let name = savepoint(n - 1);
                tracing::debug!(target: "ormlessons::sql", savepoint = %name, depth = n, "rollback");
                // ROLLBACK TO keeps the savepoint on the stack.
                handle.exec(&format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"))?;
            }
        }
        handle.depth -= 1;
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.handle.lock().map_or(0, |handle| handle.depth)
    }
}

/// # Safety
/// `db` must be an open handle.
unsafe fn last_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: forwarded from the caller; errmsg is valid until the next call
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn nul_in_sql(sql: &str) -> Error {
    Error::query(QueryErrorKind::Syntax, sql, "statement contains a NUL byte")
}

fn kind_of(code: c_int) -> QueryErrorKind {
    // Extended result codes keep the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_READONLY | ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::ReadOnly,
        ffi::SQLITE_TOOBIG => QueryErrorKind::TooBig,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Interrupted,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_blogs() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE blogs (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn
    }

    fn blog_count(conn: &SqliteConnection) -> i64 {
        conn.query_one("SELECT COUNT(*) AS n FROM blogs", &[])
            .unwrap()
            .unwrap()
            .get_named("n")
            .unwrap()
    }

    fn names(conn: &SqliteConnection) -> Vec<String> {
        conn.query("SELECT name FROM blogs ORDER BY id", &[])
            .unwrap()
            .iter()
            .map(|row| row.get_named("name").unwrap())
            .collect()
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert_eq!(conn.transaction_depth(), 0);
    }

    #[test]
    fn test_raw_script_and_rowid() {
        let conn = with_blogs();
        conn.execute_raw("INSERT INTO blogs (name) VALUES ('ABC'); INSERT INTO blogs (name) VALUES ('XYZ')")
            .unwrap();
        assert_eq!(conn.changes().unwrap(), 1);
        assert_eq!(conn.last_insert_rowid().unwrap(), 2);
        assert_eq!(names(&conn), ["ABC", "XYZ"]);
    }

    #[test]
    fn test_numbered_parameters_bind_in_order() {
        let conn = with_blogs();
        let affected = conn
            .execute(
                "INSERT INTO blogs (id, name) VALUES (?1, ?2), (?3, ?4)",
                &[
                    Value::Integer(10),
                    Value::from("pitfalls"),
                    Value::Integer(11),
                    Value::Null,
                ],
            )
            .unwrap();
        assert_eq!(affected, 2);

        let rows = conn
            .query("SELECT name FROM blogs WHERE id = ?", &[Value::from(11_i32)])
            .unwrap();
        assert_eq!(rows[0].get_named::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn test_storage_classes_read_back() {
        let conn = SqliteConnection::open_memory().unwrap();
        let row = conn
            .query_one("SELECT 1 AS one, 2.5 AS half, x'0102' AS b, ? AS flag", &[Value::Bool(true)])
            .unwrap()
            .unwrap();
        assert_eq!(row.get_by_name("one"), Some(&Value::Integer(1)));
        assert_eq!(row.get_by_name("half"), Some(&Value::Real(2.5)));
        assert_eq!(row.get_by_name("b"), Some(&Value::Blob(vec![1, 2])));
        assert_eq!(row.get_by_name("flag"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_returning_counts_as_a_write() {
        let conn = with_blogs();
        let affected = conn
            .execute("INSERT INTO blogs (name) VALUES (?) RETURNING id", &[Value::from("r")])
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(blog_count(&conn), 1);
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let conn = with_blogs();

        conn.begin().unwrap();
        conn.execute("INSERT INTO blogs (name) VALUES (?)", &[Value::from("dropped")])
            .unwrap();
        conn.rollback().unwrap();
        assert_eq!(blog_count(&conn), 0);

        conn.begin().unwrap();
        conn.execute("INSERT INTO blogs (name) VALUES (?)", &[Value::from("kept")])
            .unwrap();
        conn.commit().unwrap();
        assert_eq!(names(&conn), ["kept"]);
        assert_eq!(conn.transaction_depth(), 0);
    }

    #[test]
    fn test_nested_rollback_keeps_outer_work() {
        let conn = with_blogs();

        conn.begin().unwrap();
        conn.execute("INSERT INTO blogs (name) VALUES ('outer')", &[])
            .unwrap();

        conn.begin().unwrap();
        assert_eq!(conn.transaction_depth(), 2);
        conn.execute("INSERT INTO blogs (name) VALUES ('inner')", &[])
            .unwrap();
        conn.rollback().unwrap();
        assert_eq!(conn.transaction_depth(), 1);

        // The savepoint was released: a new level reuses its name.
        conn.begin().unwrap();
        conn.execute("INSERT INTO blogs (name) VALUES ('second inner')", &[])
            .unwrap();
        conn.commit().unwrap();

        conn.commit().unwrap();
        assert_eq!(names(&conn), ["outer", "second inner"]);
    }

    #[test]
    fn test_commit_without_transaction_fails() {
        let conn = with_blogs();
        let err = conn.commit().unwrap_err();
        assert_eq!(err.to_string(), "cannot commit: no transaction is open");
        assert!(matches!(conn.rollback(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_error_kinds() {
        let conn = with_blogs();
        conn.execute("INSERT INTO blogs (id, name) VALUES (1, 'a')", &[])
            .unwrap();
        let dup = conn
            .execute("INSERT INTO blogs (id, name) VALUES (1, 'b')", &[])
            .unwrap_err();
        assert!(dup.is_query(QueryErrorKind::Constraint));
        assert_eq!(dup.sql(), Some("INSERT INTO blogs (id, name) VALUES (1, 'b')"));

        let typo = conn.query("SELECT nme FROM blogs", &[]).unwrap_err();
        assert!(typo.is_query(QueryErrorKind::Syntax));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw(
            "CREATE TABLE blogs (id INTEGER PRIMARY KEY);
             CREATE TABLE posts (id INTEGER PRIMARY KEY, blog_id INTEGER NOT NULL REFERENCES blogs(id));",
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO posts (id, blog_id) VALUES (1, 99)", &[])
            .unwrap_err();
        assert!(err.is_query(QueryErrorKind::Constraint));

        let lax = SqliteConnection::open(&SqliteConfig::memory().foreign_keys(false)).unwrap();
        lax.execute_raw(
            "CREATE TABLE blogs (id INTEGER PRIMARY KEY);
             CREATE TABLE posts (id INTEGER PRIMARY KEY, blog_id INTEGER REFERENCES blogs(id));
             INSERT INTO posts (id, blog_id) VALUES (1, 99);",
        )
        .unwrap();
    }

    #[test]
    fn test_read_only_file() {
        let tmp = std::env::temp_dir().join(format!("ormlessons_ro_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&tmp);
        let path = tmp.to_string_lossy().to_string();

        let conn = SqliteConnection::open_file(path.clone()).unwrap();
        conn.execute_raw("CREATE TABLE blogs (id INTEGER)").unwrap();
        drop(conn);

        let conn = SqliteConnection::open(
            &SqliteConfig::file(path).read_only().busy_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        assert!(conn.query("SELECT * FROM blogs", &[]).unwrap().is_empty());
        let err = conn.execute_raw("INSERT INTO blogs VALUES (1)").unwrap_err();
        assert!(err.is_query(QueryErrorKind::ReadOnly));

        drop(conn);
        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_open_failure_names_the_path() {
        let missing = std::env::temp_dir()
            .join(format!("ormlessons_missing_{}", std::process::id()))
            .join("lessons.db");
        let path = missing.to_string_lossy().to_string();
        let err = SqliteConnection::open(&SqliteConfig::file(path.clone()).read_only())
            .err()
            .unwrap();
        match err {
            Error::Connection(e) => assert_eq!(e.path, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
