//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the synchronous `Connection` trait from nanoorm-core. Statements use named
//! `:name` parameters resolved against `Bindings`.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)]

use crate::ffi;
use crate::types;
use nanoorm_core::{
    Bindings, ColumnInfo, ConfigError, Connection, ConnectionError, ConnectionErrorKind, Dialect,
    Error, QueryError, QueryErrorKind, Result, Row, TransactionError, TransactionErrorKind,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Reject settings SQLite would refuse or silently reinterpret.
    pub fn validate(&self) -> Result<()> {
        let problem = if self.path.is_empty() {
            Some("database path is empty")
        } else if self.path.contains('\0') {
            Some("database path contains a null byte")
        } else if self.flags.read_only && (self.flags.read_write || self.flags.create) {
            Some("read_only cannot be combined with read_write or create")
        } else if self.flags.no_mutex && self.flags.full_mutex {
            Some("no_mutex and full_mutex are mutually exclusive")
        } else {
            None
        };
        match problem {
            Some(message) => Err(Error::Config(ConfigError {
                message: format!("{} ({:?})", message, self.path),
                source: None,
            })),
            None => Ok(()),
        }
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only ever touched while holding the Mutex, so it is
// never used from two threads at once.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// SQLite has no `DECLARE CURSOR`, so this connection reports
/// [`Dialect::Sqlite`] and paginated collections cut their page from one
/// buffered execution.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        config.validate()?;
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        tracing::debug!(path = %config.path, "sqlite connection opened");

        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without binding (DDL, multi-statement scripts).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec_script(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is valid
        let n = unsafe { ffi::sqlite3_changes(inner.db) };
        u64::try_from(n).unwrap_or(0)
    }

    /// Prepare and execute a query, returning all rows.
    fn query_sync(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "sqlite query");
        let inner = self.lock();
        let stmt = Prepared::new(inner.db, sql)?;
        stmt.bind(params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name =
                unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    fn execute_sync(&self, sql: &str, params: &Bindings) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "sqlite execute");
        let inner = self.lock();
        let stmt = Prepared::new(inner.db, sql)?;
        stmt.bind(params)?;

        // RETURNING produces rows; drain them so the statement completes.
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {}
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    fn transition(&self, sql: &str, expect_open: bool) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_transaction != expect_open {
            let (kind, message) = if expect_open {
                (TransactionErrorKind::NotActive, "Not in a transaction")
            } else {
                (TransactionErrorKind::AlreadyActive, "Already in a transaction")
            };
            return Err(Error::Transaction(TransactionError {
                kind,
                message: message.to_string(),
            }));
        }

        exec_script(inner.db, sql)?;
        inner.in_transaction = !expect_open;
        tracing::debug!(statement = sql, "sqlite transaction state changed");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.db.is_null() {
            // SAFETY: db is valid and never used again
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
            inner.db = ptr::null_mut();
        }
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>> {
        self.query_sync(sql, params)
    }

    fn execute(&self, sql: &str, params: &Bindings) -> Result<u64> {
        self.execute_sync(sql, params)
    }

    fn begin(&self) -> Result<()> {
        self.transition("BEGIN", false)
    }

    fn commit(&self) -> Result<()> {
        self.transition("COMMIT", true)
    }

    fn rollback(&self) -> Result<()> {
        self.transition("ROLLBACK", true)
    }

    fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }
}

/// A prepared statement, finalized on drop.
struct Prepared<'a> {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: &'a str,
}

impl<'a> Prepared<'a> {
    fn new(db: *mut ffi::sqlite3, sql: &'a str) -> Result<Self> {
        let raw = prepare_stmt(db, sql)?;
        Ok(Self { raw, db, sql })
    }

    /// Bind every named parameter the statement references.
    ///
    /// Bindings the statement does not reference are ignored; a referenced
    /// name with no binding is an error.
    fn bind(&self, params: &Bindings) -> Result<()> {
        // SAFETY: raw is valid
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.raw) };
        for index in 1..=count {
            // SAFETY: raw is valid, index is in 1..=count
            let Some(name) = (unsafe { types::parameter_name(self.raw, index) }) else {
                return Err(Error::query(
                    QueryErrorKind::Binding,
                    self.sql,
                    format!("parameter {} is positional; only :name parameters are supported", index),
                ));
            };
            let Some(value) = params.get(&name) else {
                return Err(Error::query(
                    QueryErrorKind::Binding,
                    self.sql,
                    format!("no value bound for :{}", name),
                ));
            };
            // SAFETY: raw is valid, index is in range
            let rc = unsafe { types::bind_value(self.raw, index, value) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(self.db, self.sql, &name));
            }
        }
        Ok(())
    }
}

impl Drop for Prepared<'_> {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 and is finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

// Helper functions

/// Read the last error message of `db`.
///
/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: forwarded from the caller; errmsg never returns dangling pointers
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        if ptr.is_null() {
            return String::new();
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn exec_script(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::query(QueryErrorKind::Syntax, sql, "SQL contains null byte")
    })?;

    let mut err: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut err) };

    if rc != ffi::SQLITE_OK {
        let msg = if !err.is_null() {
            // SAFETY: err is a valid C string allocated by SQLite
            let msg = unsafe { CStr::from_ptr(err).to_string_lossy().into_owned() };
            // SAFETY: err was allocated by sqlite3_exec
            unsafe { ffi::sqlite3_free(err.cast()) };
            msg
        } else {
            ffi::error_string(rc).to_string()
        };

        return Err(Error::query(error_code_to_kind(rc), sql, msg));
    }

    Ok(())
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::query(QueryErrorKind::Syntax, sql, "SQL contains null byte")
    })?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    let len = c_int::try_from(c_sql.as_bytes().len())
        .map_err(|_| Error::query(QueryErrorKind::DataTruncation, sql, "SQL text too long"))?;

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };

    if rc != ffi::SQLITE_OK {
        return Err(step_error(db, sql));
    }
    if stmt.is_null() {
        return Err(Error::query(QueryErrorKind::Syntax, sql, "empty statement"));
    }

    Ok(stmt)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, name: &str) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };
    Error::query(
        QueryErrorKind::Binding,
        sql,
        format!("Failed to bind parameter :{}: {}", name, msg),
    )
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
        detail: Some(ffi::error_string(code).to_string()),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_RANGE | ffi::SQLITE_MISMATCH => QueryErrorKind::Binding,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
