//! SQLite driver for nanoorm.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the synchronous `Connection` trait from nanoorm-core
//! on top of the bundled libsqlite3 (via `libsqlite3-sys`).
//!
//! # Features
//!
//! - Named `:name` parameters bound from `Bindings`
//! - `RETURNING` on INSERT/UPDATE
//! - BEGIN/COMMIT/ROLLBACK with state tracking
//! - In-memory and file-based databases
//! - Configurable open flags and busy timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use nanoorm_core::{Bindings, Connection, Value};
//! use nanoorm_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut params = Bindings::new();
//! params.insert("name", "Alice");
//! let rows = conn.query("INSERT INTO users (name) VALUES (:name) RETURNING id", &params)?;
//! ```
//!
//! # Pagination
//!
//! SQLite has no `DECLARE CURSOR`. The connection reports `Dialect::Sqlite`,
//! which tells collections to page in memory over one execution.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
