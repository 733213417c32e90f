//! Database connection trait.
//!
//! - [`Connection`] - synchronous statement execution and transaction control
//! - [`Dialect`] - the SQL flavor a connection speaks
//! - [`Pagination`] - how a dialect pages through a result set
//!
//! Every entity, collection and resolver receives a [`Handle`] explicitly;
//! there is no process-wide provider.

use crate::bindings::Bindings;
use crate::error::Result;
use crate::row::Row;
use std::sync::Arc;

/// A shared connection handle.
pub type Handle = Arc<dyn Connection>;

/// SQL flavor spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// PostgreSQL: server-side cursors for paging.
    #[default]
    Postgres,
    /// SQLite: no `DECLARE CURSOR`, pages are cut from one buffered execution.
    Sqlite,
}

impl Dialect {
    /// The pagination strategy this dialect supports.
    #[must_use]
    pub const fn pagination(&self) -> Pagination {
        match self {
            Dialect::Postgres => Pagination::Cursor,
            Dialect::Sqlite => Pagination::Buffered,
        }
    }
}

/// How a paginated collection learns both its page and its total match count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `DECLARE` / `MOVE FORWARD` / `FETCH` over a server-side cursor.
    Cursor,
    /// Execute once, skip and take in memory, count the remainder.
    Buffered,
}

/// A synchronous database connection.
///
/// Statements use named `:name` parameters resolved against [`Bindings`].
/// Raw cursor commands go through [`execute`](Connection::execute) and
/// [`query`](Connection::query) with empty bindings.
pub trait Connection: Send + Sync {
    /// The dialect this connection speaks.
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    /// Execute a statement and return every produced row.
    fn query(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>>;

    /// Execute a statement and return the first row, if any.
    fn query_one(&self, sql: &str, params: &Bindings) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &Bindings) -> Result<u64>;

    /// Begin a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open on this connection.
    fn in_transaction(&self) -> bool;
}
