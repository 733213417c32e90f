//! A scripted connection that records every statement.

use nanoorm_core::{
    Bindings, Connection, Dialect, Error, QueryErrorKind, Result, Row, TransactionError,
    TransactionErrorKind, Value,
};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A canned answer for the next `query`/`execute`.
#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(String),
}

#[derive(Debug, Default)]
struct State {
    replies: VecDeque<Reply>,
    log: Vec<(String, Bindings)>,
    in_tx: bool,
}

/// Answers from a queue; an empty queue yields no rows and zero affected.
///
/// `begin`/`commit`/`rollback` are logged as `BEGIN`/`COMMIT`/`ROLLBACK`
/// and never consume a reply.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    dialect: Dialect,
    state: Mutex<State>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reply_rows(&self, rows: Vec<Row>) {
        self.lock().replies.push_back(Reply::Rows(rows));
    }

    pub fn reply_affected(&self, n: u64) {
        self.lock().replies.push_back(Reply::Affected(n));
    }

    pub fn reply_fail(&self, message: &str) {
        self.lock().replies.push_back(Reply::Fail(message.to_string()));
    }

    /// SQL text of every statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Every statement with its bindings.
    pub fn log(&self) -> Vec<(String, Bindings)> {
        self.lock().log.clone()
    }

    fn next(&self, sql: &str, params: &Bindings) -> Option<Reply> {
        let mut state = self.lock();
        state.log.push((sql.to_string(), params.clone()));
        state.replies.pop_front()
    }

    fn transition(&self, sql: &str, open: bool) -> Result<()> {
        let mut state = self.lock();
        state.log.push((sql.to_string(), Bindings::new()));
        if state.in_tx == open {
            let kind = if open {
                TransactionErrorKind::AlreadyActive
            } else {
                TransactionErrorKind::NotActive
            };
            return Err(Error::Transaction(TransactionError {
                kind,
                message: format!("{} in the wrong transaction state", sql),
            }));
        }
        state.in_tx = open;
        Ok(())
    }
}

impl Connection for RecordingConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>> {
        match self.next(sql, params) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(Error::query(QueryErrorKind::Database, sql, message)),
            Some(Reply::Affected(_)) | None => Ok(Vec::new()),
        }
    }

    fn execute(&self, sql: &str, params: &Bindings) -> Result<u64> {
        match self.next(sql, params) {
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Rows(rows)) => Ok(rows.len() as u64),
            Some(Reply::Fail(message)) => Err(Error::query(QueryErrorKind::Database, sql, message)),
            None => Ok(0),
        }
    }

    fn begin(&self) -> Result<()> {
        self.transition("BEGIN", true)
    }

    fn commit(&self) -> Result<()> {
        self.transition("COMMIT", false)
    }

    fn rollback(&self) -> Result<()> {
        self.transition("ROLLBACK", false)
    }

    fn in_transaction(&self) -> bool {
        self.lock().in_tx
    }
}

/// A row from `(column, value)` pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    Row::new(
        pairs.iter().map(|(name, _)| name.to_string()).collect(),
        pairs.iter().map(|(_, value)| value.clone()).collect(),
    )
}
