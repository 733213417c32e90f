//! Core types and traits for nanoorm.
//!
//! This crate provides the foundations the statement builder and the mapping
//! layer share:
//!
//! - `Value` for field storage and parameter binding
//! - `Row` for fetched results
//! - `Bindings` for named `:name` parameters
//! - `Connection` for synchronous execution and transactions
//! - identifier quoting helpers

pub mod bindings;
pub mod connection;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod value;

pub use bindings::Bindings;
pub use connection::{Connection, Dialect, Handle, Pagination};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, FieldValidationError, QueryError,
    QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError, ValidationError,
    ValidationErrorKind,
};
pub use identifiers::{quote_ident, quote_identifier, sanitize_identifier};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
