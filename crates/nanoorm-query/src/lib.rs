//! SQL statement builder for nanoorm.
//!
//! `nanoorm-query` assembles SELECT, INSERT, UPDATE and DELETE text together
//! with a map of named `:name` parameters. It never executes anything by
//! itself; [`Statement::fetch`] and [`Statement::run`] hand the rendered text
//! to a `Connection` from `nanoorm-core`.
//!
//! - `filter`/`or_filter` wrap every condition in parentheses. Each call
//!   adds one group and groups are ANDed; an OR group is parenthesized as a
//!   whole.
//! - `set` binds each value under a fresh placeholder, unless the value is a
//!   [`SqlLiteral`], which is inlined.
//! - Identifiers go through `quote_identifier` only where the builder names
//!   them (tables, assigned columns, aliases, ORDER BY columns).

pub mod builder;
pub mod clause;
pub mod literal;
pub mod placeholder;
pub mod select;
pub mod statement;

pub use builder::{Delete, Insert, Update};
pub use clause::{IntoConditions, IntoProjections, OrderBy, OrderDirection, Projection};
pub use literal::{SqlLiteral, SqlValue, literal};
pub use placeholder::{placeholder_for, unique_suffix};
pub use select::Select;
pub use statement::Statement;
