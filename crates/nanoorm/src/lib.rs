//! nanoorm - a small mapper between relational rows and loosely typed objects.
//!
//! nanoorm provides:
//!
//! - `EntityMeta` descriptors naming a table, its primary key and its
//!   associations
//! - `Entity`, a map-backed record with dirty tracking, lazy association
//!   loading and insert-or-update saving
//! - `Collection`, a lazily loaded, filterable result set with cursor-based
//!   or in-memory pagination
//! - `MutableCollection` with deferred (or immediate) deletion
//! - `ManyToMany` for relations resolved through a junction table
//!
//! # Quick Start
//!
//! ```ignore
//! use nanoorm::prelude::*;
//! use std::sync::{Arc, LazyLock};
//!
//! static CUSTOMER: LazyLock<EntityMeta> = LazyLock::new(|| {
//!     EntityMeta::builder("public", "customers")
//!         .association("orders", Association::many(|| &*ORDER, "id", "customer_id"))
//!         .build()
//! });
//! static ORDER: LazyLock<EntityMeta> = LazyLock::new(|| {
//!     EntityMeta::builder("public", "orders")
//!         .association("customer", Association::single(|| &*CUSTOMER, "customer_id", "id"))
//!         .build()
//! });
//!
//! fn example(handle: Handle) -> Result<()> {
//!     let mut customer = Entity::retrieve_by_primary_key(&CUSTOMER, handle.clone(), 7)?
//!         .ok_or_else(|| Error::usage("no customer 7"))?;
//!
//!     let orders = customer.many("orders")?;
//!     orders.filter_any_field_eq("status", "open").filter_limit(10);
//!     for order in orders.iter()? {
//!         println!("{}", order.to_json());
//!     }
//!
//!     let mut order = Entity::new(&ORDER, handle);
//!     order.set("status", "open");
//!     order.set_related("customer", customer)?;
//!     order.save()?;
//!     Ok(())
//! }
//! ```
//!
//! # Connections
//!
//! Everything runs through a shared [`Handle`] to a synchronous
//! [`Connection`]. The handle's [`Dialect`] decides how paginated collections
//! are read: PostgreSQL-style drivers page with a server-side cursor,
//! SQLite pages in memory.

pub mod association;
pub mod collection;
pub mod entity;
pub mod key;
pub mod many_to_many;
pub mod meta;
pub mod mutable;

#[cfg(test)]
mod test_support;

pub use association::{Association, Cardinality, Junction};
pub use collection::{Collection, ExternalFilter, Filters};
pub use entity::{Entity, Field};
pub use key::{Key, KeyValue, Record, make_record};
pub use many_to_many::ManyToMany;
pub use meta::{BaseStatement, Contributor, EntityMeta, EntityMetaBuilder, Hook};
pub use mutable::MutableCollection;

// Re-export the pieces callers need from the sub-crates
pub use nanoorm_core::{
    Bindings, Connection, Dialect, Error, FromValue, Handle, Pagination, QueryError,
    QueryErrorKind, Result, Row, TransactionError, TransactionErrorKind, TypeError,
    ValidationError, ValidationErrorKind, Value, quote_identifier, sanitize_identifier,
};
pub use nanoorm_query::{
    Delete, Insert, OrderBy, OrderDirection, Projection, Select, SqlLiteral, Statement, Update,
    literal,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Association, Collection, Connection, Dialect, Entity, EntityMeta, Error, Field, Handle,
        Junction, Key, KeyValue, ManyToMany, MutableCollection, OrderBy, OrderDirection, Result,
        Select, Statement, Value, literal, make_record,
    };
}
