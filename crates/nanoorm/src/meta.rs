//! Per-entity-type metadata, built once and shared by every instance.
//!
//! Entity types are declared as statics:
//!
//! ```rust,ignore
//! static ORDER: LazyLock<EntityMeta> = LazyLock::new(|| {
//!     EntityMeta::builder("public", "orders")
//!         .association("customer", Association::single(customer, "customer_id", "id"))
//!         .build()
//! });
//!
//! fn order() -> &'static EntityMeta {
//!     &ORDER
//! }
//! ```
//!
//! Associations name their target through a function, so types can refer to
//! each other in cycles.

use crate::association::Association;
use crate::entity::Entity;
use crate::key::{Key, KeyValue};
use nanoorm_core::{Result, quote_identifier};
use nanoorm_query::Select;
use std::fmt;

/// A save hook. Returning `false` from a before-save hook vetoes the save.
pub type Hook = fn(&mut Entity) -> bool;

/// A named filter contributor.
///
/// Called on every statement assembly with the value recorded through
/// `Collection::filter_by` under the same name, or `None` when nothing was
/// recorded. A contributor with nothing to add returns the statement as-is.
pub type Contributor = fn(&EntityMeta, Option<&KeyValue>, Select) -> Result<Select>;

/// Replaces the default `SELECT * FROM <table>` base statement.
pub type BaseStatement = fn(&EntityMeta) -> Select;

/// Static description of an entity type.
pub struct EntityMeta {
    schema: String,
    table: String,
    primary_key: Key,
    associations: Vec<(String, Association)>,
    read_only: bool,
    before_save: Option<Hook>,
    after_save: Option<Hook>,
    base_statement: Option<BaseStatement>,
    contributors: Vec<(String, Contributor)>,
}

impl EntityMeta {
    /// Start describing the entity stored in `schema.table`.
    pub fn builder(schema: impl Into<String>, table: impl Into<String>) -> EntityMetaBuilder {
        EntityMetaBuilder {
            meta: EntityMeta {
                schema: schema.into(),
                table: table.into(),
                primary_key: Key::scalar("id"),
                associations: Vec::new(),
                read_only: false,
                before_save: None,
                after_save: None,
                base_statement: None,
                contributors: Vec::new(),
            },
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `schema.table`, or just the table when no schema is set.
    pub fn qualified_table(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }

    /// A fully qualified, quoted column reference.
    pub fn qualify(&self, field: &str) -> String {
        quote_identifier(&format!("{}.{}", self.qualified_table(), field))
    }

    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// Look up an association by name.
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    /// Every association, in declaration order.
    pub fn associations(&self) -> impl Iterator<Item = (&str, &Association)> {
        self.associations.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Whether saves and deletes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn before_save(&self) -> Option<Hook> {
        self.before_save
    }

    pub(crate) fn after_save(&self) -> Option<Hook> {
        self.after_save
    }

    /// The statement every collection of this type starts from.
    pub fn base_statement(&self) -> Select {
        match self.base_statement {
            Some(build) => build(self),
            None => Select::new(),
        }
    }

    /// Registered contributors, in registration order.
    pub fn contributors(&self) -> &[(String, Contributor)] {
        &self.contributors
    }

    pub(crate) fn contributor(&self, name: &str) -> Option<Contributor> {
        self.contributors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field(
                "associations",
                &self.associations.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("read_only", &self.read_only)
            .field(
                "contributors",
                &self.contributors.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityMeta`].
#[must_use]
pub struct EntityMetaBuilder {
    meta: EntityMeta,
}

impl EntityMetaBuilder {
    /// Set the primary key. Defaults to `id`.
    pub fn primary_key(mut self, key: impl Into<Key>) -> Self {
        self.meta.primary_key = key.into();
        self
    }

    /// Declare an association. A later declaration with the same name wins.
    pub fn association(mut self, name: impl Into<String>, association: Association) -> Self {
        let name = name.into();
        self.meta.associations.retain(|(n, _)| *n != name);
        self.meta.associations.push((name, association));
        self
    }

    /// Reject saves and deletes for this type.
    pub fn read_only(mut self) -> Self {
        self.meta.read_only = true;
        self
    }

    pub fn before_save(mut self, hook: Hook) -> Self {
        self.meta.before_save = Some(hook);
        self
    }

    pub fn after_save(mut self, hook: Hook) -> Self {
        self.meta.after_save = Some(hook);
        self
    }

    /// Replace the default base statement, e.g. to add a fixed join.
    pub fn base_statement(mut self, build: BaseStatement) -> Self {
        self.meta.base_statement = Some(build);
        self
    }

    /// Register a named contributor for `Collection::filter_by`.
    pub fn contributor(mut self, name: impl Into<String>, contributor: Contributor) -> Self {
        let name = name.into();
        self.meta.contributors.retain(|(n, _)| *n != name);
        self.meta.contributors.push((name, contributor));
        self
    }

    pub fn build(self) -> EntityMeta {
        self.meta
    }
}
