//! Association descriptors: how one entity type reaches another.

use crate::key::Key;
use crate::meta::EntityMeta;
use std::fmt;

/// Whether an association yields one entity or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Many,
}

/// Junction table wiring for a many-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    /// Junction table name, optionally schema-qualified.
    pub table: String,
    /// Junction columns pointing at the local entity's key.
    pub local: Key,
    /// Junction columns pointing at the target entity's key.
    pub foreign: Key,
}

impl Junction {
    pub fn new(table: impl Into<String>, local: impl Into<Key>, foreign: impl Into<Key>) -> Self {
        Self {
            table: table.into(),
            local: local.into(),
            foreign: foreign.into(),
        }
    }
}

/// One named association of an entity type.
///
/// `local` names fields of the owning entity and `foreign` names fields of
/// the target. Without a junction, the target rows are those whose
/// `foreign` fields equal the owner's `local` fields. With a junction,
/// `local` and `foreign` are the two entities' keys and the junction links
/// them.
#[derive(Clone)]
pub struct Association {
    pub(crate) target: fn() -> &'static EntityMeta,
    pub local: Key,
    pub foreign: Key,
    pub cardinality: Cardinality,
    pub junction: Option<Junction>,
}

impl Association {
    /// A single-valued association, e.g. `order.customer`.
    pub fn single(
        target: fn() -> &'static EntityMeta,
        local: impl Into<Key>,
        foreign: impl Into<Key>,
    ) -> Self {
        Self {
            target,
            local: local.into(),
            foreign: foreign.into(),
            cardinality: Cardinality::Single,
            junction: None,
        }
    }

    /// A multi-valued association, e.g. `customer.orders`.
    pub fn many(
        target: fn() -> &'static EntityMeta,
        local: impl Into<Key>,
        foreign: impl Into<Key>,
    ) -> Self {
        Self {
            target,
            local: local.into(),
            foreign: foreign.into(),
            cardinality: Cardinality::Many,
            junction: None,
        }
    }

    /// Route the association through a junction table.
    ///
    /// Junction associations are always multi-valued.
    pub fn via(mut self, junction: Junction) -> Self {
        self.cardinality = Cardinality::Many;
        self.junction = Some(junction);
        self
    }

    /// The target entity type.
    pub fn target(&self) -> &'static EntityMeta {
        (self.target)()
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("target", &self.target().table())
            .field("local", &self.local)
            .field("foreign", &self.foreign)
            .field("cardinality", &self.cardinality)
            .field("junction", &self.junction)
            .finish()
    }
}
