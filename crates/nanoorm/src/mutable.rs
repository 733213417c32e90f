//! A collection that accepts assignment and removal.
//!
//! Removed entities are deleted when the collection is saved. In auto-commit
//! mode every assignment saves at once and every removal deletes at once.

use crate::collection::Collection;
use crate::entity::Entity;
use crate::meta::EntityMeta;
use nanoorm_core::{Error, Handle, Result};
use std::ops::{Deref, DerefMut};
use std::ptr;

/// A [`Collection`] whose items can be replaced, appended and removed.
///
/// Reads and filters go through to the wrapped collection.
#[derive(Debug)]
pub struct MutableCollection {
    inner: Collection,
    auto_commit: bool,
    deleted: Vec<Entity>,
}

impl MutableCollection {
    pub fn new(meta: &'static EntityMeta, handle: Handle) -> Self {
        Self::from_collection(Collection::new(meta, handle))
    }

    pub fn from_collection(inner: Collection) -> Self {
        Self {
            inner,
            auto_commit: false,
            deleted: Vec::new(),
        }
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Switch auto-commit mode, returning the previous mode.
    pub fn set_auto_commit(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.auto_commit, enabled)
    }

    /// Entities removed since the last save.
    pub fn pending_deletes(&self) -> &[Entity] {
        &self.deleted
    }

    /// Put `entity` at `index`. `index == len` appends.
    pub fn set(&mut self, index: usize, entity: Entity) -> Result<()> {
        let meta = self.inner.meta();
        if !ptr::eq(entity.meta(), meta) {
            return Err(Error::usage(format!(
                "expected an entity of {}, got {}",
                meta.qualified_table(),
                entity.meta().qualified_table()
            )));
        }

        let len = self.inner.len()?;
        let items = self.inner.items_vec_mut();
        if index < len {
            items[index] = entity;
        } else if index == len {
            items.push(entity);
        } else {
            return Err(Error::usage(format!(
                "index {} is past the end of a collection of {}",
                index, len
            )));
        }

        if self.auto_commit {
            items[index].save()?;
        }
        Ok(())
    }

    /// Append `entity`.
    pub fn push(&mut self, entity: Entity) -> Result<()> {
        let len = self.inner.len()?;
        self.set(len, entity)
    }

    /// Remove the entity at `index`.
    ///
    /// Entities without a primary key were never stored, so nothing is
    /// deleted for them.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let len = self.inner.len()?;
        if index >= len {
            return Err(Error::usage(format!(
                "index {} is out of range for a collection of {}",
                index, len
            )));
        }
        let items = self.inner.items_vec_mut();

        if self.auto_commit {
            if items[index].has_primary_key() {
                items[index].delete(false)?;
            }
            items.remove(index);
        } else {
            let entity = items.remove(index);
            self.deleted.push(entity);
        }
        Ok(())
    }

    /// Save every item, then delete the removed ones.
    pub fn save(&mut self) -> Result<()> {
        self.inner.save()?;

        tracing::debug!(count = self.deleted.len(), "deleting removed items");
        while let Some(entity) = self.deleted.first_mut() {
            if entity.has_primary_key() {
                entity.delete(false)?;
            }
            self.deleted.remove(0);
        }
        Ok(())
    }

    pub fn into_inner(self) -> Collection {
        self.inner
    }
}

impl Deref for MutableCollection {
    type Target = Collection;

    fn deref(&self) -> &Collection {
        &self.inner
    }
}

impl DerefMut for MutableCollection {
    fn deref_mut(&mut self) -> &mut Collection {
        &mut self.inner
    }
}
