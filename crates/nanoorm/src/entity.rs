//! A single row of an entity type, with dirty tracking and lazy associations.
//!
//! `data` is the authoritative snapshot of the row. Every `set` records the
//! new value in both `data` and `modified`, and `save` writes only what is in
//! `modified`.
//!
//! ```rust,ignore
//! let mut order = Entity::new(order_meta(), handle.clone());
//! order.set("customer_id", 7i64);
//! order.save()?;                       // INSERT ... RETURNING id
//!
//! let id = order.primary_key_value().unwrap();
//! let again = Entity::retrieve_by_primary_key(order_meta(), handle, id)?;
//! ```

use crate::association::Association;
use crate::collection::Collection;
use crate::key::{Key, KeyValue, Record};
use crate::many_to_many::ManyToMany;
use crate::meta::EntityMeta;
use nanoorm_core::{
    Error, FromValue, Handle, Result, Row, ValidationError, ValidationErrorKind, Value,
    quote_identifier, sanitize_identifier,
};
use nanoorm_query::{Delete, Insert, Statement, Update};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ptr;

/// A resolved association held in the foreign cache.
#[derive(Clone)]
enum Related {
    One(Option<Box<Entity>>),
    Many(Collection),
}

/// The result of generic field access.
#[derive(Debug)]
pub enum Field<'a> {
    /// A plain column value.
    Value(&'a Value),
    /// A single-valued association; `None` when nothing matched.
    One(Option<&'a mut Entity>),
    /// A multi-valued association, loaded on first read.
    Many(&'a mut Collection),
    /// Neither a known column nor an association.
    Missing,
}

impl Field<'_> {
    /// The plain value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }
}

/// One row of an entity type.
#[derive(Clone)]
pub struct Entity {
    meta: &'static EntityMeta,
    handle: Handle,
    data: BTreeMap<String, Value>,
    modified: BTreeMap<String, Value>,
    /// Primary key values as last read from or written to the store.
    persisted_key: BTreeMap<String, Value>,
    foreign: HashMap<String, Related>,
}

impl Entity {
    /// An empty, unsaved entity.
    pub fn new(meta: &'static EntityMeta, handle: Handle) -> Self {
        Self {
            meta,
            handle,
            data: BTreeMap::new(),
            modified: BTreeMap::new(),
            persisted_key: BTreeMap::new(),
            foreign: HashMap::new(),
        }
    }

    /// An entity holding a fetched row, with nothing modified.
    pub fn hydrate(meta: &'static EntityMeta, handle: Handle, row: Row) -> Self {
        let mut entity = Self::new(meta, handle);
        entity.data = row.into_pairs().collect();
        entity.remember_key();
        entity
    }

    /// Load the entity whose primary key equals `value`.
    ///
    /// `value` must be a single scalar, or a single record for a compound
    /// key. Every key component is bound.
    pub fn retrieve_by_primary_key(
        meta: &'static EntityMeta,
        handle: Handle,
        value: impl Into<KeyValue>,
    ) -> Result<Option<Entity>> {
        let value = value.into();
        let key = meta.primary_key();
        key.validate(&value)?;
        if matches!(value, KeyValue::ScalarList(_) | KeyValue::RecordList(_)) {
            let kind = if key.is_compound() {
                ValidationErrorKind::RecordExpected
            } else {
                ValidationErrorKind::ScalarExpected
            };
            return Err(Error::Validation(ValidationError::single(
                "values",
                kind,
                "a primary key lookup takes exactly one key value",
            )));
        }

        let mut collection = Collection::new(meta, handle);
        for field in key.fields() {
            let component = value.field(field).cloned().unwrap_or(Value::Null);
            collection.filter_any_field_eq(qualified_name(meta, field), component);
        }
        Ok(collection.into_items()?.into_iter().next())
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Generic field access.
    ///
    /// Association names resolve through the association and cache the
    /// result; anything else reads `data`.
    pub fn get(&mut self, field: &str) -> Result<Field<'_>> {
        let meta = self.meta;
        let Some(association) = meta.association(field) else {
            return Ok(match self.data.get(field) {
                Some(value) => Field::Value(value),
                None => Field::Missing,
            });
        };

        if !self.foreign.contains_key(field) {
            let related = self.resolve(association)?;
            self.foreign.insert(field.to_string(), related);
        }
        Ok(match self.foreign.get_mut(field) {
            Some(Related::One(entity)) => Field::One(entity.as_deref_mut()),
            Some(Related::Many(collection)) => Field::Many(collection),
            None => Field::Missing,
        })
    }

    /// Resolve a single-valued association.
    pub fn one(&mut self, name: &str) -> Result<Option<&mut Entity>> {
        let table = self.meta.qualified_table();
        match self.get(name)? {
            Field::One(entity) => Ok(entity),
            _ => Err(Error::usage(format!(
                "`{}` is not a single-valued association of {}",
                name, table
            ))),
        }
    }

    /// Resolve a multi-valued association.
    pub fn many(&mut self, name: &str) -> Result<&mut Collection> {
        let table = self.meta.qualified_table();
        match self.get(name)? {
            Field::Many(collection) => Ok(collection),
            _ => Err(Error::usage(format!(
                "`{}` is not a multi-valued association of {}",
                name, table
            ))),
        }
    }

    /// The raw value of a column, if present.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// A typed column value. A missing column reads as NULL.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        let value = self.data.get(field).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(field.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// The column value, or `default` when it is missing or NULL.
    pub fn get_or(&self, field: &str, default: impl Into<Value>) -> Value {
        match self.data.get(field) {
            Some(value) if !value.is_null() => value.clone(),
            _ => default.into(),
        }
    }

    /// Assign a column value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let field = field.into();
        let value = value.into();
        self.forget_associations_using(&field);
        self.data.insert(field.clone(), value.clone());
        self.modified.insert(field, value);
        self
    }

    /// Assign a single-valued association.
    ///
    /// The entity must be of the association's target type. Its key is
    /// copied into the local field(s) and it is saved first whenever this
    /// entity is saved.
    pub fn set_related(&mut self, name: &str, entity: Entity) -> Result<&mut Self> {
        let meta = self.meta;
        let association = meta.association(name).ok_or_else(|| {
            Error::usage(format!(
                "`{}` is not an association of {}",
                name,
                meta.qualified_table()
            ))
        })?;
        if association.is_many() {
            return Err(Error::usage(format!(
                "`{}` is multi-valued and cannot be assigned an entity",
                name
            )));
        }
        let target = association.target();
        if !ptr::eq(entity.meta, target) {
            return Err(Error::usage(format!(
                "`{}` expects an entity of {}, got {}",
                name,
                target.qualified_table(),
                entity.meta.qualified_table()
            )));
        }

        let copies = key_pairs(&association.local, &association.foreign)?;
        for (local, foreign) in copies {
            let value = entity.data.get(foreign).cloned().unwrap_or(Value::Null);
            self.set(local, value);
        }
        self.foreign
            .insert(name.to_string(), Related::One(Some(Box::new(entity))));
        Ok(self)
    }

    /// Persist pending changes.
    ///
    /// Returns `Ok(false)` only when the before-save hook vetoes the save.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.meta.qualified_table()))]
    pub fn save(&mut self) -> Result<bool> {
        let meta = self.meta;
        if meta.is_read_only() {
            return Err(Error::usage(format!(
                "{} is read-only",
                meta.qualified_table()
            )));
        }
        if let Some(hook) = meta.before_save() {
            if !hook(self) {
                tracing::debug!("save vetoed by before-save hook");
                return Ok(false);
            }
        }
        if self.modified.is_empty() || self.data.is_empty() {
            return Ok(true);
        }

        for field in meta.primary_key().fields() {
            if self.data.get(field).is_some_and(Value::is_null) {
                self.data.remove(field);
                self.modified.remove(field);
            }
        }

        self.save_parents()?;

        if meta.primary_key().is_compound() || self.has_primary_key() {
            if self.do_update()? == 0 {
                tracing::debug!("update matched no row, inserting");
                self.do_insert(true)?;
            }
        } else {
            self.do_insert(false)?;
        }
        self.remember_key();

        self.push_child_keys();
        self.modified.clear();

        Ok(match meta.after_save() {
            Some(hook) => hook(self),
            None => true,
        })
    }

    /// Delete the row by primary key.
    ///
    /// Unless `preserve_primary` is set, the key fields read as NULL
    /// afterwards.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.meta.qualified_table()))]
    pub fn delete(&mut self, preserve_primary: bool) -> Result<()> {
        let meta = self.meta;
        if meta.is_read_only() {
            return Err(Error::usage(format!(
                "{} is read-only",
                meta.qualified_table()
            )));
        }
        if !self.has_primary_key() {
            return Err(Error::usage(format!(
                "cannot delete from {} without a primary key value",
                meta.qualified_table()
            )));
        }

        let (conditions, bindings) = self.primary_key_predicate();
        let affected = Delete::from_table(meta.qualified_table())
            .filter(conditions)
            .bind_all(bindings)
            .run(self.handle.as_ref())?;
        tracing::debug!(affected, "deleted");
        self.persisted_key.clear();

        if !preserve_primary {
            for field in meta.primary_key().fields() {
                self.data.insert(field.to_string(), Value::Null);
                self.modified.remove(field);
            }
        }
        Ok(())
    }

    /// Mark every field modified so the next save writes the whole row.
    pub fn touch(&mut self) -> &mut Self {
        self.modified = self.data.clone();
        self
    }

    pub fn is_dirty(&self) -> bool {
        !self.modified.is_empty()
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn modified(&self) -> &BTreeMap<String, Value> {
        &self.modified
    }

    /// Replace the data snapshot. With `touch`, every field is also marked
    /// modified.
    pub fn set_data(&mut self, data: BTreeMap<String, Value>, touch: bool) -> &mut Self {
        self.modified = if touch { data.clone() } else { BTreeMap::new() };
        self.data = data;
        self.foreign.clear();
        self
    }

    /// Drop a field from both `data` and `modified`.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.forget_associations_using(field);
        self.modified.remove(field);
        self.data.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The data snapshot as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Whether every primary key field is present and not NULL.
    pub fn has_primary_key(&self) -> bool {
        self.key_value(self.meta.primary_key()).is_some()
    }

    /// The primary key value, if every component is set.
    pub fn primary_key_value(&self) -> Option<KeyValue> {
        self.key_value(self.meta.primary_key())
    }

    /// The value of `key`'s fields, or `None` if any is absent or NULL.
    pub fn key_value(&self, key: &Key) -> Option<KeyValue> {
        match key {
            Key::Scalar(field) => self
                .data
                .get(field)
                .filter(|v| !v.is_null())
                .map(|v| KeyValue::Scalar(v.clone())),
            Key::Compound(fields) => {
                let mut record = Record::new();
                for field in fields {
                    let value = self.data.get(field).filter(|v| !v.is_null())?;
                    record.insert(field.clone(), value.clone());
                }
                Some(KeyValue::Record(record))
            }
        }
    }

    /// Build what an association points at, without caching it.
    fn resolve(&self, association: &Association) -> Result<Related> {
        let target = association.target();
        let local_value = self.key_value(&association.local);

        if let Some(junction) = &association.junction {
            let mut resolver = ManyToMany::new(
                self.meta,
                association.local.clone(),
                target,
                association.foreign.clone(),
                junction.table.clone(),
                junction.local.clone(),
                junction.foreign.clone(),
                self.handle.clone(),
            )?;
            resolver.filter_my_records(
                local_value.unwrap_or_else(|| KeyValue::none_for(&association.local)),
            )?;
            return Ok(Related::Many(resolver.into_collection()));
        }

        let pairs = key_pairs(&association.local, &association.foreign)?;
        let mut collection = Collection::new(target, self.handle.clone());
        match &local_value {
            Some(values) => {
                for (local, foreign) in pairs {
                    let value = values.field(local).cloned().unwrap_or(Value::Null);
                    collection.filter_any_field_eq(qualified_name(target, foreign), value);
                }
            }
            None if association.is_many() => {
                collection.filter_external(|select| Ok(select.filter("1 = 0")));
            }
            None => return Ok(Related::One(None)),
        }

        if association.is_many() {
            Ok(Related::Many(collection))
        } else {
            let first = collection.into_items()?.into_iter().next();
            Ok(Related::One(first.map(Box::new)))
        }
    }

    /// Save cached single-valued parents and copy their keys in.
    fn save_parents(&mut self) -> Result<()> {
        let meta = self.meta;
        let mut assignments = Vec::new();
        for (name, association) in meta.associations() {
            if association.is_many() {
                continue;
            }
            let Some(Related::One(Some(parent))) = self.foreign.get_mut(name) else {
                continue;
            };
            if !parent.save()? {
                tracing::warn!(association = name, "parent save vetoed, copying its key anyway");
            }
            for (local, foreign) in key_pairs(&association.local, &association.foreign)? {
                let value = parent.data.get(foreign).cloned().unwrap_or(Value::Null);
                assignments.push((local.to_string(), value));
            }
        }
        for (field, value) in assignments {
            self.assign_if_changed(field, value);
        }
        Ok(())
    }

    /// Copy this entity's key into loaded children of one-to-many associations.
    fn push_child_keys(&mut self) {
        let Self {
            meta,
            data,
            foreign,
            ..
        } = self;
        for (name, association) in meta.associations() {
            if !association.is_many() || association.junction.is_some() {
                continue;
            }
            let Some(Related::Many(children)) = foreign.get_mut(name) else {
                continue;
            };
            let Ok(pairs) = key_pairs(&association.local, &association.foreign) else {
                continue;
            };
            for child in children.loaded_items_mut() {
                for (local, foreign_field) in &pairs {
                    let value = data.get(*local).cloned().unwrap_or(Value::Null);
                    child.assign_if_changed(foreign_field.to_string(), value);
                }
            }
        }
    }

    /// UPDATE by the persisted key. Key fields are only written when they
    /// differ from the persisted key.
    fn do_update(&mut self) -> Result<u64> {
        let meta = self.meta;
        let key = meta.primary_key();
        let mut changes: Vec<(String, Value)> = self
            .modified
            .iter()
            .filter(|(field, value)| {
                !key.contains(field)
                    || self
                        .persisted_key
                        .get(field.as_str())
                        .is_some_and(|stored| !stored.same_as(value))
            })
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if changes.is_empty() {
            changes = key
                .fields()
                .into_iter()
                .map(|f| (f.to_string(), self.data.get(f).cloned().unwrap_or(Value::Null)))
                .collect();
        }

        let (conditions, bindings) = self.primary_key_predicate();
        Update::table(meta.qualified_table())
            .set(changes)
            .filter(conditions)
            .bind_all(bindings)
            .run(self.handle.as_ref())
    }

    /// INSERT the pending fields, or the whole snapshot after a failed update.
    fn do_insert(&mut self, whole_row: bool) -> Result<()> {
        let meta = self.meta;
        let source = if whole_row { &self.data } else { &self.modified };
        let returning: Vec<String> = meta
            .primary_key()
            .fields()
            .into_iter()
            .map(quote_identifier)
            .collect();
        let insert = Insert::into_table(meta.qualified_table())
            .set(source.iter().map(|(f, v)| (f.clone(), v.clone())))
            .returning(returning);

        let rows = insert.fetch(self.handle.as_ref())?;
        if let Some(row) = rows.into_iter().next() {
            for (field, value) in row.into_pairs() {
                self.data.insert(field, value);
            }
        }
        Ok(())
    }

    /// `field = :pk_<schema>_<table>_<field>` for every key field, bound to
    /// the persisted key where one is known.
    fn primary_key_predicate(&self) -> (Vec<String>, Vec<(String, Value)>) {
        let meta = self.meta;
        let mut conditions = Vec::new();
        let mut bindings = Vec::new();
        for field in meta.primary_key().fields() {
            let name = format!(
                "pk_{}",
                sanitize_identifier(&format!("{}_{}_{}", meta.schema(), meta.table(), field))
            );
            conditions.push(format!("{} = :{}", quote_identifier(field), name));
            let value = self
                .persisted_key
                .get(field)
                .or_else(|| self.data.get(field))
                .cloned()
                .unwrap_or(Value::Null);
            bindings.push((name, value));
        }
        (conditions, bindings)
    }

    /// Record the current key as the persisted one, if it is complete.
    fn remember_key(&mut self) {
        self.persisted_key.clear();
        if !self.has_primary_key() {
            return;
        }
        for field in self.meta.primary_key().fields() {
            if let Some(value) = self.data.get(field) {
                self.persisted_key.insert(field.to_string(), value.clone());
            }
        }
    }

    fn assign_if_changed(&mut self, field: String, value: Value) {
        if self.data.get(&field).is_some_and(|v| v.same_as(&value)) {
            return;
        }
        self.data.insert(field.clone(), value.clone());
        self.modified.insert(field, value);
    }

    /// Drop cached single-valued associations whose local key includes
    /// `field`. Loaded children stay cached and receive the new key on save.
    fn forget_associations_using(&mut self, field: &str) {
        if self.foreign.is_empty() {
            return;
        }
        for (name, association) in self.meta.associations() {
            if !association.is_many() && association.local.contains(field) {
                self.foreign.remove(name);
            }
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.meta.qualified_table())
            .field("data", &self.data)
            .field("modified", &self.modified)
            .field("persisted_key", &self.persisted_key)
            .field("cached", &self.foreign.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `schema.table.field`, unquoted.
fn qualified_name(meta: &EntityMeta, field: &str) -> String {
    format!("{}.{}", meta.qualified_table(), field)
}

/// Pair up the fields of two keys that must line up one to one.
fn key_pairs<'a>(local: &'a Key, foreign: &'a Key) -> Result<Vec<(&'a str, &'a str)>> {
    if local.len() != foreign.len() {
        return Err(Error::usage(format!(
            "key [{}] cannot be matched against key [{}]",
            local.fields().join(", "),
            foreign.fields().join(", ")
        )));
    }
    Ok(local.fields().into_iter().zip(foreign.fields()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{Association, Junction};
    use crate::test_support::{RecordingConnection, row};
    use std::sync::{Arc, LazyLock};

    static CUSTOMER: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("public", "customers")
            .association("orders", Association::many(order, "id", "customer_id"))
            .build()
    });
    static ORDER: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("public", "orders")
            .association("customer", Association::single(customer, "customer_id", "id"))
            .association(
                "tags",
                Association::many(tag, "id", "id")
                    .via(Junction::new("public.order_tags", "order_id", "tag_id")),
            )
            .build()
    });
    static TAG: LazyLock<EntityMeta> =
        LazyLock::new(|| EntityMeta::builder("public", "tags").build());
    static LINE: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("public", "order_lines")
            .primary_key(["order_id", "line_no"])
            .build()
    });
    static ARCHIVE: LazyLock<EntityMeta> =
        LazyLock::new(|| EntityMeta::builder("public", "archive").read_only().build());
    static GUARDED: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("public", "guarded")
            .before_save(|e| e.contains("approved"))
            .build()
    });

    fn customer() -> &'static EntityMeta {
        &CUSTOMER
    }
    fn order() -> &'static EntityMeta {
        &ORDER
    }
    fn tag() -> &'static EntityMeta {
        &TAG
    }

    fn setup() -> (Arc<RecordingConnection>, Handle) {
        let conn = Arc::new(RecordingConnection::new());
        let handle: Handle = conn.clone();
        (conn, handle)
    }

    #[test]
    fn save_without_changes_executes_nothing() {
        let (conn, handle) = setup();
        let mut e = Entity::hydrate(
            order(),
            handle,
            row(&[("id", Value::BigInt(1)), ("customer_id", Value::BigInt(7))]),
        );
        assert!(e.save().unwrap());
        assert!(conn.statements().is_empty());

        let (conn, handle) = setup();
        let mut fresh = Entity::new(order(), handle);
        assert!(fresh.save().unwrap());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn insert_returns_primary_key() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[("id", Value::BigInt(41))])]);

        let mut e = Entity::new(order(), handle);
        e.set("customer_id", 7i64);
        assert!(e.save().unwrap());

        let log = conn.log();
        assert_eq!(log.len(), 1);
        let (sql, bindings) = &log[0];
        assert!(sql.starts_with("INSERT INTO public.orders (customer_id) VALUES (:customer_id_"));
        assert!(sql.ends_with(" RETURNING id"));
        assert_eq!(bindings.iter().next().map(|(_, v)| v), Some(&Value::BigInt(7)));

        assert_eq!(e.value("id"), Some(&Value::BigInt(41)));
        assert!(!e.is_dirty());
        assert_eq!(e.get_as::<i64>("customer_id").unwrap(), 7);
    }

    #[test]
    fn null_primary_key_is_omitted_from_insert() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[("id", Value::BigInt(2))])]);

        let mut e = Entity::new(order(), handle);
        e.set("id", Value::Null).set("customer_id", 3i64);
        e.save().unwrap();
        let sql = &conn.statements()[0];
        assert!(sql.starts_with("INSERT INTO public.orders (customer_id) VALUES"));
    }

    #[test]
    fn update_falls_back_to_insert() {
        let (conn, handle) = setup();
        conn.reply_affected(0);
        conn.reply_rows(vec![row(&[("id", Value::BigInt(5))])]);

        let mut e = Entity::hydrate(
            order(),
            handle,
            row(&[("id", Value::BigInt(5)), ("customer_id", Value::BigInt(1))]),
        );
        e.set("customer_id", 2i64);
        e.save().unwrap();

        let log = conn.log();
        assert_eq!(log.len(), 2);
        assert!(log[0].0.starts_with("UPDATE public.orders SET customer_id = :customer_id_"));
        assert!(log[0].0.ends_with("WHERE (id = :pk_public_orders_id)"));
        assert_eq!(log[0].1.get("pk_public_orders_id"), Some(&Value::BigInt(5)));
        assert!(log[1].0.starts_with("INSERT INTO public.orders (customer_id, id) VALUES"));
    }

    #[test]
    fn update_only_writes_modified_fields() {
        let (conn, handle) = setup();
        conn.reply_affected(1);

        let mut e = Entity::hydrate(
            order(),
            handle,
            row(&[
                ("id", Value::BigInt(5)),
                ("customer_id", Value::BigInt(1)),
                ("status", Value::Text("open".into())),
            ]),
        );
        e.set("status", "closed");
        e.save().unwrap();

        let log = conn.log();
        assert_eq!(log.len(), 1);
        assert!(!log[0].0.contains("customer_id"));
        assert!(log[0].0.contains("SET status = :status_"));
    }

    #[test]
    fn compound_key_always_tries_update() {
        let (conn, handle) = setup();
        conn.reply_affected(1);

        let mut line = Entity::new(&LINE, handle);
        line.set("order_id", 1i64).set("line_no", 2i64).set("qty", 3i64);
        line.save().unwrap();

        let log = conn.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].0.contains(
            "WHERE (order_id = :pk_public_order_lines_order_id) AND (line_no = :pk_public_order_lines_line_no)"
        ));
    }

    #[test]
    fn touch_without_other_changes_updates_key_columns() {
        let (conn, handle) = setup();
        conn.reply_affected(1);
        let mut e = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(9))]));
        e.touch();
        e.save().unwrap();
        assert!(conn.statements()[0].starts_with("UPDATE public.orders SET id = :id_"));
    }

    #[test]
    fn vetoed_save_returns_false() {
        let (conn, handle) = setup();
        let mut e = Entity::new(&GUARDED, handle);
        e.set("name", "x");
        assert!(!e.save().unwrap());
        assert!(conn.statements().is_empty());
        assert!(e.is_dirty());
    }

    #[test]
    fn read_only_rejects_writes() {
        let (_conn, handle) = setup();
        let mut e = Entity::new(&ARCHIVE, handle);
        e.set("id", 1i64);
        assert!(e.save().unwrap_err().is_usage());
        assert!(e.delete(false).unwrap_err().is_usage());
    }

    #[test]
    fn delete_clears_primary_key() {
        let (conn, handle) = setup();
        conn.reply_affected(1);
        conn.reply_affected(1);

        let mut e = Entity::hydrate(order(), handle.clone(), row(&[("id", Value::BigInt(3))]));
        e.delete(false).unwrap();
        assert_eq!(
            conn.statements()[0],
            "DELETE FROM public.orders WHERE (id = :pk_public_orders_id)"
        );
        assert_eq!(e.value("id"), Some(&Value::Null));
        assert!(!e.is_dirty());

        let mut kept = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(4))]));
        kept.delete(true).unwrap();
        assert_eq!(kept.value("id"), Some(&Value::BigInt(4)));
    }

    #[test]
    fn delete_without_key_is_usage_error() {
        let (conn, handle) = setup();
        let mut e = Entity::new(order(), handle);
        assert!(e.delete(false).unwrap_err().is_usage());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn delete_failure_carries_driver_text() {
        let (conn, handle) = setup();
        conn.reply_fail("permission denied for table orders");
        let mut e = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(3))]));
        let err = e.delete(false).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(e.value("id"), Some(&Value::BigInt(3)));
    }

    #[test]
    fn retrieve_binds_every_key_component() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[
            ("order_id", Value::BigInt(1)),
            ("line_no", Value::BigInt(2)),
        ])]);

        let key = KeyValue::record([("order_id", 1i64), ("line_no", 2i64)]);
        let found = Entity::retrieve_by_primary_key(&LINE, handle, key)
            .unwrap()
            .unwrap();
        assert_eq!(found.get_as::<i64>("line_no").unwrap(), 2);

        let (sql, bindings) = &conn.log()[0];
        assert_eq!(
            sql,
            "SELECT * FROM public.order_lines \
             WHERE (public.order_lines.line_no = :public_order_lines_line_no_eq) \
             AND (public.order_lines.order_id = :public_order_lines_order_id_eq)"
        );
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn retrieve_rejects_lists_and_wrong_shapes() {
        let (conn, handle) = setup();
        let err = Entity::retrieve_by_primary_key(order(), handle.clone(), KeyValue::list([1, 2]))
            .unwrap_err();
        assert!(err.is_validation());
        let err = Entity::retrieve_by_primary_key(&LINE, handle, KeyValue::scalar(1)).unwrap_err();
        assert!(err.is_validation());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn retrieve_missing_is_none() {
        let (_conn, handle) = setup();
        let found = Entity::retrieve_by_primary_key(order(), handle, Value::BigInt(99)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn single_association_is_cached() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[
            ("id", Value::BigInt(7)),
            ("name", Value::Text("Ada".into())),
        ])]);

        let mut e = Entity::hydrate(
            order(),
            handle,
            row(&[("id", Value::BigInt(1)), ("customer_id", Value::BigInt(7))]),
        );
        let name = e.one("customer").unwrap().unwrap().get_as::<String>("name").unwrap();
        assert_eq!(name, "Ada");
        assert!(e.one("customer").unwrap().is_some());
        assert_eq!(conn.statements().len(), 1);
        assert!(conn.statements()[0].contains("WHERE (public.customers.id = :public_customers_id_eq)"));
    }

    #[test]
    fn null_foreign_key_resolves_without_query() {
        let (conn, handle) = setup();
        let mut e = Entity::new(order(), handle);
        assert!(e.one("customer").unwrap().is_none());
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn many_association_stays_lazy() {
        let (conn, handle) = setup();
        let mut c = Entity::hydrate(customer(), handle, row(&[("id", Value::BigInt(7))]));
        let orders = c.many("orders").unwrap();
        assert!(conn.statements().is_empty());
        assert_eq!(orders.len().unwrap(), 0);
        assert_eq!(conn.statements().len(), 1);
        assert!(conn.statements()[0].contains("public.orders.customer_id = :public_orders_customer_id_eq"));
    }

    #[test]
    fn unsaved_owner_matches_no_children() {
        let (conn, handle) = setup();
        let mut c = Entity::new(customer(), handle);
        let orders = c.many("orders").unwrap();
        assert_eq!(orders.len().unwrap(), 0);
        assert!(conn.statements()[0].ends_with("WHERE (1 = 0)"));
    }

    #[test]
    fn junction_association_joins_through_table() {
        let (conn, handle) = setup();
        let mut e = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(1))]));
        e.many("tags").unwrap().len().unwrap();
        let sql = &conn.statements()[0];
        assert!(sql.starts_with("SELECT tags.* FROM public.tags"));
        assert!(sql.contains("INNER JOIN public.order_tags ON (public.tags.id = public.order_tags.tag_id)"));
        assert!(sql.contains("INNER JOIN public.orders ON (public.orders.id = public.order_tags.order_id)"));
    }

    #[test]
    fn field_access_variants() {
        let (_conn, handle) = setup();
        let mut e = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(1))]));
        assert_eq!(e.get("id").unwrap().as_value(), Some(&Value::BigInt(1)));
        assert!(e.get("nope").unwrap().is_missing());
        assert!(matches!(e.get("customer").unwrap(), Field::One(None)));
        assert_eq!(e.get_or("status", "new"), Value::Text("new".into()));
        assert!(e.get_as::<i64>("status").is_err());
        assert_eq!(e.get_as::<Option<i64>>("status").unwrap(), None);
    }

    #[test]
    fn set_related_checks_type_and_copies_key() {
        let (_conn, handle) = setup();
        let mut o = Entity::new(order(), handle.clone());
        let t = Entity::new(tag(), handle.clone());
        assert!(o.set_related("customer", t).unwrap_err().is_usage());

        let c = Entity::hydrate(customer(), handle.clone(), row(&[("id", Value::BigInt(7))]));
        o.set_related("customer", c).unwrap();
        assert_eq!(o.value("customer_id"), Some(&Value::BigInt(7)));

        let other = Entity::new(tag(), handle);
        assert!(o.set_related("tags", other).unwrap_err().is_usage());
    }

    #[test]
    fn save_saves_new_parent_first() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[("id", Value::BigInt(70))])]);
        conn.reply_rows(vec![row(&[("id", Value::BigInt(1))])]);

        let mut c = Entity::new(customer(), handle.clone());
        c.set("name", "Ada");
        let mut o = Entity::new(order(), handle);
        o.set("status", "open");
        o.set_related("customer", c).unwrap();
        o.save().unwrap();

        let log = conn.statements();
        assert!(log[0].starts_with("INSERT INTO public.customers"));
        assert!(log[1].starts_with("INSERT INTO public.orders (customer_id, status)"));
        assert_eq!(o.value("customer_id"), Some(&Value::BigInt(70)));
    }

    #[test]
    fn save_pushes_key_into_loaded_children() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[
            ("id", Value::BigInt(11)),
            ("customer_id", Value::BigInt(7)),
        ])]);
        conn.reply_affected(1);

        let mut c = Entity::hydrate(customer(), handle, row(&[("id", Value::BigInt(7))]));
        assert_eq!(c.many("orders").unwrap().len().unwrap(), 1);
        c.set("id", 8i64);
        c.save().unwrap();

        let orders = c.many("orders").unwrap();
        let child = orders.get(0).unwrap().unwrap();
        assert_eq!(child.value("customer_id"), Some(&Value::BigInt(8)));
        assert!(child.is_dirty());

        let log = conn.log();
        assert_eq!(log.len(), 2);
        assert!(log[1].0.starts_with("UPDATE public.customers SET id = :id_"));
        assert_eq!(log[1].1.get("pk_public_customers_id"), Some(&Value::BigInt(7)));
    }

    #[test]
    fn changed_key_is_matched_by_its_stored_value() {
        let (conn, handle) = setup();
        conn.reply_affected(1);
        let mut e = Entity::hydrate(
            order(),
            handle,
            row(&[("id", Value::BigInt(1)), ("status", Value::Text("open".into()))]),
        );
        e.set("id", 100i64);
        e.save().unwrap();

        let log = conn.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].0.starts_with("UPDATE public.orders SET id = :id_"));
        assert!(log[0].0.ends_with("WHERE (id = :pk_public_orders_id)"));
        assert_eq!(log[0].1.get("pk_public_orders_id"), Some(&Value::BigInt(1)));

        // the new key is the stored one from now on
        e.delete(false).unwrap();
        assert_eq!(conn.log()[1].1.get("pk_public_orders_id"), Some(&Value::BigInt(100)));
    }

    #[test]
    fn unsaved_key_change_deletes_the_stored_row() {
        let (conn, handle) = setup();
        let mut e = Entity::hydrate(order(), handle, row(&[("id", Value::BigInt(4))]));
        e.set("id", 5i64);
        e.delete(false).unwrap();
        assert_eq!(conn.log()[0].1.get("pk_public_orders_id"), Some(&Value::BigInt(4)));
    }

    #[test]
    fn changing_foreign_key_drops_cached_parent() {
        let (conn, handle) = setup();
        conn.reply_rows(vec![row(&[("id", Value::BigInt(7))])]);
        conn.reply_rows(vec![row(&[("id", Value::BigInt(9))])]);

        let mut o = Entity::hydrate(
            order(),
            handle,
            row(&[("id", Value::BigInt(1)), ("customer_id", Value::BigInt(7))]),
        );
        assert!(o.one("customer").unwrap().is_some());
        o.set("customer_id", 9i64);
        let parent = o.one("customer").unwrap().unwrap();
        assert_eq!(parent.value("id"), Some(&Value::BigInt(9)));
        assert_eq!(conn.statements().len(), 2);
    }

    #[test]
    fn set_data_and_unset() {
        let (_conn, handle) = setup();
        let mut e = Entity::new(order(), handle);
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), Value::BigInt(1));
        data.insert("status".to_string(), Value::Text("open".into()));
        e.set_data(data.clone(), false);
        assert!(!e.is_dirty());
        e.set_data(data, true);
        assert_eq!(e.modified().len(), 2);
        assert_eq!(e.unset("status"), Some(Value::Text("open".into())));
        assert!(!e.contains("status"));
        assert_eq!(e.len(), 1);
        assert_eq!(e.iter().count(), 1);
        assert_eq!(e.to_json(), serde_json::json!({"id": 1}));
    }
}
