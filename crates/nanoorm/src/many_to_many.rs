//! Filtering one side of a many-to-many association by the other.
//!
//! Given entity types A (local) and B (foreign) linked through a junction
//! table, the resolver produces B's collection restricted to rows linked to
//! the given A keys, to the given B keys, or both.
//!
//! ```rust,ignore
//! let mut tags = ManyToMany::new(
//!     order_meta(), Key::scalar("id"),
//!     tag_meta(), Key::scalar("id"),
//!     "public.order_tags", Key::scalar("order_id"), Key::scalar("tag_id"),
//!     handle,
//! )?;
//! tags.filter_my_records(KeyValue::list([1, 2]))?;
//! for tag in tags.collection().iter()? { /* ... */ }
//! ```

use crate::collection::Collection;
use crate::key::{Key, KeyValue, Record};
use crate::meta::EntityMeta;
use nanoorm_core::{Error, Handle, Result, Value, quote_identifier, sanitize_identifier};
use nanoorm_query::{Select, unique_suffix};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Resolver state shared with the collection's external filter.
struct Resolver {
    local_meta: &'static EntityMeta,
    local_key: Key,
    foreign_meta: &'static EntityMeta,
    foreign_key: Key,
    junction_table: String,
    junction_local: Key,
    junction_foreign: Key,
    my_values: Option<KeyValue>,
    foreign_values: Option<KeyValue>,
}

/// Many-to-many resolver producing the foreign side's collection.
pub struct ManyToMany {
    state: Rc<RefCell<Resolver>>,
    handle: Handle,
    collection: Option<Collection>,
}

impl ManyToMany {
    /// Describe the association. Each junction key must have as many
    /// columns as the entity key it points at.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_meta: &'static EntityMeta,
        local_key: impl Into<Key>,
        foreign_meta: &'static EntityMeta,
        foreign_key: impl Into<Key>,
        junction_table: impl Into<String>,
        junction_local: impl Into<Key>,
        junction_foreign: impl Into<Key>,
        handle: Handle,
    ) -> Result<Self> {
        let local_key = local_key.into();
        let foreign_key = foreign_key.into();
        let junction_local = junction_local.into();
        let junction_foreign = junction_foreign.into();
        let junction_table = junction_table.into();

        if junction_local.len() != local_key.len() || junction_foreign.len() != foreign_key.len() {
            return Err(Error::usage(format!(
                "junction {} columns do not line up with the keys they reference",
                junction_table
            )));
        }

        Ok(Self {
            state: Rc::new(RefCell::new(Resolver {
                local_meta,
                local_key,
                foreign_meta,
                foreign_key,
                junction_table,
                junction_local,
                junction_foreign,
                my_values: None,
                foreign_values: None,
            })),
            handle,
            collection: None,
        })
    }

    /// Keep foreign rows linked to these local key values.
    ///
    /// Nothing changes when `values` does not fit the local key.
    pub fn filter_my_records(&mut self, values: impl Into<KeyValue>) -> Result<&mut Self> {
        let values = values.into();
        {
            let mut state = self.state.borrow_mut();
            state.local_key.validate(&values)?;
            state.my_values = Some(values);
        }
        self.touch_collection();
        Ok(self)
    }

    /// Keep foreign rows with these key values.
    pub fn filter_foreign_records(&mut self, values: impl Into<KeyValue>) -> Result<&mut Self> {
        let values = values.into();
        {
            let mut state = self.state.borrow_mut();
            state.foreign_key.validate(&values)?;
            state.foreign_values = Some(values);
        }
        self.touch_collection();
        Ok(self)
    }

    /// The foreign collection, built on first call.
    pub fn collection(&mut self) -> &mut Collection {
        let Self {
            state,
            handle,
            collection,
        } = self;
        collection.get_or_insert_with(|| build_collection(state, handle))
    }

    pub fn into_collection(self) -> Collection {
        match self.collection {
            Some(collection) => collection,
            None => build_collection(&self.state, &self.handle),
        }
    }

    fn touch_collection(&mut self) {
        if let Some(collection) = &mut self.collection {
            collection.invalidate();
        }
    }
}

impl fmt::Debug for ManyToMany {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManyToMany")
            .field("local", &state.local_meta.qualified_table())
            .field("foreign", &state.foreign_meta.qualified_table())
            .field("junction", &state.junction_table)
            .field("my_values", &state.my_values)
            .field("foreign_values", &state.foreign_values)
            .finish()
    }
}

fn build_collection(state: &Rc<RefCell<Resolver>>, handle: &Handle) -> Collection {
    let foreign_meta = state.borrow().foreign_meta;
    let mut collection = Collection::new(foreign_meta, handle.clone());
    let state = Rc::clone(state);
    collection.filter_external(move |select| state.borrow().apply(select));
    collection
}

impl Resolver {
    /// Add joins and predicates for whichever sides have values.
    fn apply(&self, mut select: Select) -> Result<Select> {
        if let Some(values) = &self.my_values {
            select = self.join_through_junction(select);
            select = key_predicate(select, self.local_meta, &self.local_key, values);
        }
        if let Some(values) = &self.foreign_values {
            select = key_predicate(select, self.foreign_meta, &self.foreign_key, values);
        }
        Ok(select)
    }

    fn join_through_junction(&self, select: Select) -> Select {
        let junction = quote_identifier(&self.junction_table);
        let junction_column =
            |column: &str| quote_identifier(&format!("{}.{}", self.junction_table, column));

        let to_foreign: Vec<String> = self
            .foreign_key
            .fields()
            .into_iter()
            .zip(self.junction_foreign.fields())
            .map(|(key, column)| {
                format!("{} = {}", self.foreign_meta.qualify(key), junction_column(column))
            })
            .collect();
        let to_local: Vec<String> = self
            .local_key
            .fields()
            .into_iter()
            .zip(self.junction_local.fields())
            .map(|(key, column)| {
                format!("{} = {}", self.local_meta.qualify(key), junction_column(column))
            })
            .collect();

        let local_table = self.local_meta.qualified_table();
        let mut select = select
            .join_keyed(
                format!("mtm junction {}", self.junction_table),
                format!("INNER JOIN {} ON {}", junction, and_group(&to_foreign)),
            )
            .join_keyed(
                format!("mtm local {}", local_table),
                format!(
                    "INNER JOIN {} ON {}",
                    quote_identifier(&local_table),
                    and_group(&to_local)
                ),
            );
        if !select.has_projection() {
            select = select.select(format!("{}.*", quote_identifier(self.foreign_meta.table())));
        }
        select
    }
}

/// `(a) AND (b)`.
fn and_group(conditions: &[String]) -> String {
    conditions
        .iter()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Binds values under a prefix that is fresh for every assembly.
struct Binder {
    prefix: String,
    bindings: Vec<(String, Value)>,
}

impl Binder {
    fn new(meta: &EntityMeta) -> Self {
        Self {
            prefix: format!(
                "mtm_{}_{}",
                unique_suffix(),
                sanitize_identifier(&format!("{}_{}", meta.schema(), meta.table()))
            ),
            bindings: Vec::new(),
        }
    }

    fn bind(&mut self, field: &str, index: usize, value: &Value) -> String {
        let name = format!("{}_{}_{}", self.prefix, sanitize_identifier(field), index);
        let placeholder = format!(":{}", name);
        self.bindings.push((name, value.clone()));
        placeholder
    }

    fn record(&mut self, meta: &EntityMeta, key: &Key, record: &Record, index: usize) -> String {
        let conditions: Vec<String> = key
            .fields()
            .into_iter()
            .map(|field| {
                let value = record.get(field).unwrap_or(&Value::Null);
                format!("{} = {}", meta.qualify(field), self.bind(field, index, value))
            })
            .collect();
        and_group(&conditions)
    }
}

/// Restrict `meta`'s key columns to `values`.
fn key_predicate(select: Select, meta: &EntityMeta, key: &Key, values: &KeyValue) -> Select {
    let mut binder = Binder::new(meta);
    let scalar_field = key.fields().first().copied().unwrap_or_default();

    let condition = match values {
        KeyValue::Scalar(value) => format!(
            "{} = {}",
            meta.qualify(scalar_field),
            binder.bind(scalar_field, 0, value)
        ),
        KeyValue::ScalarList(list) if list.is_empty() => "1 = 0".to_string(),
        KeyValue::ScalarList(list) => {
            let placeholders: Vec<String> = list
                .iter()
                .enumerate()
                .map(|(i, value)| binder.bind(scalar_field, i, value))
                .collect();
            format!("{} IN ({})", meta.qualify(scalar_field), placeholders.join(", "))
        }
        KeyValue::Record(record) => binder.record(meta, key, record, 0),
        KeyValue::RecordList(records) if records.is_empty() => "1 = 0".to_string(),
        KeyValue::RecordList(records) => records
            .iter()
            .enumerate()
            .map(|(i, record)| format!("({})", binder.record(meta, key, record, i)))
            .collect::<Vec<_>>()
            .join(" OR "),
    };

    tracing::trace!(condition = %condition, bindings = binder.bindings.len(), "many-to-many predicate");
    select.filter(condition).bind_all(binder.bindings)
}
