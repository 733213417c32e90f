//! Lazy, filter-composed result sets.
//!
//! Filters only record intent. The first read after a filter change
//! assembles the statement from every contributor, runs it once, and
//! hydrates the rows:
//!
//! ```rust,ignore
//! let mut open = Collection::new(order_meta(), handle);
//! open.filter_any_field_eq("status", "open")
//!     .filter_offset(10)
//!     .filter_limit(5);
//!
//! for order in open.iter()? {
//!     println!("{:?}", order.value("id"));
//! }
//! let total = open.total_rows()?;
//! ```
//!
//! # Pagination
//!
//! With an offset or limit set, a cursor-capable connection runs the
//! statement once through a server-side cursor: it skips `offset` rows,
//! fetches `limit` rows, then counts the rest, so the total match count
//! costs no second query. Connections without cursors page in memory.

use crate::entity::Entity;
use crate::key::KeyValue;
use crate::meta::EntityMeta;
use nanoorm_core::{
    Bindings, Connection, Error, Handle, Pagination, Result, Row, ValidationError,
    ValidationErrorKind, Value, quote_identifier, sanitize_identifier,
};
use nanoorm_query::{OrderBy, Select, Statement, unique_suffix};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// A caller-supplied statement mutator.
pub type ExternalFilter = Rc<dyn Fn(Select) -> Result<Select>>;

/// A contributor backed by the recorded filters.
type Builtin = fn(&EntityMeta, &Filters, Select) -> Result<Select>;

/// Applied before entity-registered contributors.
const HEAD: [(&str, Builtin); 3] = [
    ("table_name", contribute_table_name),
    ("any_field_eq", contribute_any_field_eq),
    ("any_field_not_eq", contribute_any_field_not_eq),
];

/// Applied after entity-registered contributors.
const TAIL: [(&str, Builtin); 2] = [
    ("order_field", contribute_order_field),
    ("external", contribute_external),
];

/// Filter values recorded on a collection.
#[derive(Clone, Default)]
pub struct Filters {
    any_field_eq: BTreeMap<String, Value>,
    any_field_ne: BTreeMap<String, Value>,
    order: Vec<OrderBy>,
    offset: Option<u64>,
    limit: Option<u64>,
    externals: Vec<ExternalFilter>,
    custom: BTreeMap<String, KeyValue>,
}

impl Filters {
    pub fn any_field_eq(&self) -> &BTreeMap<String, Value> {
        &self.any_field_eq
    }

    pub fn any_field_not_eq(&self) -> &BTreeMap<String, Value> {
        &self.any_field_ne
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// The value recorded through `filter_by(name, ..)`.
    pub fn custom(&self, name: &str) -> Option<&KeyValue> {
        self.custom.get(name)
    }

    pub fn is_paginated(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filters")
            .field("any_field_eq", &self.any_field_eq)
            .field("any_field_ne", &self.any_field_ne)
            .field("order", &self.order)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("externals", &self.externals.len())
            .field("custom", &self.custom)
            .finish()
    }
}

/// A lazily executed set of entities of one type.
#[derive(Clone)]
pub struct Collection {
    meta: &'static EntityMeta,
    handle: Handle,
    filters: Filters,
    items: Vec<Entity>,
    total_rows: u64,
    dirty: bool,
}

impl Collection {
    /// An unfiltered collection of every row of `meta`'s table.
    pub fn new(meta: &'static EntityMeta, handle: Handle) -> Self {
        Self {
            meta,
            handle,
            filters: Filters::default(),
            items: Vec::new(),
            total_rows: 0,
            dirty: true,
        }
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Only rows where `field` equals `value`. NULL matches NULL.
    pub fn filter_any_field_eq(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.filters.any_field_eq.insert(field.into(), value.into());
        self.invalidate()
    }

    /// Only rows where `field` differs from `value`.
    pub fn filter_any_field_not_eq(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.filters.any_field_ne.insert(field.into(), value.into());
        self.invalidate()
    }

    /// Replace the ordering.
    pub fn filter_order_field(&mut self, order: impl IntoIterator<Item = OrderBy>) -> &mut Self {
        self.filters.order = order.into_iter().collect();
        self.invalidate()
    }

    pub fn filter_offset(&mut self, offset: u64) -> &mut Self {
        self.filters.offset = Some(offset);
        self.invalidate()
    }

    pub fn filter_limit(&mut self, limit: u64) -> &mut Self {
        self.filters.limit = Some(limit);
        self.invalidate()
    }

    /// Register a statement mutator. Mutators run in registration order,
    /// after every other contributor. An `Err` aborts the load.
    pub fn filter_external<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(Select) -> Result<Select> + 'static,
    {
        self.filters.externals.push(Rc::new(filter));
        self.invalidate()
    }

    /// Record a value for the contributor registered under `name`.
    pub fn filter_by(&mut self, name: impl Into<String>, values: impl Into<KeyValue>) -> &mut Self {
        self.filters.custom.insert(name.into(), values.into());
        self.invalidate()
    }

    /// Force the next read to execute again.
    pub fn invalidate(&mut self) -> &mut Self {
        self.dirty = true;
        self
    }

    pub fn is_loaded(&self) -> bool {
        !self.dirty
    }

    /// Assemble the statement this collection would execute, without the
    /// page window.
    pub fn statement(&self) -> Result<Select> {
        let meta = self.meta;
        if let Some(name) = self
            .filters
            .custom
            .keys()
            .find(|name| meta.contributor(name).is_none())
        {
            return Err(Error::Validation(ValidationError::single(
                name.clone(),
                ValidationErrorKind::InvalidStatement,
                format!(
                    "no contributor named `{}` is registered for {}",
                    name,
                    meta.qualified_table()
                ),
            )));
        }

        let mut select = meta.base_statement();
        for (name, contribute) in HEAD {
            tracing::trace!(contributor = name, "applying filter contribution");
            select = contribute(meta, &self.filters, select)?;
        }
        for (name, contribute) in meta.contributors() {
            tracing::trace!(contributor = %name, "applying filter contribution");
            select = contribute(meta, self.filters.custom.get(name), select)?;
        }
        for (name, contribute) in TAIL {
            tracing::trace!(contributor = name, "applying filter contribution");
            select = contribute(meta, &self.filters, select)?;
        }
        Ok(select)
    }

    /// Execute the statement if any filter changed since the last load.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.meta.qualified_table()))]
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let select = self.statement()?;
        let conn = self.handle.as_ref();

        let (rows, total) = if !self.filters.is_paginated() {
            let rows = select.fetch(conn)?;
            let total = rows.len() as u64;
            (rows, total)
        } else {
            match conn.dialect().pagination() {
                Pagination::Cursor => {
                    page_with_cursor(conn, &select, self.filters.offset, self.filters.limit)?
                }
                Pagination::Buffered => {
                    page_in_memory(conn, &select, self.filters.offset, self.filters.limit)?
                }
            }
        };
        tracing::debug!(items = rows.len(), total, "collection loaded");

        let meta = self.meta;
        self.items = rows
            .into_iter()
            .map(|row| Entity::hydrate(meta, self.handle.clone(), row))
            .collect();
        self.total_rows = total;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.items.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.items.is_empty())
    }

    pub fn get(&mut self, index: usize) -> Result<Option<&Entity>> {
        self.ensure_loaded()?;
        Ok(self.items.get(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<Option<&mut Entity>> {
        self.ensure_loaded()?;
        Ok(self.items.get_mut(index))
    }

    pub fn first(&mut self) -> Result<Option<&Entity>> {
        self.get(0)
    }

    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, Entity>> {
        self.ensure_loaded()?;
        Ok(self.items.iter())
    }

    pub fn iter_mut(&mut self) -> Result<std::slice::IterMut<'_, Entity>> {
        self.ensure_loaded()?;
        Ok(self.items.iter_mut())
    }

    pub fn items(&mut self) -> Result<&[Entity]> {
        self.ensure_loaded()?;
        Ok(&self.items)
    }

    pub fn contains_index(&mut self, index: usize) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(index < self.items.len())
    }

    /// Rows matching the filters, ignoring offset and limit.
    pub fn total_rows(&mut self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.total_rows)
    }

    pub fn into_items(mut self) -> Result<Vec<Entity>> {
        self.ensure_loaded()?;
        Ok(self.items)
    }

    /// Items from the last load; empty if the collection is dirty.
    pub fn loaded_items(&self) -> &[Entity] {
        if self.dirty { &[] } else { &self.items }
    }

    pub fn loaded_items_mut(&mut self) -> &mut [Entity] {
        if self.dirty {
            &mut self.items[..0]
        } else {
            &mut self.items
        }
    }

    pub(crate) fn items_vec_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.items
    }

    /// Always fails: base collections are read-only.
    pub fn replace(&mut self, _index: usize, _entity: Entity) -> Result<()> {
        self.ensure_loaded()?;
        Err(Error::usage("collections are read-only"))
    }

    /// Always fails: base collections are read-only.
    pub fn remove(&mut self, _index: usize) -> Result<()> {
        self.ensure_loaded()?;
        Err(Error::usage("collections are read-only"))
    }

    /// Save every materialized item inside one transaction.
    ///
    /// The first failure rolls the transaction back and is returned. Inside
    /// a transaction the caller already opened, items are saved in it and
    /// the caller keeps control of commit and rollback.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.meta.qualified_table(), items = self.items.len()))]
    pub fn save(&mut self) -> Result<()> {
        let handle = self.handle.clone();
        let outer = handle.in_transaction();
        if !outer {
            handle.begin()?;
        }

        let result = self
            .items
            .iter_mut()
            .try_for_each(|item| item.save().map(drop));

        match result {
            Ok(()) => {
                if !outer {
                    handle.commit()?;
                }
                Ok(())
            }
            Err(e) => {
                if !outer {
                    if let Err(rollback) = handle.rollback() {
                        tracing::warn!(error = %rollback, "rollback after failed batch save also failed");
                    }
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("table", &self.meta.qualified_table())
            .field("filters", &self.filters)
            .field("items", &self.items.len())
            .field("total_rows", &self.total_rows)
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn contribute_table_name(meta: &EntityMeta, _: &Filters, select: Select) -> Result<Select> {
    if select.has_from() {
        return Ok(select);
    }
    Ok(select.from(quote_identifier(&meta.qualified_table())))
}

fn contribute_any_field_eq(_: &EntityMeta, filters: &Filters, select: Select) -> Result<Select> {
    Ok(field_predicates(select, &filters.any_field_eq, "=", "IS NULL", "eq"))
}

fn contribute_any_field_not_eq(
    _: &EntityMeta,
    filters: &Filters,
    select: Select,
) -> Result<Select> {
    Ok(field_predicates(select, &filters.any_field_ne, "<>", "IS NOT NULL", "ne"))
}

/// One `field <op> :<field>_<suffix>` predicate per recorded field.
///
/// Fields that sanitize to the same name (`a.b` and `a_b`) get a numbered
/// name after the first, so neither binding is overwritten.
fn field_predicates(
    mut select: Select,
    fields: &BTreeMap<String, Value>,
    op: &str,
    null_test: &str,
    suffix: &str,
) -> Select {
    let mut used = HashSet::new();
    for (field, value) in fields {
        let column = quote_identifier(field);
        if value.is_null() {
            select = select.filter(format!("{} {}", column, null_test));
            continue;
        }
        let base = format!("{}_{}", sanitize_identifier(field), suffix);
        let mut name = base.clone();
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        tracing::trace!(bind = %name, "field predicate");
        select = select
            .filter(format!("{} {} :{}", column, op, name))
            .bind(name, value.clone());
    }
    select
}

fn contribute_order_field(_: &EntityMeta, filters: &Filters, mut select: Select) -> Result<Select> {
    for order in &filters.order {
        select = select.order_by(order);
    }
    Ok(select)
}

fn contribute_external(_: &EntityMeta, filters: &Filters, mut select: Select) -> Result<Select> {
    for filter in &filters.externals {
        select = filter(select)?;
    }
    Ok(select)
}

/// Page through a server-side cursor inside a read-only transaction.
///
/// Returns the page and the total match count. The cursor is released by
/// rolling the transaction back, or by closing it when the caller already
/// had a transaction open.
fn page_with_cursor(
    conn: &dyn Connection,
    select: &Select,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Result<(Vec<Row>, u64)> {
    let cursor = format!("nanoorm_page_{}", unique_suffix());
    let outer = conn.in_transaction();
    if !outer {
        conn.begin()?;
    }

    let page = read_cursor(conn, &cursor, select, offset, limit);

    let released = if outer {
        conn.execute(&format!("CLOSE {}", cursor), &Bindings::new())
            .map(drop)
    } else {
        conn.rollback()
    };

    match (page, released) {
        (Ok(page), Ok(())) => Ok(page),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release)) => {
            tracing::warn!(cursor = %cursor, error = %release, "failed to release pagination cursor");
            Err(e)
        }
    }
}

fn read_cursor(
    conn: &dyn Connection,
    cursor: &str,
    select: &Select,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Result<(Vec<Row>, u64)> {
    let none = Bindings::new();

    let declare = format!("DECLARE {} CURSOR FOR {}", cursor, select.to_sql()?);
    tracing::debug!(sql = %declare, params = select.bindings().len(), "declare cursor");
    conn.execute(&declare, select.bindings())?;

    let skipped = match offset {
        Some(n) if n > 0 => conn.execute(&format!("MOVE FORWARD {} IN {}", n, cursor), &none)?,
        _ => 0,
    };

    // FETCH 0 re-reads the current row, so an empty page skips the fetch.
    let rows = match limit {
        Some(0) => Vec::new(),
        Some(n) => conn.query(&format!("FETCH {} FROM {}", n, cursor), &none)?,
        None => conn.query(&format!("FETCH ALL FROM {}", cursor), &none)?,
    };

    let remaining = conn.execute(&format!("MOVE FORWARD ALL IN {}", cursor), &none)?;
    let total = skipped + rows.len() as u64 + remaining;
    tracing::trace!(skipped, fetched = rows.len(), remaining, "cursor drained");
    Ok((rows, total))
}

/// Execute once and cut the page out of the full result.
fn page_in_memory(
    conn: &dyn Connection,
    select: &Select,
    offset: Option<u64>,
    limit: Option<u64>,
) -> Result<(Vec<Row>, u64)> {
    let rows = select.fetch(conn)?;
    let total = rows.len() as u64;
    let skip = usize::try_from(offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let page = rows.into_iter().skip(skip).take(take).collect();
    Ok((page, total))
}
