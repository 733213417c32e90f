//! SELECT statement builder.

use crate::clause::{
    IntoConditions, IntoProjections, OrderBy, Projection, format_conditions, render_projections,
};
use crate::statement::Statement;
use nanoorm_core::{Bindings, Result, Value};
use std::fmt;

/// A SELECT statement builder.
///
/// Clauses render in a fixed order: select list, FROM, JOINs, WHERE,
/// GROUP BY, HAVING, ORDER BY, OFFSET, LIMIT. Empty clauses are omitted.
/// Elements can be added but never removed.
#[derive(Debug, Clone, Default)]
pub struct Select {
    /// Select list (empty = `*`)
    columns: Vec<Projection>,
    /// FROM list
    from: Vec<Projection>,
    /// JOIN fragments keyed by alias, in insertion order
    joins: Vec<(String, String)>,
    /// WHERE groups, ANDed together
    where_clause: Vec<String>,
    /// GROUP BY expressions
    group_by: Vec<String>,
    /// HAVING groups, ANDed together
    having: Vec<String>,
    /// ORDER BY items, deduplicated
    order_by: Vec<String>,
    offset: Option<u64>,
    limit: Option<u64>,
    bindings: Bindings,
}

impl Select {
    /// Create an empty SELECT.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the select list.
    pub fn select(mut self, items: impl IntoProjections) -> Self {
        self.columns.extend(items.into_projections());
        self
    }

    /// Whether an explicit select list was given.
    pub fn has_projection(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Append to the FROM list.
    pub fn from(mut self, items: impl IntoProjections) -> Self {
        self.from.extend(items.into_projections());
        self
    }

    /// Append a parenthesized subquery to the FROM list and adopt its bindings.
    pub fn from_subquery(mut self, subquery: &Select, alias: impl Into<String>) -> Self {
        self.from.push(Projection::aliased(
            format!("({})", subquery.render()),
            alias,
        ));
        self.bindings.merge(subquery.bindings());
        self
    }

    /// Whether anything was added to FROM.
    pub fn has_from(&self) -> bool {
        !self.from.is_empty()
    }

    /// Add a JOIN fragment keyed by its own text.
    pub fn join(self, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        self.join_keyed(sql.clone(), sql)
    }

    /// Add a JOIN fragment under `key`. A second fragment with the same key
    /// replaces the first in place.
    pub fn join_keyed(mut self, key: impl Into<String>, sql: impl Into<String>) -> Self {
        let key = key.into();
        let sql = sql.into();
        if let Some(slot) = self.joins.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = sql;
        } else {
            self.joins.push((key, sql));
        }
        self
    }

    /// Add an AND-joined WHERE group.
    pub fn filter(mut self, conds: impl IntoConditions) -> Self {
        if let Some(group) = format_conditions(conds.into_conditions(), "AND") {
            self.where_clause.push(group);
        }
        self
    }

    /// Add an OR-joined WHERE group.
    pub fn or_filter(mut self, conds: impl IntoConditions) -> Self {
        if let Some(group) = format_conditions(conds.into_conditions(), "OR") {
            self.where_clause.push(group);
        }
        self
    }

    /// Add GROUP BY expressions.
    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    /// Add an AND-joined HAVING group.
    pub fn having(mut self, conds: impl IntoConditions) -> Self {
        if let Some(group) = format_conditions(conds.into_conditions(), "AND") {
            self.having.push(group);
        }
        self
    }

    /// Add an OR-joined HAVING group.
    pub fn or_having(mut self, conds: impl IntoConditions) -> Self {
        if let Some(group) = format_conditions(conds.into_conditions(), "OR") {
            self.having.push(group);
        }
        self
    }

    /// Add a raw ORDER BY expression. Duplicates are ignored.
    pub fn order(mut self, by: impl Into<String>) -> Self {
        let by = by.into();
        if !self.order_by.contains(&by) {
            self.order_by.push(by);
        }
        self
    }

    /// Add an ORDER BY item.
    pub fn order_by(self, order: &OrderBy) -> Self {
        self.order(order.to_sql())
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name, value);
        self
    }

    /// Bind several named parameters.
    pub fn bind_all<N, V>(mut self, values: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<Value>,
    {
        self.bindings.extend(values);
        self
    }

    /// Render the SQL text.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(10);

        if self.columns.is_empty() {
            parts.push("SELECT *".to_string());
        } else {
            parts.push(format!("SELECT {}", render_projections(&self.columns)));
        }

        if !self.from.is_empty() {
            parts.push(format!("FROM {}", render_projections(&self.from)));
        }

        for (_, join) in &self.joins {
            parts.push(join.clone());
        }

        if !self.where_clause.is_empty() {
            parts.push(format!("WHERE {}", self.where_clause.join(" AND ")));
        }

        if !self.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }

        if !self.having.is_empty() {
            parts.push(format!("HAVING {}", self.having.join(" AND ")));
        }

        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }

        if let Some(n) = self.offset {
            parts.push(format!("OFFSET {}", n));
        }

        if let Some(n) = self.limit {
            parts.push(format!("LIMIT {}", n));
        }

        parts.join(" ")
    }
}

impl Statement for Select {
    fn to_sql(&self) -> Result<String> {
        Ok(self.render())
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
