//! INSERT, UPDATE and DELETE statement builders.
//!
//! Table and column names go through [`quote_identifier`]. Values assigned
//! with `set` are either bound under a fresh placeholder or, for
//! [`SqlValue::Raw`], inlined verbatim.

use crate::clause::{
    IntoConditions, IntoProjections, Projection, format_conditions, render_projections,
};
use crate::literal::SqlValue;
use crate::placeholder::placeholder_for;
use crate::statement::Statement;
use nanoorm_core::{Bindings, Error, Result, Value, quote_identifier};

/// Turn one assignment into its right-hand side SQL, binding it if needed.
fn assign(bindings: &mut Bindings, column: &str, value: SqlValue) -> String {
    match value {
        SqlValue::Raw(sql) => sql.as_str().to_string(),
        SqlValue::Bound(value) => {
            let name = placeholder_for(column);
            let rendered = format!(":{}", name);
            bindings.insert(name, value);
            rendered
        }
    }
}

/// Record `column = rhs`, replacing an earlier assignment to the same column.
fn upsert_assignment(assignments: &mut Vec<(String, String)>, column: String, rhs: String) {
    if let Some(slot) = assignments.iter_mut().find(|(c, _)| *c == column) {
        slot.1 = rhs;
    } else {
        assignments.push((column, rhs));
    }
}

fn require_table<'a>(table: &'a str, kind: &str) -> Result<&'a str> {
    if table.is_empty() {
        return Err(Error::usage(format!("{} statement must contain a table", kind)));
    }
    Ok(table)
}

/// An INSERT statement builder.
#[derive(Debug, Clone, Default)]
pub struct Insert {
    table: String,
    /// (column, rendered value) in assignment order
    values: Vec<(String, String)>,
    returning: Vec<Projection>,
    bindings: Bindings,
}

impl Insert {
    /// Create an INSERT into `table`.
    pub fn into_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set (or replace) the target table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Assign several columns.
    pub fn set<C, V>(mut self, values: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        for (column, value) in values {
            let column = column.into();
            let rhs = assign(&mut self.bindings, &column, value.into());
            upsert_assignment(&mut self.values, column, rhs);
        }
        self
    }

    /// Assign one column.
    pub fn value(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set([(column.into(), value.into())])
    }

    /// Append to the RETURNING list.
    pub fn returning(mut self, items: impl IntoProjections) -> Self {
        self.returning.extend(items.into_projections());
        self
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name, value);
        self
    }

    /// Number of assigned columns.
    pub fn column_count(&self) -> usize {
        self.values.len()
    }
}

impl Statement for Insert {
    fn to_sql(&self) -> Result<String> {
        let table = quote_identifier(require_table(&self.table, "INSERT")?);
        let mut sql = if self.values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns: Vec<String> = self
                .values
                .iter()
                .map(|(c, _)| quote_identifier(c))
                .collect();
            let values: Vec<&str> = self.values.iter().map(|(_, v)| v.as_str()).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                values.join(", ")
            )
        };
        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&render_projections(&self.returning));
        }
        Ok(sql)
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// An UPDATE statement builder.
#[derive(Debug, Clone, Default)]
pub struct Update {
    table: String,
    only: bool,
    /// (column, rendered value) in assignment order
    values: Vec<(String, String)>,
    from: Vec<Projection>,
    where_clause: Vec<String>,
    returning: Vec<Projection>,
    bindings: Bindings,
}

impl Update {
    /// Create an UPDATE of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Restrict the update to the named table, excluding inheriting tables.
    pub fn only(mut self, only: bool) -> Self {
        self.only = only;
        self
    }

    /// Assign several columns.
    pub fn set<C, V>(mut self, values: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        for (column, value) in values {
            let column = column.into();
            let rhs = assign(&mut self.bindings, &column, value.into());
            upsert_assignment(&mut self.values, column, rhs);
        }
        self
    }

    /// Assign one column.
    pub fn value(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set([(column.into(), value.into())])
    }

    /// Append to the FROM list.
    pub fn from(mut self, items: impl IntoProjections) -> Self {
        self.from.extend(items.into_projections());
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

    /// Append to the RETURNING list.
    pub fn returning(mut self, items: impl IntoProjections) -> Self {
        self.returning.extend(items.into_projections());
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

    /// Number of assigned columns.
    pub fn column_count(&self) -> usize {
        self.values.len()
    }
}

impl Statement for Update {
    fn to_sql(&self) -> Result<String> {
        let table = quote_identifier(require_table(&self.table, "UPDATE")?);
        if self.values.is_empty() {
            return Err(Error::usage("UPDATE statement must set at least one column"));
        }

        let mut sql = String::from("UPDATE ");
        if self.only {
            sql.push_str("ONLY ");
        }
        sql.push_str(&table);
        sql.push_str(" SET ");
        let assignments: Vec<String> = self
            .values
            .iter()
            .map(|(c, v)| format!("{} = {}", quote_identifier(c), v))
            .collect();
        sql.push_str(&assignments.join(", "));

        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&render_projections(&self.from));
        }
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.join(" AND "));
        }
        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&render_projections(&self.returning));
        }
        Ok(sql)
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

/// A DELETE statement builder.
#[derive(Debug, Clone, Default)]
pub struct Delete {
    table: String,
    where_clause: Vec<String>,
    bindings: Bindings,
}

impl Delete {
    /// Create a DELETE from `table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
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
}

impl Statement for Delete {
    fn to_sql(&self) -> Result<String> {
        let table = quote_identifier(require_table(&self.table, "DELETE")?);
        let mut sql = format!("DELETE FROM {}", table);
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.join(" AND "));
        }
        Ok(sql)
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}
