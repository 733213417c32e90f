//! The common statement interface.

use nanoorm_core::{Bindings, Connection, Result, Row};

/// A renderable statement with named parameters.
///
/// Rendering borrows the statement, so serializing twice yields the same
/// text and never touches the bindings.
pub trait Statement {
    /// Render the SQL text.
    fn to_sql(&self) -> Result<String>;

    /// The named parameters referenced by the SQL text.
    fn bindings(&self) -> &Bindings;

    /// Execute and collect every produced row.
    fn fetch(&self, conn: &dyn Connection) -> Result<Vec<Row>> {
        let sql = self.to_sql()?;
        tracing::debug!(sql = %sql, params = self.bindings().len(), "query");
        let rows = conn.query(&sql, self.bindings())?;
        tracing::trace!(rows = rows.len(), "query done");
        Ok(rows)
    }

    /// Execute and return the affected row count.
    fn run(&self, conn: &dyn Connection) -> Result<u64> {
        let sql = self.to_sql()?;
        tracing::debug!(sql = %sql, params = self.bindings().len(), "execute");
        let affected = conn.execute(&sql, self.bindings())?;
        tracing::trace!(affected, "execute done");
        Ok(affected)
    }
}
