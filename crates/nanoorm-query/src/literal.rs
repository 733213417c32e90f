//! Values assigned through `set()`: bound parameters or raw SQL.

use nanoorm_core::Value;
use std::fmt;

/// Raw SQL inlined verbatim into a statement, such as `NOW()` or
/// `counter + 1`.
///
/// Nothing is escaped. Only build these from trusted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    /// Wrap a raw SQL expression.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// The raw SQL text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`SqlLiteral::new`].
pub fn literal(sql: impl Into<String>) -> SqlLiteral {
    SqlLiteral::new(sql)
}

/// A value on the right-hand side of an INSERT/UPDATE assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Bound through a generated `:placeholder`.
    Bound(Value),
    /// Inlined as-is.
    Raw(SqlLiteral),
}

macro_rules! bound_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Bound(value.into())
                }
            }
        )*
    };
}

bound_from!(Value, bool, i32, i64, u32, f64, String, &str, &String, Vec<u8>, &[u8]);

impl<T: Into<Value>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        SqlValue::Bound(value.into())
    }
}

impl From<SqlLiteral> for SqlValue {
    fn from(value: SqlLiteral) -> Self {
        SqlValue::Raw(value)
    }
}
