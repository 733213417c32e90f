//! Clause fragments shared by every statement kind: conditions,
//! projections (`expr AS alias`) and ORDER BY items.

use nanoorm_core::quote_identifier;

/// Anything that can be turned into a list of SQL conditions.
///
/// One call to `filter`/`or_filter`/`having`/`or_having` takes one of these;
/// every condition is parenthesized before joining.
pub trait IntoConditions {
    fn into_conditions(self) -> Vec<String>;
}

impl IntoConditions for &str {
    fn into_conditions(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoConditions for String {
    fn into_conditions(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoConditions for &String {
    fn into_conditions(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<T: Into<String>> IntoConditions for Vec<T> {
    fn into_conditions(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<String>, const N: usize> IntoConditions for [T; N] {
    fn into_conditions(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Wrap each condition in parentheses and join with `op`.
///
/// Groups are ANDed with each other, so a multi-condition OR group is
/// wrapped once more to keep it together. Returns `None` for an empty list
/// so callers can skip the clause.
pub(crate) fn format_conditions(conds: Vec<String>, op: &str) -> Option<String> {
    if conds.is_empty() {
        return None;
    }
    let count = conds.len();
    let joined = conds
        .iter()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(&format!(" {} ", op));
    if count > 1 && op != "AND" {
        Some(format!("({})", joined))
    } else {
        Some(joined)
    }
}

/// One item of a select list, FROM list or RETURNING list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    expr: String,
    alias: Option<String>,
}

impl Projection {
    /// A positional item, rendered as-is.
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: None,
        }
    }

    /// An aliased item, rendered `expr AS alias` unless both are equal.
    pub fn aliased(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: Some(alias.into()),
        }
    }

    /// The expression part.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Render this item.
    pub fn to_sql(&self) -> String {
        match &self.alias {
            Some(alias) if *alias != self.expr => {
                format!("{} AS {}", self.expr, quote_identifier(alias))
            }
            _ => self.expr.clone(),
        }
    }
}

impl From<&str> for Projection {
    fn from(expr: &str) -> Self {
        Projection::new(expr)
    }
}

impl From<String> for Projection {
    fn from(expr: String) -> Self {
        Projection::new(expr)
    }
}

/// `(expression, alias)`
impl<E: Into<String>, A: Into<String>> From<(E, A)> for Projection {
    fn from((expr, alias): (E, A)) -> Self {
        Projection::aliased(expr, alias)
    }
}

/// Anything that can be appended to a projection list.
pub trait IntoProjections {
    fn into_projections(self) -> Vec<Projection>;
}

impl IntoProjections for &str {
    fn into_projections(self) -> Vec<Projection> {
        vec![Projection::new(self)]
    }
}

impl IntoProjections for String {
    fn into_projections(self) -> Vec<Projection> {
        vec![Projection::new(self)]
    }
}

impl IntoProjections for Projection {
    fn into_projections(self) -> Vec<Projection> {
        vec![self]
    }
}

impl<P: Into<Projection>> IntoProjections for Vec<P> {
    fn into_projections(self) -> Vec<Projection> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<P: Into<Projection>, const N: usize> IntoProjections for [P; N] {
    fn into_projections(self) -> Vec<Projection> {
        self.into_iter().map(Into::into).collect()
    }
}

pub(crate) fn render_projections(items: &[Projection]) -> String {
    items
        .iter()
        .map(Projection::to_sql)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// No explicit direction; the store default applies.
    #[default]
    Unspecified,
    Asc,
    Desc,
}

/// ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: OrderDirection,
}

impl OrderBy {
    /// Order by `column` without an explicit direction.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Unspecified,
        }
    }

    /// Create an ascending order by clause.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order by clause.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// The ordered column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The direction.
    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    /// Generate SQL for this ORDER BY item.
    pub fn to_sql(&self) -> String {
        let column = quote_identifier(&self.column);
        match self.direction {
            OrderDirection::Unspecified => column,
            OrderDirection::Asc => format!("{} ASC", column),
            OrderDirection::Desc => format!("{} DESC", column),
        }
    }
}
