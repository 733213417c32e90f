//! SQL identifier quoting and sanitization utilities.
//!
//! Generated SQL uses ANSI double-quoted identifiers. Plain names such as
//! `orders` or `public.orders.id` pass through untouched so statements stay
//! readable; anything else is quoted part by part.

use regex::Regex;
use std::sync::OnceLock;

/// Matches identifiers that cannot be emitted bare: a leading character that
/// is not a letter or underscore, or any character outside `[A-Za-z0-9_.]`.
const NEEDS_QUOTING: &str = r"^[^A-Za-z_]|[^A-Za-z0-9_.]";

fn needs_quoting_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    match RE.get_or_init(|| Regex::new(NEEDS_QUOTING)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "identifier pattern failed to compile, quoting everything");
            None
        }
    }
}

/// Quote a SQL identifier using ANSI double-quoting, unconditionally.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use nanoorm_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an identifier only when it needs it.
///
/// Once a name needs quoting, a qualified name is split on `.` and every
/// part is quoted; parts that already arrive wrapped in double quotes are
/// left alone.
///
/// ```
/// use nanoorm_core::quote_identifier;
///
/// assert_eq!(quote_identifier("public.orders"), "public.orders");
/// assert_eq!(quote_identifier("order items"), "\"order items\"");
/// assert_eq!(quote_identifier("public.order-lines.id"), "\"public\".\"order-lines\".\"id\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    if !needs_quoting_regex().is_none_or(|re| re.is_match(name)) {
        return name.to_string();
    }
    name.split('.')
        .map(quote_part)
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_part(part: &str) -> String {
    if is_quoted(part) {
        part.to_string()
    } else {
        quote_ident(part)
    }
}

fn is_quoted(part: &str) -> bool {
    part.len() >= 2 && part.starts_with('"') && part.ends_with('"')
}

/// Sanitize a string into a bind-parameter-safe fragment.
///
/// Every character outside `[A-Za-z0-9_]` becomes an underscore, so
/// `public.orders.id` turns into `public_orders_id`.
///
/// ```
/// use nanoorm_core::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("public.orders.id"), "public_orders_id");
/// assert_eq!(sanitize_identifier("user;DROP"), "user_DROP");
/// ```
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
