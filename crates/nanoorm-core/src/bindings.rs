//! Named parameter bindings.

use crate::value::Value;

/// An insertion-ordered map of named parameters.
///
/// Names are stored without the leading colon; SQL text refers to binding
/// `name` as `:name`. Re-binding a name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `name`. A leading `:` on the name is ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = normalize(name.into());
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a binding by name, with or without the leading `:`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Check whether a name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Iterate over bound names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Merge another binding set into this one; later values win.
    pub fn merge(&mut self, other: &Bindings) {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        bindings.extend(iter);
        bindings
    }
}

impl<N: Into<String>, V: Into<Value>> Extend<(N, V)> for Bindings {
    fn extend<I: IntoIterator<Item = (N, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

fn normalize(name: String) -> String {
    match name.strip_prefix(':') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_replaces_in_place() {
        let mut b = Bindings::new();
        b.insert("a", 1i64);
        b.insert("b", 2i64);
        b.insert("a", 3i64);
        assert_eq!(b.len(), 2);
        assert_eq!(b.get("a"), Some(&Value::BigInt(3)));
        assert_eq!(b.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn leading_colon_is_ignored() {
        let mut b = Bindings::new();
        b.insert(":status_eq", "open");
        assert!(b.contains("status_eq"));
        assert_eq!(b.get(":status_eq"), Some(&Value::Text("open".into())));
    }

    #[test]
    fn merge_and_collect() {
        let mut a: Bindings = [("x", 1i64)].into_iter().collect();
        let b: Bindings = [("x", 2i64), ("y", 3i64)].into_iter().collect();
        a.merge(&b);
        assert_eq!(a.get("x"), Some(&Value::BigInt(2)));
        assert_eq!(a.len(), 2);
    }
}
