//! Key shapes and the values supplied against them.
//!
//! A key is either one field or an ordered set of fields. Values filtered
//! against a key must have the matching shape: scalars for a scalar key,
//! records with exactly the key's field names for a compound key.

use nanoorm_core::{Error, Result, ValidationError, ValidationErrorKind, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Field name → value, used for compound key values.
pub type Record = BTreeMap<String, Value>;

/// A primary or foreign key description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A single field.
    Scalar(String),
    /// An ordered set of fields.
    Compound(Vec<String>),
}

impl Key {
    /// A single-field key.
    pub fn scalar(field: impl Into<String>) -> Self {
        Key::Scalar(field.into())
    }

    /// A compound key. A single field collapses into [`Key::Scalar`].
    pub fn compound<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.len() == 1 {
            Key::Scalar(fields.remove(0))
        } else {
            Key::Compound(fields)
        }
    }

    /// Whether this key spans several fields.
    pub fn is_compound(&self) -> bool {
        matches!(self, Key::Compound(_))
    }

    /// The key's field names, in order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Key::Scalar(f) => vec![f.as_str()],
            Key::Compound(fs) => fs.iter().map(String::as_str).collect(),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        match self {
            Key::Scalar(_) => 1,
            Key::Compound(fs) => fs.len(),
        }
    }

    /// Whether the key names no field at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `field` is part of this key.
    pub fn contains(&self, field: &str) -> bool {
        match self {
            Key::Scalar(f) => f == field,
            Key::Compound(fs) => fs.iter().any(|f| f == field),
        }
    }

    /// Check that `values` has a shape this key accepts.
    ///
    /// Every offending position is reported, e.g. `values[2]`.
    pub fn validate(&self, values: &KeyValue) -> Result<()> {
        let mut errors = ValidationError::new();
        match (self, values) {
            (Key::Scalar(_), KeyValue::Scalar(_) | KeyValue::ScalarList(_)) => {}
            (Key::Scalar(f), KeyValue::Record(_)) => errors.add(
                "values",
                ValidationErrorKind::ScalarExpected,
                format!("key `{}` is scalar but a record was given", f),
            ),
            (Key::Scalar(f), KeyValue::RecordList(records)) => {
                if records.is_empty() {
                    errors.add(
                        "values",
                        ValidationErrorKind::ScalarExpected,
                        format!("key `{}` is scalar but a record list was given", f),
                    );
                }
                for i in 0..records.len() {
                    errors.add(
                        format!("values[{}]", i),
                        ValidationErrorKind::ScalarExpected,
                        format!("a scalar was expected for key `{}`", f),
                    );
                }
            }
            (Key::Compound(_), KeyValue::Scalar(_)) => errors.add(
                "values",
                ValidationErrorKind::RecordExpected,
                "the key is compound but a scalar was given",
            ),
            (Key::Compound(_), KeyValue::ScalarList(items)) => {
                if items.is_empty() {
                    errors.add(
                        "values",
                        ValidationErrorKind::RecordExpected,
                        "the key is compound but a scalar list was given",
                    );
                }
                for i in 0..items.len() {
                    errors.add(
                        format!("values[{}]", i),
                        ValidationErrorKind::RecordExpected,
                        "a record was expected for a compound key",
                    );
                }
            }
            (Key::Compound(fields), KeyValue::Record(record)) => {
                if !same_fields(fields, record) {
                    errors.add(
                        "values",
                        ValidationErrorKind::FieldMismatch,
                        mismatch_message(fields, record),
                    );
                }
            }
            (Key::Compound(fields), KeyValue::RecordList(records)) => {
                for (i, record) in records.iter().enumerate() {
                    if !same_fields(fields, record) {
                        errors.add(
                            format!("values[{}]", i),
                            ValidationErrorKind::FieldMismatch,
                            mismatch_message(fields, record),
                        );
                    }
                }
            }
        }
        errors.into_result().map_err(Error::Validation)
    }
}

fn same_fields(fields: &[String], record: &Record) -> bool {
    let wanted: BTreeSet<&str> = fields.iter().map(String::as_str).collect();
    let given: BTreeSet<&str> = record.keys().map(String::as_str).collect();
    wanted == given
}

fn mismatch_message(fields: &[String], record: &Record) -> String {
    let given: Vec<&str> = record.keys().map(String::as_str).collect();
    format!(
        "record fields [{}] do not match key fields [{}]",
        given.join(", "),
        fields.join(", ")
    )
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Scalar(field.to_string())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Scalar(field)
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    fn from(fields: [&str; N]) -> Self {
        Key::compound(fields)
    }
}

impl From<Vec<String>> for Key {
    fn from(fields: Vec<String>) -> Self {
        Key::compound(fields)
    }
}

/// Values supplied against a [`Key`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// One value for a scalar key.
    Scalar(Value),
    /// Any of several values for a scalar key.
    ScalarList(Vec<Value>),
    /// One value per field of a compound key.
    Record(Record),
    /// Any of several compound key values.
    RecordList(Vec<Record>),
}

impl KeyValue {
    /// A single scalar.
    pub fn scalar(value: impl Into<Value>) -> Self {
        KeyValue::Scalar(value.into())
    }

    /// A list of scalars.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        KeyValue::ScalarList(values.into_iter().map(Into::into).collect())
    }

    /// A single record.
    pub fn record<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        KeyValue::Record(make_record(pairs))
    }

    /// A list of records.
    pub fn records(records: impl IntoIterator<Item = Record>) -> Self {
        KeyValue::RecordList(records.into_iter().collect())
    }

    /// An empty list of the shape `key` accepts; it matches nothing.
    pub fn none_for(key: &Key) -> Self {
        match key {
            Key::Scalar(_) => KeyValue::ScalarList(Vec::new()),
            Key::Compound(_) => KeyValue::RecordList(Vec::new()),
        }
    }

    /// The value of `field` in a single-valued key value.
    ///
    /// A scalar answers for any field name; a record answers for its own
    /// fields. Lists answer nothing.
    pub fn field(&self, field: &str) -> Option<&Value> {
        match self {
            KeyValue::Scalar(v) => Some(v),
            KeyValue::Record(r) => r.get(field),
            KeyValue::ScalarList(_) | KeyValue::RecordList(_) => None,
        }
    }
}

impl From<Value> for KeyValue {
    fn from(value: Value) -> Self {
        KeyValue::Scalar(value)
    }
}

impl From<Record> for KeyValue {
    fn from(record: Record) -> Self {
        KeyValue::Record(record)
    }
}

/// Build a [`Record`] from `(field, value)` pairs.
pub fn make_record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
