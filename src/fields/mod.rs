//! Invoice field normalization
//!
//! Invoice payloads arrive in many shapes: flat API records, records with a
//! nested `data` object, records whose extracted data is a JSON-encoded string,
//! and records using German labels. This module resolves them into one
//! [`NormalizedRecord`] keyed by canonical field names, projects that record
//! onto form fields, and canonicalizes the invoice date.

pub mod extract;
pub mod map;
pub mod validate;

pub use extract::{extract_invoice_data, fill_invoice_form, form_value, FieldResolver, FormSink};
pub use map::{FieldMap, FieldRule, FormFieldMap, CANONICAL_FIELDS, NESTED_CONTAINERS};
pub use validate::{parse_invoice_date, validate_invoice_data};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical field name to resolved value
///
/// Only fields that were actually found are present; nothing is defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The value of `field` as a string, if it is one
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl FromIterator<(String, Value)> for NormalizedRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
