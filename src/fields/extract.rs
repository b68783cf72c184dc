//! Field resolution and form projection

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::map::{FieldMap, FormFieldMap, NESTED_CONTAINERS};
use super::NormalizedRecord;

/// Destination for resolved values, addressed by element id
pub trait FormSink {
    fn set_value(&mut self, element_id: &str, value: &str);
}

impl FormSink for HashMap<String, String> {
    fn set_value(&mut self, element_id: &str, value: &str) {
        self.insert(element_id.to_string(), value.to_string());
    }
}

impl FormSink for BTreeMap<String, String> {
    fn set_value(&mut self, element_id: &str, value: &str) {
        self.insert(element_id.to_string(), value.to_string());
    }
}

/// Renders a resolved value the way a text input would hold it
///
/// Strings are used verbatim, `null` becomes empty and everything else is
/// written as JSON.
pub fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolves canonical invoice fields from loosely structured payloads
///
/// Lookup order is strict: the top level of the payload first, then each
/// nested container in priority order. A container may hold an object or a
/// JSON-encoded string of one, and only fills fields that are still missing.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    map: FieldMap,
    containers: Vec<String>,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(FieldMap::default())
    }
}

impl FieldResolver {
    /// Creates a resolver for `map` searching the standard nested containers
    pub fn new(map: FieldMap) -> Self {
        Self {
            map,
            containers: NESTED_CONTAINERS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Replaces the nested container keys (highest priority first)
    pub fn with_containers<I, S>(mut self, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containers = containers.into_iter().map(Into::into).collect();
        self
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.map
    }

    /// Extracts a normalized record from `input`
    ///
    /// Any present value counts as found, including `0`, `""` and `null`. A
    /// nested string that is not valid JSON is logged and skipped. Input that
    /// is not an object yields an empty record.
    pub fn extract(&self, input: &Value) -> NormalizedRecord {
        let mut record = NormalizedRecord::new();

        let Some(object) = input.as_object() else {
            error!("No invoice object provided to extract fields from");
            return record;
        };

        self.resolve_missing(object, &mut record);

        for container in &self.containers {
            match object.get(container) {
                Some(Value::Object(nested)) => self.resolve_missing(nested, &mut record),
                Some(Value::String(encoded)) if !encoded.is_empty() => {
                    match serde_json::from_str::<Value>(encoded) {
                        Ok(Value::Object(parsed)) => self.resolve_missing(&parsed, &mut record),
                        Ok(_) => {
                            debug!(container = %container, "Nested JSON is not an object, skipping")
                        }
                        Err(e) => warn!(
                            container = %container,
                            error = %e,
                            "Failed to parse JSON string in field"
                        ),
                    }
                }
                _ => {}
            }
        }

        record
    }

    /// Extracts a record from `input` and writes every bound field into `sink`
    ///
    /// Returns the record so callers can use it independently of the form.
    pub fn fill_form<S: FormSink + ?Sized>(
        &self,
        sink: &mut S,
        form_fields: &FormFieldMap,
        input: &Value,
    ) -> NormalizedRecord {
        let record = self.extract(input);

        for (element_id, field) in form_fields.iter() {
            if let Some(value) = record.get(field) {
                sink.set_value(element_id, &form_value(value));
            }
        }

        record
    }

    fn resolve_missing(&self, source: &Map<String, Value>, record: &mut NormalizedRecord) {
        for rule in self.map.iter() {
            if record.contains(&rule.target) {
                continue;
            }
            if let Some(value) = rule.sources.iter().find_map(|name| source.get(name)) {
                record.insert(rule.target.clone(), value.clone());
            }
        }
    }
}

/// Extracts a normalized invoice record from `input`
///
/// `None` uses the built-in invoice mapping. An explicitly empty map resolves
/// no fields.
pub fn extract_invoice_data(input: &Value, field_map: Option<&FieldMap>) -> NormalizedRecord {
    match field_map {
        Some(map) => FieldResolver::new(map.clone()).extract(input),
        None => FieldResolver::default().extract(input),
    }
}

/// Fills `sink` from `input` using the built-in invoice mapping
pub fn fill_invoice_form<S: FormSink + ?Sized>(
    sink: &mut S,
    form_fields: &FormFieldMap,
    input: &Value,
) -> NormalizedRecord {
    FieldResolver::default().fill_form(sink, form_fields, input)
}
