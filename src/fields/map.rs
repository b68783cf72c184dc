//! Field name mappings
//!
//! Upstream payloads label invoice attributes inconsistently: English API
//! names, German labels from the extraction prompt, legacy aliases. A
//! [`FieldMap`] lists, per canonical field, the source names to try in order.

use serde::{Deserialize, Serialize};

pub const SUPPLIER_NAME: &str = "supplier_name";
pub const COMPANY_NAME: &str = "company_name";
pub const INVOICE_NUMBER: &str = "invoice_number";
pub const INVOICE_DATE: &str = "invoice_date";
pub const AMOUNT_ORIGINAL: &str = "amount_original";
pub const VAT_AMOUNT_ORIGINAL: &str = "vat_amount_original";
pub const DESCRIPTION: &str = "description";
pub const FILE_PATH: &str = "file_path";

/// Canonical invoice fields in display order
pub const CANONICAL_FIELDS: [&str; 8] = [
    SUPPLIER_NAME,
    COMPANY_NAME,
    INVOICE_NUMBER,
    INVOICE_DATE,
    AMOUNT_ORIGINAL,
    VAT_AMOUNT_ORIGINAL,
    DESCRIPTION,
    FILE_PATH,
];

/// Nested container keys searched after the top level, in priority order
pub const NESTED_CONTAINERS: [&str; 3] = ["invoice_data", "data", "extracted_data"];

/// One canonical field and the source names that may carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub target: String,
    pub sources: Vec<String>,
}

/// Ordered mapping from canonical field to candidate source names
///
/// The first candidate present in a payload wins. [`FieldMap::default`] is the
/// built-in invoice mapping; [`FieldMap::new`] is empty and resolves nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    rules: Vec<FieldRule>,
}

impl FieldMap {
    /// Creates an empty mapping
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in invoice mapping (English names first, then German labels)
    pub fn invoice_defaults() -> Self {
        Self::new()
            .with_field(SUPPLIER_NAME, [SUPPLIER_NAME, "Lieferantename"])
            .with_field(COMPANY_NAME, [COMPANY_NAME, "Empfängerfirma"])
            .with_field(INVOICE_NUMBER, [INVOICE_NUMBER, "Rechnungsnummer"])
            .with_field(INVOICE_DATE, [INVOICE_DATE, "Rechnungsdatum"])
            .with_field(AMOUNT_ORIGINAL, [AMOUNT_ORIGINAL, "amount", "Gesamtbetrag"])
            .with_field(
                VAT_AMOUNT_ORIGINAL,
                [VAT_AMOUNT_ORIGINAL, "vat_amount", "Mehrwertsteuerbetrag"],
            )
            .with_field(DESCRIPTION, [DESCRIPTION, "Leistungsbeschreibung"])
            .with_field(FILE_PATH, [FILE_PATH, "original_path"])
    }

    /// Appends a rule, or replaces the sources of an existing target in place
    pub fn with_field<I, S>(mut self, target: &str, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        match self.rules.iter_mut().find(|rule| rule.target == target) {
            Some(rule) => rule.sources = sources,
            None => self.rules.push(FieldRule {
                target: target.to_string(),
                sources,
            }),
        }
        self
    }

    /// Candidate source names for `target`
    pub fn sources(&self, target: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|rule| rule.target == target)
            .map(|rule| rule.sources.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::invoice_defaults()
    }
}

/// Mapping from form element id to canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFieldMap {
    bindings: Vec<(String, String)>,
}

impl FormFieldMap {
    /// Creates an empty mapping
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// The invoice edit form's element ids (`supplier-name`, `invoice-date`, ...)
    pub fn invoice_form() -> Self {
        CANONICAL_FIELDS
            .iter()
            .fold(Self::new(), |map, field| map.bind(&field.replace('_', "-"), field))
    }

    /// Binds `element_id` to `field`
    pub fn bind(mut self, element_id: &str, field: &str) -> Self {
        self.bindings
            .push((element_id.to_string(), field.to_string()));
        self
    }

    /// `(element_id, canonical_field)` pairs in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(id, field)| (id.as_str(), field.as_str()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for FormFieldMap {
    fn default() -> Self {
        Self::invoice_form()
    }
}
