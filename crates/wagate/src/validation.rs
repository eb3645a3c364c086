//! Declarative field-presence rules for request bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Message reported for a field that fails its rule.
pub const INVALID_VALUE: &str = "Invalid value";

/// A single presence rule on a top-level body field.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: &'static str,
    pub required: bool,
}

impl Rule {
    pub const fn required(field: &'static str) -> Self {
        Self {
            field,
            required: true,
        }
    }
}

/// Field name to human-readable error, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Check `body` against every rule. All rules are evaluated so the caller
/// gets the full set of failing fields at once.
pub fn validate(body: &Value, rules: &[Rule]) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    for rule in rules {
        if rule.required && is_empty(body.get(rule.field)) {
            errors.insert(rule.field, INVALID_VALUE);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Read a field as text. Numbers and booleans are stringified the way a
/// form-encoded body would have carried them.
pub fn field_str(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`field_str`], but a field that is present yet not text-like (an
/// object, say) is reported the same way a missing one is.
pub fn require_str(body: &Value, field: &str) -> Result<String, FieldErrors> {
    field_str(body, field).ok_or_else(|| FieldErrors::single(field, INVALID_VALUE))
}

// ============================================================================
// Tests
// ============================================================================
