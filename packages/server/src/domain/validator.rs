//! Field validation that collects one message per failing field.

use std::collections::BTreeMap;

/// Accumulates field errors; the first failure recorded for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    field_errors: BTreeMap<&'static str, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_field(&mut self, ok: bool, field: &'static str, message: impl Into<String>) {
        if !ok {
            self.field_errors.entry(field).or_insert_with(|| message.into());
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.field_errors.is_empty()
    }

    /// Failing fields in field-name order.
    pub fn into_errors(self) -> Vec<(&'static str, String)> {
        self.field_errors.into_iter().collect()
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn max_runes(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}
