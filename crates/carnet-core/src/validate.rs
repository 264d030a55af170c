//! Field-level validation with error accumulation.
//!
//! Validators collect every violated constraint rather than stopping at the
//! first, so a caller fixing a form can correct all fields in one round trip.

use serde::Serialize;
use std::fmt;

/// Maximum length for name/title columns.
pub const MAX_NAME_LEN: usize = 255;

/// A single violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field the constraint applies to. `"base"` for record-level rules.
    pub field: &'static str,
    pub message: String,
}

/// Accumulated validation failures for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// A single-violation error, for rules checked outside a [`Validator`]
    /// pass (uniqueness mapped from database constraints, record-level
    /// ceilings).
    pub fn of(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field,
                message: message.into(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// True when some violation was recorded against `field`.
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Builder that accumulates constraint violations for one record.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arbitrary violation.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Value must be present and non-blank.
    pub fn require(&mut self, field: &'static str, value: Option<&str>) {
        match value {
            Some(v) if !v.trim().is_empty() => {}
            _ => self.add(field, "can't be blank"),
        }
    }

    /// Value, when present, must not exceed `max` characters.
    pub fn max_len(&mut self, field: &'static str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.add(field, format!("is too long (maximum is {} characters)", max));
            }
        }
    }

    /// Consume the validator; `Err` carries every recorded violation.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_record_passes() {
        let mut v = Validator::new();
        v.require("name", Some("groceries"));
        v.max_len("name", Some("groceries"), MAX_NAME_LEN);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn blank_and_missing_both_fail_presence() {
        let mut v = Validator::new();
        v.require("name", Some("   "));
        let errs = v.finish().unwrap_err();
        assert!(errs.has("name"));

        let mut v = Validator::new();
        v.require("name", None);
        assert!(v.finish().is_err());
    }

    #[test]
    fn violations_accumulate_across_fields() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let mut v = Validator::new();
        v.require("name", None);
        v.max_len("title", Some(&long), MAX_NAME_LEN);
        let errs = v.finish().unwrap_err();
        assert_eq!(errs.errors().len(), 2);
        assert!(errs.has("name"));
        assert!(errs.has("title"));
    }

    #[test]
    fn max_len_counts_chars_not_bytes() {
        // 255 multibyte chars is exactly at the limit
        let at_limit = "あ".repeat(MAX_NAME_LEN);
        let mut v = Validator::new();
        v.max_len("title", Some(&at_limit), MAX_NAME_LEN);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn display_joins_field_messages() {
        let mut v = Validator::new();
        v.require("name", None);
        v.add("base", "record is frozen");
        let errs = v.finish().unwrap_err();
        let s = errs.to_string();
        assert!(s.contains("name can't be blank"));
        assert!(s.contains("base record is frozen"));
    }
}
