//! Validation Results
//!
//! The shape shared by page `validate` hooks and external validators
//! (branch names, tags, commit messages). Validators are plain functions;
//! the framework only looks at the result.

use serde::{Deserialize, Serialize};

/// Outcome of a validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the value passed
    pub is_valid: bool,
    /// Human-readable reasons, empty when valid
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationResult {
    /// A passing result
    #[must_use]
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result with one reason
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![message.into()],
        }
    }

    /// Valid exactly when `errors` is empty
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Combine two results; the merge is valid only if both are
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self
    }

    /// Run every validator against `value` and merge the results
    pub fn all<T: ?Sized>(value: &T, validators: &[&dyn Fn(&T) -> ValidationResult]) -> Self {
        validators
            .iter()
            .fold(Self::ok(), |acc, validate| acc.and(validate(value)))
    }

    /// Convert into a `Result`, joining the reasons with `"; "`
    pub fn into_result(self) -> Result<(), String> {
        if self.is_valid {
            Ok(())
        } else if self.errors.is_empty() {
            Err("validation failed".to_string())
        } else {
            Err(self.errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_empty(s: &str) -> ValidationResult {
        if s.is_empty() {
            ValidationResult::error("must not be empty")
        } else {
            ValidationResult::ok()
        }
    }

    fn lowercase(s: &str) -> ValidationResult {
        if s.chars().any(char::is_uppercase) {
            ValidationResult::error("must be lowercase")
        } else {
            ValidationResult::ok()
        }
    }

    #[test]
    fn test_all_collects_every_error() {
        let result = ValidationResult::all("Feature/X", &[&not_empty, &lowercase]);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["must be lowercase"]);

        assert!(ValidationResult::all("feature/x", &[&not_empty, &lowercase]).is_valid);
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ValidationResult::ok().into_result(), Ok(()));
        let failed = ValidationResult::from_errors(vec!["a".into(), "b".into()]);
        assert_eq!(failed.into_result(), Err("a; b".to_string()));
    }

    #[test]
    fn test_deserializes_without_errors_field() {
        let parsed: ValidationResult = serde_json::from_str(r#"{"is_valid": true}"#).unwrap();
        assert_eq!(parsed, ValidationResult::ok());
    }
}
