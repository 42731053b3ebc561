//! Field validation errors.
//!
//! All problems in a request are collected and reported together.

use std::fmt;

#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} must not be empty", label))
    }

    pub fn wrong_type(field: &str, expected: &str) -> Self {
        Self::new(field, format!("must be {}", expected))
    }

    pub fn invalid_contract_type(field: &str, value: &str) -> Self {
        Self::new(field, format!("contract type '{}' is not valid", value))
            .with_suggestion("Use 1-16 letters, digits or dashes, for example: ABS")
    }

    pub fn invalid_amount(field: &str, value: &str) -> Self {
        Self::new(field, format!("'{}' is not a valid amount", value))
            .with_suggestion("Use digits with an optional decimal point, for example: 1250000.50")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// One message listing every problem.
    pub fn to_message(&self) -> String {
        let details: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        format!(
            "Validation failed with {} error(s): {}",
            self.errors.len(),
            details.join("; ")
        )
    }

    /// Ok if no errors, Err with the combined message otherwise.
    pub fn into_result(self) -> Result<(), String> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.to_message())
        }
    }
}
