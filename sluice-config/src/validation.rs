// Settings validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating settings.
pub trait Validate {
    /// Check every field, failing on the first bad one.
    fn validate(&self) -> Result<()>;
}

/// Field-level validation rules.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty.
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a list has at least one entry.
    pub fn not_empty_list<T>(values: &[T], field: &str) -> Result<()> {
        if values.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} needs at least one entry",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range, bounds included.
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate an http(s) URL.
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "{} must be an http or https URL, got '{}'",
                field, value
            )));
        }
        Ok(())
    }

    /// Validate an HTTP status code.
    pub fn is_status(value: u16, field: &str) -> Result<()> {
        Self::in_range(value, 100, 599, field)
    }
}
