// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    fn fail(message: String) -> Result<()> {
        Err(ConfigError::ValidationError(message))
    }

    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Self::fail(format!("{} cannot be empty", field));
        }
        Ok(())
    }

    /// Validate that a number is within `min..=max`
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Self::fail(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            ));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Self::fail(format!(
                "{} must be one of [{}], got {}",
                field,
                allowed.join(", "),
                value
            ));
        }
        Ok(())
    }

    /// Validate URL scheme
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        let rest = value
            .strip_prefix("http://")
            .or_else(|| value.strip_prefix("https://"));
        match rest {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Self::fail(format!("{} must be an http(s) URL", field)),
        }
    }

    /// Validate a URL path pattern: absolute, no whitespace
    pub fn is_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') || value.chars().any(char::is_whitespace) {
            return Self::fail(format!("{} must be an absolute path without spaces", field));
        }
        Ok(())
    }

    /// Validate port number
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Self::fail(format!("{} must be a valid port number", field));
        }
        Ok(())
    }
}
