//! Request payload validation.
//!
//! Schemas are `'static` descriptors and [`validate`] is a pure function of
//! a schema and a JSON value, so it can be called from any task without a
//! shared validator instance.
//!
//! ```
//! use serde_json::json;
//! use signup_server::validation::{Field, Rule, Schema, validate};
//!
//! const LOGIN: Schema = Schema {
//!     fields: &[
//!         Field::new("email", &[Rule::Required, Rule::Email]),
//!         Field::new("password", &[Rule::Required, Rule::Length { min: 6, max: 128 }]),
//!     ],
//! };
//!
//! assert!(validate(&LOGIN, &json!({"email": "a@x.com", "password": "secret123"})).is_ok());
//! assert!(validate(&LOGIN, &json!({"email": "a@x.com", "password": "short"})).is_err());
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use signup_core::Email;

/// A single constraint on a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Present, not null and not an empty string.
    Required,
    /// A string that parses as an email address.
    Email,
    /// A string whose length in characters lies in `min..=max`.
    Length { min: usize, max: usize },
    /// A whole number.
    Integer,
    /// A number in `min..=max`.
    Range { min: f64, max: f64 },
    /// A string equal to one of the listed values.
    OneOf(&'static [&'static str]),
}

/// Rules for one field, addressed by a dotted path (`personal.age`).
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub path: &'static str,
    pub rules: &'static [Rule],
}

impl Field {
    #[must_use]
    pub const fn new(path: &'static str, rules: &'static [Rule]) -> Self {
        Self { path, rules }
    }
}

/// Validation schema for a request payload.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [Field],
}

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Every constraint a payload broke, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// A single failure for `field`.
    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self(vec![FieldError {
            field,
            message: message.into(),
        }])
    }

    /// The individual failures.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Returns true if `field` failed at least one rule.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Look up a dotted path inside a JSON value.
fn lookup<'v>(payload: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(payload, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

fn is_blank(value: &Value) -> bool {
    value.as_str().is_some_and(str::is_empty)
}

/// Check one rule against a present value; returns the failure message.
fn check(rule: Rule, value: &Value) -> Option<String> {
    match rule {
        Rule::Required => is_blank(value).then(|| "is required".to_owned()),
        Rule::Email => match value.as_str() {
            Some(raw) => Email::parse(raw).err().map(|e| e.to_string()),
            None => Some("must be a string".to_owned()),
        },
        Rule::Length { min, max } => match value.as_str() {
            Some(raw) => {
                let length = raw.chars().count();
                (length < min || length > max)
                    .then(|| format!("must be between {min} and {max} characters"))
            }
            None => Some("must be a string".to_owned()),
        },
        Rule::Integer => (!(value.is_i64() || value.is_u64()))
            .then(|| "must be a whole number".to_owned()),
        Rule::Range { min, max } => match value.as_f64() {
            Some(number) => {
                (number < min || number > max).then(|| format!("must be between {min} and {max}"))
            }
            None => Some("must be a number".to_owned()),
        },
        Rule::OneOf(allowed) => match value.as_str() {
            Some(raw) if allowed.contains(&raw) => None,
            _ => Some(format!("must be one of: {}", allowed.join(", "))),
        },
    }
}

/// Validate `payload` against `schema`.
///
/// A missing or null field only fails [`Rule::Required`]; its other rules
/// are skipped, so optional fields are expressed by leaving `Required` out.
///
/// # Errors
///
/// Returns every broken constraint if any field fails.
pub fn validate(schema: &Schema, payload: &Value) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    for field in schema.fields {
        let Some(value) = lookup(payload, field.path) else {
            if field.rules.contains(&Rule::Required) {
                errors.push(FieldError {
                    field: field.path,
                    message: "is required".to_owned(),
                });
            }
            continue;
        };

        // First failure per field only.
        if let Some(message) = field.rules.iter().find_map(|rule| check(*rule, value)) {
            errors.push(FieldError {
                field: field.path,
                message,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

/// A request body with a validation schema.
pub trait Payload: Serialize {
    /// Constraints every instance must satisfy.
    const SCHEMA: Schema;

    /// Validate this payload against [`Self::SCHEMA`].
    ///
    /// # Errors
    ///
    /// Returns every broken constraint.
    fn validate(&self) -> Result<(), ValidationErrors> {
        let value = serde_json::to_value(self).map_err(|e| {
            ValidationErrors(vec![FieldError {
                field: "body",
                message: e.to_string(),
            }])
        })?;
        validate(&Self::SCHEMA, &value)
    }
}
