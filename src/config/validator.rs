//! Schema interpreter: raw strings in, coerced values or every violation out.
//!
//! # Algorithm
//!
//! For each field, in schema order:
//!
//! 1. Read the raw value; the empty string counts as absent.
//! 2. Resolve requiredness. A conditional field whose predicate does not hold
//!    is skipped entirely, whatever its raw value.
//! 3. Absent and required → `Missing`.
//! 4. Present → coerce according to [`FieldKind`] and check bounds.
//!
//! Violations are collected across all fields; the pass fails only at the end
//! so operators see the full list in one report.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::error;

use super::raw::RawConfig;
use super::schema::{BOOLEAN_TOKENS, ConfigField, FieldKind, Requirement, SCHEMA};
use super::typed::TypedConfig;

/// Placeholder shown instead of secret values.
const REDACTED: &str = "<redacted>";

/// A successfully coerced value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coerced {
    Text(String),
    Integer(i64),
    Bool(bool),
    Enumeration(&'static str),
}

/// Why a field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    InvalidType,
    InvalidValue,
    OutOfRange,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationViolation {
    pub field: &'static str,
    pub kind: ViolationKind,
    pub message: String,
    /// Offending raw value; `None` when absent or when the field is secret.
    pub value: Option<String>,
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} | value: {value}", self.message),
            None => write!(f, "{} | value: <absent>", self.message),
        }
    }
}

/// Fatal startup error carrying every violation of a validation pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "configuration validation failed with {} violation(s){}",
    .violations.len(),
    render_violations(.violations)
)]
pub struct ConfigurationError {
    violations: Vec<ValidationViolation>,
}

impl ConfigurationError {
    pub fn new(violations: Vec<ValidationViolation>) -> Self {
        Self { violations }
    }

    /// Violations in schema order.
    pub fn violations(&self) -> &[ValidationViolation] {
        &self.violations
    }

    /// Names of the offending fields, in schema order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Emit one structured log line per violation.
    pub fn log(&self) {
        error!(
            count = self.violations.len(),
            "Environment configuration is invalid"
        );
        for violation in &self.violations {
            error!(
                field = violation.field,
                value = violation.value.as_deref().unwrap_or("<absent>"),
                "{}",
                violation.message
            );
        }
    }
}

fn render_violations(violations: &[ValidationViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("; {violation}"))
        .collect()
}

/// Coerced values of one successful pass, keyed by field name.
///
/// Skipped and absent optional fields have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedValues {
    values: BTreeMap<&'static str, Coerced>,
}

impl ValidatedValues {
    pub fn get(&self, name: &str) -> Option<&Coerced> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Coerced::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(Coerced::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(Coerced::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn enumeration(&self, name: &str) -> Option<&'static str> {
        match self.values.get(name) {
            Some(Coerced::Enumeration(s)) => Some(s),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// Validate the process configuration against [`SCHEMA`] and build the typed
/// configuration.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] listing every violation.
pub fn validate(raw: &RawConfig) -> Result<TypedConfig, ConfigurationError> {
    let values = validate_against(SCHEMA, raw)?;
    TypedConfig::from_values(&values)
}

/// Validate against an arbitrary schema.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] listing every violation.
pub fn validate_against(
    schema: &[ConfigField],
    raw: &RawConfig,
) -> Result<ValidatedValues, ConfigurationError> {
    let mut values = BTreeMap::new();
    let mut violations = Vec::new();

    for field in schema {
        let required = match field.requirement {
            Requirement::Required => true,
            Requirement::Optional => false,
            Requirement::RequiredWhen(predicate) => {
                if !predicate.is_satisfied(raw.get(predicate.field)) {
                    continue;
                }
                true
            }
        };

        let Some(value) = raw.non_empty(field.name) else {
            if required {
                violations.push(violation(
                    field,
                    ViolationKind::Missing,
                    format!("{} is required and must not be empty", field.name),
                    None,
                ));
            }
            continue;
        };

        match coerce(field, value) {
            Ok(coerced) => {
                values.insert(field.name, coerced);
            }
            Err(v) => violations.push(v),
        }
    }

    if violations.is_empty() {
        Ok(ValidatedValues { values })
    } else {
        Err(ConfigurationError::new(violations))
    }
}

fn coerce(field: &ConfigField, value: &str) -> Result<Coerced, ValidationViolation> {
    match field.kind {
        FieldKind::Text => Ok(Coerced::Text(value.to_string())),
        FieldKind::Integer { min, max } => {
            let n: i64 = value.trim().parse().map_err(|_| {
                violation(
                    field,
                    ViolationKind::InvalidType,
                    format!("{} must be an integer number", field.name),
                    Some(value),
                )
            })?;
            if n < min {
                return Err(violation(
                    field,
                    ViolationKind::OutOfRange,
                    format!("{} must not be less than {min}", field.name),
                    Some(value),
                ));
            }
            if n > max {
                return Err(violation(
                    field,
                    ViolationKind::OutOfRange,
                    format!("{} must not be greater than {max}", field.name),
                    Some(value),
                ));
            }
            Ok(Coerced::Integer(n))
        }
        FieldKind::BooleanString => match value {
            "true" | "1" => Ok(Coerced::Bool(true)),
            "false" | "0" => Ok(Coerced::Bool(false)),
            _ => Err(violation(
                field,
                ViolationKind::InvalidType,
                format!(
                    "{} must be a boolean string ({})",
                    field.name,
                    BOOLEAN_TOKENS.join(", ")
                ),
                Some(value),
            )),
        },
        FieldKind::Enumeration(domain) => domain
            .iter()
            .copied()
            .find(|candidate| *candidate == value)
            .map(Coerced::Enumeration)
            .ok_or_else(|| {
                violation(
                    field,
                    ViolationKind::InvalidValue,
                    format!("{} must be one of: {}", field.name, domain.join(", ")),
                    Some(value),
                )
            }),
    }
}

fn violation(
    field: &ConfigField,
    kind: ViolationKind,
    message: String,
    value: Option<&str>,
) -> ValidationViolation {
    let value = value.map(|v| {
        if field.secret {
            REDACTED.to_string()
        } else {
            v.to_string()
        }
    });
    ValidationViolation {
        field: field.name,
        kind,
        message,
        value,
    }
}
