//! Declarative description of every recognized environment variable.
//!
//! The schema is a plain rule table. [`super::validator`] is the only code
//! that interprets it, so adding a variable means adding one row here and one
//! accessor in [`super::typed`].

/// Variable names as constants for consistency.
pub mod vars {
    pub const NODE_ENV: &str = "NODE_ENV";
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";
    pub const REDIS_HOST: &str = "REDIS_HOST";
    pub const REDIS_PORT: &str = "REDIS_PORT";
    pub const THROTTLE_TTL: &str = "THROTTLE_TTL";
    pub const THROTTLE_LIMIT: &str = "THROTTLE_LIMIT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const DATABASE_TYPE: &str = "DATABASE_TYPE";
    pub const DATABASE_HOST: &str = "DATABASE_HOST";
    pub const DATABASE_PORT: &str = "DATABASE_PORT";
    pub const DATABASE_USERNAME: &str = "DATABASE_USERNAME";
    pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";
    pub const DATABASE_NAME: &str = "DATABASE_NAME";
    pub const DATABASE_SYNCHRONIZE: &str = "DATABASE_SYNCHRONIZE";
    pub const DATABASE_LOGGING: &str = "DATABASE_LOGGING";
    pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
    pub const DATABASE_SSL_ENABLED: &str = "DATABASE_SSL_ENABLED";
    pub const DATABASE_REJECT_UNAUTHORIZED: &str = "DATABASE_REJECT_UNAUTHORIZED";
    pub const DATABASE_CA: &str = "DATABASE_CA";
    pub const DATABASE_KEY: &str = "DATABASE_KEY";
    pub const DATABASE_CERT: &str = "DATABASE_CERT";
    pub const METRICS_PORT: &str = "METRICS_PORT";
}

/// Accepted `NODE_ENV` values.
pub const ENVIRONMENTS: &[&str] = &["development", "production", "test"];

/// Accepted `LOG_LEVEL` values.
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "verbose"];

/// Accepted boolean-string tokens.
pub const BOOLEAN_TOKENS: &[&str] = &["true", "false", "1", "0"];

/// The token that switches a boolean-string companion on.
pub const TRUE_TOKEN: &str = "true";

const PORT_RANGE: FieldKind = FieldKind::Integer { min: 1, max: 65_535 };

/// Target type of a variable after coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any non-empty string.
    Text,
    /// Base-10 integer within `min..=max`.
    Integer { min: i64, max: i64 },
    /// One of [`BOOLEAN_TOKENS`].
    BooleanString,
    /// One of the listed values, matched exactly.
    Enumeration(&'static [&'static str]),
}

/// Condition under which a field becomes required.
///
/// Compares the sibling's raw value literally. An absent sibling never
/// satisfies the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    pub field: &'static str,
    pub equals: &'static str,
}

impl Predicate {
    pub const fn equals(field: &'static str, equals: &'static str) -> Self {
        Self { field, equals }
    }

    /// Evaluate against the sibling's raw value.
    pub fn is_satisfied(&self, sibling: Option<&str>) -> bool {
        sibling == Some(self.equals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    /// Required when the predicate holds; skipped entirely otherwise.
    RequiredWhen(Predicate),
}

/// One recognized variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub requirement: Requirement,
    /// Values of secret fields are never echoed in logs or errors.
    pub secret: bool,
}

impl ConfigField {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::Required,
            secret: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::Optional,
            secret: false,
        }
    }

    pub const fn required_when(name: &'static str, kind: FieldKind, predicate: Predicate) -> Self {
        Self {
            name,
            kind,
            requirement: Requirement::RequiredWhen(predicate),
            secret: false,
        }
    }

    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

const TLS_ENABLED: Predicate = Predicate::equals(vars::DATABASE_SSL_ENABLED, TRUE_TOKEN);

/// Every recognized variable, in validation (and reporting) order.
pub const SCHEMA: &[ConfigField] = &[
    ConfigField::required(vars::NODE_ENV, FieldKind::Enumeration(ENVIRONMENTS)),
    ConfigField::optional(vars::HOST, FieldKind::Text),
    ConfigField::optional(vars::PORT, PORT_RANGE),
    ConfigField::required(vars::REDIS_HOST, FieldKind::Text),
    ConfigField::optional(vars::REDIS_PORT, PORT_RANGE),
    ConfigField::required(
        vars::THROTTLE_TTL,
        FieldKind::Integer {
            min: 1,
            max: u32::MAX as i64,
        },
    ),
    ConfigField::required(
        vars::THROTTLE_LIMIT,
        FieldKind::Integer {
            min: 1,
            max: u32::MAX as i64,
        },
    ),
    ConfigField::required(vars::LOG_LEVEL, FieldKind::Enumeration(LOG_LEVELS)),
    ConfigField::required(vars::DATABASE_TYPE, FieldKind::Text),
    ConfigField::required(vars::DATABASE_HOST, FieldKind::Text),
    ConfigField::optional(vars::DATABASE_PORT, PORT_RANGE),
    ConfigField::required(vars::DATABASE_USERNAME, FieldKind::Text),
    ConfigField::required(vars::DATABASE_PASSWORD, FieldKind::Text).secret(),
    ConfigField::required(vars::DATABASE_NAME, FieldKind::Text),
    ConfigField::required(vars::DATABASE_SYNCHRONIZE, FieldKind::BooleanString),
    ConfigField::required(vars::DATABASE_LOGGING, FieldKind::BooleanString),
    ConfigField::required(
        vars::DATABASE_MAX_CONNECTIONS,
        FieldKind::Integer {
            min: 1,
            max: u32::MAX as i64,
        },
    ),
    ConfigField::optional(vars::DATABASE_SSL_ENABLED, FieldKind::BooleanString),
    ConfigField::required_when(
        vars::DATABASE_REJECT_UNAUTHORIZED,
        FieldKind::BooleanString,
        TLS_ENABLED,
    ),
    ConfigField::required_when(vars::DATABASE_CA, FieldKind::Text, TLS_ENABLED),
    ConfigField::required_when(vars::DATABASE_KEY, FieldKind::Text, TLS_ENABLED).secret(),
    ConfigField::required_when(vars::DATABASE_CERT, FieldKind::Text, TLS_ENABLED),
    ConfigField::optional(vars::METRICS_PORT, FieldKind::Integer { min: 0, max: 65_535 }),
];

/// Look up a field by name.
pub fn field(name: &str) -> Option<&'static ConfigField> {
    SCHEMA.iter().find(|f| f.name == name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique() {
        let names: HashSet<_> = SCHEMA.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), SCHEMA.len());
    }

    #[test]
    fn test_predicate_siblings_exist_and_precede_dependents() {
        for (index, field) in SCHEMA.iter().enumerate() {
            if let Requirement::RequiredWhen(predicate) = field.requirement {
                let sibling = SCHEMA
                    .iter()
                    .position(|f| f.name == predicate.field)
                    .unwrap();
                assert!(sibling < index, "{} depends on a later field", field.name);
            }
        }
    }

    #[test]
    fn test_tls_dependents() {
        let dependents: Vec<_> = SCHEMA
            .iter()
            .filter(|f| matches!(f.requirement, Requirement::RequiredWhen(_)))
            .map(|f| f.name)
            .collect();

        assert_eq!(
            dependents,
            vec![
                vars::DATABASE_REJECT_UNAUTHORIZED,
                vars::DATABASE_CA,
                vars::DATABASE_KEY,
                vars::DATABASE_CERT,
            ]
        );
    }

    #[test]
    fn test_predicate_matches_literal_true_only() {
        assert!(TLS_ENABLED.is_satisfied(Some("true")));
        assert!(!TLS_ENABLED.is_satisfied(Some("1")));
        assert!(!TLS_ENABLED.is_satisfied(Some("TRUE")));
        assert!(!TLS_ENABLED.is_satisfied(Some("false")));
        assert!(!TLS_ENABLED.is_satisfied(None));
    }

    #[test]
    fn test_secret_fields() {
        assert!(field(vars::DATABASE_PASSWORD).unwrap().secret);
        assert!(field(vars::DATABASE_KEY).unwrap().secret);
        assert!(!field(vars::DATABASE_HOST).unwrap().secret);
    }
}
