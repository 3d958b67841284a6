//! Environment configuration: schema, validation and the shared store.
//!
//! # Data Flow
//!
//! ```text
//! .env file + process environment
//!     → RawConfig        (untyped name → value map)
//!     → validate()       (schema rule table, aggregate-all-then-fail)
//!     → TypedConfig      (coerced, immutable)
//!     → ConfigStore      (Arc handle passed to every component)
//! ```
//!
//! # Conditional Requirements
//!
//! `DATABASE_REJECT_UNAUTHORIZED`, `DATABASE_CA`, `DATABASE_KEY` and
//! `DATABASE_CERT` are validated only when `DATABASE_SSL_ENABLED` is exactly
//! `true`. Otherwise they are ignored, whatever their value. An absent
//! `DATABASE_SSL_ENABLED` counts as disabled.
//!
//! # Example
//!
//! ```rust,ignore
//! let raw = RawConfig::from_env()?;
//! let store = ConfigStore::load(&raw)?;
//! println!("Server will listen on {}", store.server_addr());
//! ```

pub mod raw;
pub mod schema;
pub mod store;
pub mod typed;
pub mod validator;

pub use raw::RawConfig;
pub use schema::{ConfigField, FieldKind, Predicate, Requirement, SCHEMA};
pub use store::ConfigStore;
pub use typed::{
    AppSettings, DatabaseSettings, DatabaseTls, Environment, LogLevel, RedisSettings,
    ThrottleSettings, TypedConfig,
};
pub use validator::{
    ConfigurationError, ValidatedValues, ValidationViolation, ViolationKind, validate,
    validate_against,
};
