//! Shared handle to the validated configuration.

use std::ops::Deref;
use std::sync::Arc;

use super::raw::RawConfig;
use super::typed::TypedConfig;
use super::validator::{ConfigurationError, validate};

/// Read-only, reference-counted handle to the [`TypedConfig`] produced at
/// startup.
///
/// The lifecycle builds exactly one store and clones the handle into every
/// component that needs configuration. There is no global accessor and no way
/// to mutate the content after construction.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    inner: Arc<TypedConfig>,
}

impl ConfigStore {
    /// Validate `raw` and wrap the result.
    ///
    /// # Errors
    ///
    /// Returns the aggregated [`ConfigurationError`] if validation fails.
    pub fn load(raw: &RawConfig) -> Result<Self, ConfigurationError> {
        validate(raw).map(Self::new)
    }

    pub fn new(config: TypedConfig) -> Self {
        Self {
            inner: Arc::new(config),
        }
    }

    pub fn get(&self) -> &TypedConfig {
        &self.inner
    }

    /// Whether two handles point at the same configuration instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for ConfigStore {
    type Target = TypedConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
