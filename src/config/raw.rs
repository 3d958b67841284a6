//! Untyped configuration source.
//!
//! Values come from an optional `.env` file overlaid by the process
//! environment. The process environment wins, so a variable exported by the
//! deployment always overrides the file.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use tracing::debug;

/// Default location of the optional override file.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Raw variable name to raw string value mapping.
///
/// Missing keys are normal; whether a key is required is decided by the
/// schema, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    values: BTreeMap<String, String>,
}

impl RawConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.env` from the working directory (if present) and overlay the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns the `dotenvy` error if the file exists but cannot be parsed.
    pub fn from_env() -> Result<Self, dotenvy::Error> {
        Self::from_env_file(Path::new(DEFAULT_ENV_FILE))
    }

    /// Load the given env file (if present) and overlay the process environment.
    ///
    /// Unlike `dotenvy::dotenv()`, this never writes into the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns the `dotenvy` error if the file exists but cannot be parsed.
    pub fn from_env_file(path: &Path) -> Result<Self, dotenvy::Error> {
        let mut config = Self::from_file_only(path)?;
        config.values.extend(env::vars());
        Ok(config)
    }

    /// Load only the env file, ignoring the process environment.
    ///
    /// # Errors
    ///
    /// Returns the `dotenvy` error if the file exists but cannot be parsed.
    pub fn from_file_only(path: &Path) -> Result<Self, dotenvy::Error> {
        let mut values = BTreeMap::new();

        match dotenvy::from_path_iter(path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item?;
                    values.insert(key, value);
                }
            }
            Err(e) if e.not_found() => {
                debug!(path = %path.display(), "No env file found, using process environment only");
            }
            Err(e) => return Err(e),
        }

        Ok(Self { values })
    }

    /// Builder-style setter, mostly useful in tests.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder-style removal, mostly useful in tests.
    pub fn without(mut self, name: &str) -> Self {
        self.values.remove(name);
        self
    }

    /// Raw value of a variable, exactly as provided.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Raw value of a variable, treating the empty string as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
