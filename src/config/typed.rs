//! Validated, immutable configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use super::schema::vars;
use super::validator::{ConfigurationError, ValidatedValues, ValidationViolation, ViolationKind};

/// Default listen host when `HOST` is absent: loopback only.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port when `PORT` is absent.
pub const DEFAULT_PORT: u16 = 3000;

/// Default cache backend port when `REDIS_PORT` is absent.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default data-source port when `DATABASE_PORT` is absent.
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Process mode (`NODE_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Log verbosity (`LOG_LEVEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "verbose" => Ok(Self::Verbose),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
}

/// Throttling window: at most `limit` requests per `ttl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub ttl: Duration,
    pub limit: u32,
}

/// TLS material for the data-source connection. Only built when
/// `DATABASE_SSL_ENABLED=true`.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseTls {
    pub reject_unauthorized: bool,
    pub ca: String,
    pub key: String,
    pub cert: String,
}

impl fmt::Debug for DatabaseTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseTls")
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("ca", &self.ca)
            .field("key", &"<redacted>")
            .field("cert", &self.cert)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub synchronize: bool,
    pub logging: bool,
    pub max_connections: u32,
    pub tls: Option<DatabaseTls>,
}

impl DatabaseSettings {
    /// `host:port` of the data source.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("synchronize", &self.synchronize)
            .field("logging", &self.logging)
            .field("max_connections", &self.max_connections)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Validated configuration, one typed attribute per recognized variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedConfig {
    pub environment: Environment,
    pub app: AppSettings,
    pub redis: RedisSettings,
    pub throttle: ThrottleSettings,
    pub log_level: LogLevel,
    pub database: DatabaseSettings,
    /// Prometheus exporter port; `None` when absent or 0.
    pub metrics_port: Option<u16>,
}

impl TypedConfig {
    /// Build from the coerced values of a successful validation pass.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a value the schema guarantees is
    /// missing or out of its target range, which only happens when `values`
    /// did not come from [`super::schema::SCHEMA`].
    pub fn from_values(values: &ValidatedValues) -> Result<Self, ConfigurationError> {
        let mut ex = Extractor::new(values);

        let environment = ex.parsed(vars::NODE_ENV, Environment::Development);
        let log_level = ex.parsed(vars::LOG_LEVEL, LogLevel::Info);

        let app = AppSettings {
            host: ex.text_or(vars::HOST, DEFAULT_HOST),
            port: ex.number_or(vars::PORT, DEFAULT_PORT),
        };
        let redis = RedisSettings {
            host: ex.text(vars::REDIS_HOST),
            port: ex.number_or(vars::REDIS_PORT, DEFAULT_REDIS_PORT),
        };
        let throttle = ThrottleSettings {
            ttl: Duration::from_secs(ex.number::<u64>(vars::THROTTLE_TTL)),
            limit: ex.number(vars::THROTTLE_LIMIT),
        };

        // Dependents only carry values when the TLS predicate held during validation.
        let tls = if values.contains(vars::DATABASE_REJECT_UNAUTHORIZED) {
            Some(DatabaseTls {
                reject_unauthorized: ex.boolean(vars::DATABASE_REJECT_UNAUTHORIZED),
                ca: ex.text(vars::DATABASE_CA),
                key: ex.text(vars::DATABASE_KEY),
                cert: ex.text(vars::DATABASE_CERT),
            })
        } else {
            None
        };

        let database = DatabaseSettings {
            kind: ex.text(vars::DATABASE_TYPE),
            host: ex.text(vars::DATABASE_HOST),
            port: ex.number_or(vars::DATABASE_PORT, DEFAULT_DATABASE_PORT),
            username: ex.text(vars::DATABASE_USERNAME),
            password: ex.text(vars::DATABASE_PASSWORD),
            name: ex.text(vars::DATABASE_NAME),
            synchronize: ex.boolean(vars::DATABASE_SYNCHRONIZE),
            logging: ex.boolean(vars::DATABASE_LOGGING),
            max_connections: ex.number(vars::DATABASE_MAX_CONNECTIONS),
            tls,
        };

        let metrics_port =
            Some(ex.number_or::<u16>(vars::METRICS_PORT, 0)).filter(|port| *port > 0);

        ex.finish()?;

        Ok(Self {
            environment,
            app,
            redis,
            throttle,
            log_level,
            database,
            metrics_port,
        })
    }

    /// Listen address as `host:port`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Prometheus exporter address, `None` when disabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_port
            .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

/// Pulls typed values out of [`ValidatedValues`], recording a violation
/// instead of panicking when an expected value is absent.
struct Extractor<'a> {
    values: &'a ValidatedValues,
    violations: Vec<ValidationViolation>,
}

impl<'a> Extractor<'a> {
    fn new(values: &'a ValidatedValues) -> Self {
        Self {
            values,
            violations: Vec::new(),
        }
    }

    fn missing(&mut self, field: &'static str) {
        self.violations.push(ValidationViolation {
            field,
            kind: ViolationKind::Missing,
            message: format!("{field} is required and must not be empty"),
            value: None,
        });
    }

    fn text(&mut self, field: &'static str) -> String {
        match self.values.text(field) {
            Some(s) => s.to_string(),
            None => {
                self.missing(field);
                String::new()
            }
        }
    }

    fn text_or(&mut self, field: &'static str, default: &str) -> String {
        self.values.text(field).unwrap_or(default).to_string()
    }

    fn boolean(&mut self, field: &'static str) -> bool {
        match self.values.boolean(field) {
            Some(b) => b,
            None => {
                self.missing(field);
                false
            }
        }
    }

    fn number<T>(&mut self, field: &'static str) -> T
    where
        T: TryFrom<i64> + Default,
    {
        match self.values.integer(field) {
            Some(n) => self.convert(field, n).unwrap_or_default(),
            None => {
                self.missing(field);
                T::default()
            }
        }
    }

    fn number_or<T>(&mut self, field: &'static str, default: T) -> T
    where
        T: TryFrom<i64>,
    {
        match self.values.integer(field) {
            Some(n) => self.convert(field, n).unwrap_or(default),
            None => default,
        }
    }

    fn convert<T: TryFrom<i64>>(&mut self, field: &'static str, n: i64) -> Option<T> {
        match T::try_from(n) {
            Ok(v) => Some(v),
            Err(_) => {
                self.violations.push(ValidationViolation {
                    field,
                    kind: ViolationKind::OutOfRange,
                    message: format!("{field} is out of range"),
                    value: Some(n.to_string()),
                });
                None
            }
        }
    }

    fn parsed<T: FromStr>(&mut self, field: &'static str, fallback: T) -> T {
        match self.values.enumeration(field).map(str::parse) {
            Some(Ok(v)) => v,
            Some(Err(_)) | None => {
                self.missing(field);
                fallback
            }
        }
    }

    fn finish(self) -> Result<(), ConfigurationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::new(self.violations))
        }
    }
}
