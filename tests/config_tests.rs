//! Startup configuration validation through the public API.
//!
//! Run with: `cargo test --test config_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::path::PathBuf;
use std::time::Duration;

use api_gateway::config::schema::{SCHEMA, vars};
use api_gateway::config::{Environment, LogLevel, RawConfig, Requirement, validate};
use api_gateway::{ConfigStore, GatewayError};

use common::valid_raw;

const TLS_FIELDS: [&str; 4] = [
    vars::DATABASE_REJECT_UNAUTHORIZED,
    vars::DATABASE_CA,
    vars::DATABASE_KEY,
    vars::DATABASE_CERT,
];

fn required_fields() -> impl Iterator<Item = &'static str> {
    SCHEMA
        .iter()
        .filter(|field| field.requirement == Requirement::Required)
        .map(|field| field.name)
}

#[test]
fn test_complete_config_validates() {
    let config = validate(&valid_raw()).unwrap();

    assert_eq!(config.environment, Environment::Test);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.app.port, 3000);
    assert_eq!(config.throttle.ttl, Duration::from_secs(60));
    assert_eq!(config.throttle.limit, 100);
    assert_eq!(config.database.max_connections, 10);
    assert!(config.database.tls.is_none());
    assert!(config.metrics_port.is_none());
}

#[test]
fn test_each_missing_required_field_is_named() {
    for name in required_fields() {
        let err = validate(&valid_raw().without(name)).unwrap_err();
        assert!(err.contains(name), "{name} missing but not reported: {err}");
        assert_eq!(err.len(), 1, "removing {name} reported {err}");
    }
}

#[test]
fn test_each_empty_required_field_is_named() {
    for name in required_fields() {
        let err = validate(&valid_raw().with(name, "")).unwrap_err();
        assert_eq!(err.fields(), vec![name]);
    }
}

#[test]
fn test_n_violations_are_all_reported() {
    let raw = valid_raw()
        .with(vars::NODE_ENV, "staging")
        .with(vars::PORT, "70000")
        .with(vars::THROTTLE_TTL, "0")
        .with(vars::LOG_LEVEL, "loud")
        .with(vars::DATABASE_SYNCHRONIZE, "yes")
        .with(vars::DATABASE_MAX_CONNECTIONS, "many")
        .without(vars::DATABASE_NAME);

    let err = validate(&raw).unwrap_err();

    assert_eq!(
        err.fields(),
        vec![
            vars::NODE_ENV,
            vars::PORT,
            vars::THROTTLE_TTL,
            vars::LOG_LEVEL,
            vars::DATABASE_NAME,
            vars::DATABASE_SYNCHRONIZE,
            vars::DATABASE_MAX_CONNECTIONS,
        ]
    );
}

#[test]
fn test_tls_material_ignored_unless_enabled() {
    let garbage = |raw: RawConfig| {
        raw.with(vars::DATABASE_REJECT_UNAUTHORIZED, "maybe")
            .with(vars::DATABASE_CA, "")
            .with(vars::DATABASE_KEY, "")
    };

    for enabled in [None, Some("false"), Some("0"), Some("1")] {
        let base = match enabled {
            Some(value) => valid_raw().with(vars::DATABASE_SSL_ENABLED, value),
            None => valid_raw(),
        };

        assert!(validate(&base).is_ok(), "absent material, SSL={enabled:?}");
        assert!(
            validate(&garbage(base.clone())).is_ok(),
            "malformed material, SSL={enabled:?}"
        );

        let config = validate(&base).unwrap();
        assert!(config.database.tls.is_none());
    }
}

#[test]
fn test_tls_enabled_requires_each_field() {
    let enabled = valid_raw().with(vars::DATABASE_SSL_ENABLED, "true");

    let err = validate(&enabled).unwrap_err();
    assert_eq!(err.fields(), TLS_FIELDS.to_vec());

    let complete = enabled
        .clone()
        .with(vars::DATABASE_REJECT_UNAUTHORIZED, "false")
        .with(vars::DATABASE_CA, "ca.pem")
        .with(vars::DATABASE_KEY, "key.pem")
        .with(vars::DATABASE_CERT, "cert.pem");
    let tls = validate(&complete).unwrap().database.tls.unwrap();
    assert!(!tls.reject_unauthorized);
    assert_eq!(tls.ca, "ca.pem");

    for name in TLS_FIELDS {
        let err = validate(&complete.clone().with(name, "")).unwrap_err();
        assert_eq!(err.fields(), vec![name]);
    }
}

#[test]
fn test_violations_carry_offending_value() {
    let raw = valid_raw()
        .with(vars::NODE_ENV, "staging")
        .with(vars::DATABASE_PASSWORD, "");

    let err = validate(&raw).unwrap_err();
    let violations = err.violations();

    assert_eq!(violations[0].field, vars::NODE_ENV);
    assert_eq!(violations[0].value.as_deref(), Some("staging"));
    assert!(violations[0].message.contains("development"));
    assert_eq!(violations[1].field, vars::DATABASE_PASSWORD);
    assert_eq!(violations[1].value, None);
}

#[test]
fn test_store_is_shared_not_copied() {
    let store = ConfigStore::load(&valid_raw()).unwrap();
    let handles: Vec<ConfigStore> = (0..4).map(|_| store.clone()).collect();

    assert!(handles.iter().all(|handle| handle.ptr_eq(&store)));
}

#[test]
fn test_configuration_error_exits_with_config_code() {
    let err = validate(&valid_raw().without(vars::REDIS_HOST)).unwrap_err();
    let gateway = GatewayError::from(err);

    assert_eq!(gateway.exit_code(), exitcode::CONFIG);
}

#[test]
fn test_env_file_does_not_touch_process_environment() {
    let path: PathBuf = std::env::temp_dir().join(format!(
        "api-gateway-config-test-{}.env",
        std::process::id()
    ));
    std::fs::write(
        &path,
        "REDIS_HOST=from-file\nTHROTTLE_LIMIT=7\n# comment\nDATABASE_NAME=\"quoted name\"\n",
    )
    .unwrap();

    let file_only = RawConfig::from_file_only(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(file_only.get(vars::REDIS_HOST), Some("from-file"));
    assert_eq!(file_only.get(vars::THROTTLE_LIMIT), Some("7"));
    assert_eq!(file_only.get(vars::DATABASE_NAME), Some("quoted name"));
    assert_ne!(std::env::var(vars::REDIS_HOST).ok().as_deref(), Some("from-file"));
}
