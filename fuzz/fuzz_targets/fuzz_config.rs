//! Fuzz testing for the environment validator.
//!
//! Every recognized variable gets an arbitrary value (or none). The validator
//! must never panic, and a failed pass must name at least one field.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_config -- -max_total_time=60
//! ```

#![no_main]

use api_gateway::config::{RawConfig, SCHEMA, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|values: Vec<Option<String>>| {
    let raw: RawConfig = SCHEMA
        .iter()
        .zip(values.iter())
        .filter_map(|(field, value)| value.as_deref().map(|value| (field.name, value)))
        .collect();

    if let Err(err) = validate(&raw) {
        assert!(!err.is_empty());
    }
});
