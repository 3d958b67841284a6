//! Fuzz testing for payload validation and coercion.
//!
//! Arbitrary bytes are parsed as JSON and, when they form an object, checked
//! against a schema covering every value kind. Query strings go through the
//! same path. Nothing may panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_payload -- -max_total_time=60
//! ```

#![no_main]

use api_gateway::validation::{
    FieldRule, PayloadSchema, ValueKind, query_to_object, validate_fields,
};
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fn schema() -> PayloadSchema {
    PayloadSchema::new()
        .field(FieldRule::required("name", ValueKind::String))
        .field(FieldRule::optional("count", ValueKind::Integer))
        .field(FieldRule::optional("ratio", ValueKind::Number))
        .field(FieldRule::optional("active", ValueKind::Boolean))
}

fuzz_target!(|data: &[u8]| {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(data) {
        let _ = validate_fields(&schema(), map.clone(), false);
        let _ = validate_fields(&schema(), map, true);
    }

    if let Ok(query) = std::str::from_utf8(data)
        && let Ok(object) = query_to_object(query)
    {
        let _ = validate_fields(&schema(), object, false);
    }
});
