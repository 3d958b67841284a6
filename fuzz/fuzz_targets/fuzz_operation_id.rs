//! Fuzz testing for operation id derivation.
//!
//! The id must be a pure function of its inputs and must never contain
//! separator characters from the method name.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_operation_id -- -max_total_time=60
//! ```

#![no_main]

use api_gateway::docs::operation_id::{operation_id, split_words};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (String, String)| {
    let (controller, method) = input;

    let id = operation_id(&controller, &method);
    assert_eq!(id, operation_id(&controller, &method));

    for word in split_words(&method) {
        assert!(word.chars().all(char::is_alphanumeric));
    }
});
