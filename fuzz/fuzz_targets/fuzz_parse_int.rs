//! Fuzz target for integer parsing of interactive answers.
//!
//! Any accepted value must agree with the standard parser once separators
//! are removed.

#![no_main]

use al_core::parse::parse_int;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Some(value) = parse_int(data) {
        let plain: String = data.trim().chars().filter(|c| *c != '_').collect();
        assert_eq!(plain.parse::<i64>().ok(), Some(value));
    }
});
