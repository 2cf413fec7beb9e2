//! Fuzz target for the ADC line parser.
//!
//! Arbitrary serial noise must never panic, and any accepted sample must
//! survive a render/parse cycle unchanged.

#![no_main]

use al_common::Channel;
use al_core::parse::parse_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let sample = parse_line(&line);

    let mut wire = String::new();
    for channel in Channel::ALL {
        if let Some(v) = sample.get(channel) {
            wire.push_str(&format!("{}{};", channel.prefix(), v));
        }
    }
    let reparsed = parse_line(&wire);
    for channel in Channel::ALL {
        if sample.get(channel).is_some() {
            assert_eq!(reparsed.get(channel), sample.get(channel));
        }
    }
});
