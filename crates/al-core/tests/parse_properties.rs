//! Property-based tests for the line parser and the collector.

use al_common::Sample;
use al_core::collect::collect;
use al_core::parse::parse_line;
use al_core::transport::from_lines;
use proptest::prelude::*;
use std::num::NonZeroUsize;

fn arb_reading() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![Just(None), any::<i64>().prop_map(Some)]
}

fn arb_valid_sample() -> impl Strategy<Value = Sample> {
    (arb_reading(), arb_reading(), arb_reading())
        .prop_map(|(a, e, d)| Sample::new(a, e, d))
        .prop_filter("at least one channel set", |s| !s.is_empty())
}

/// Render a sample in wire format with a chosen field order and spacing.
fn render(sample: &Sample, order: &[usize], pad: &str, trailing: bool) -> String {
    let fields = [('A', sample.a), ('E', sample.e), ('D', sample.d)];
    let tokens: Vec<String> = order
        .iter()
        .filter_map(|&i| fields[i].1.map(|v| format!("{pad}{}{}{pad}", fields[i].0, v)))
        .collect();
    let mut line = tokens.join(";");
    if trailing {
        line.push(';');
    }
    line
}

/// Lines that carry no recognized channel.
fn arb_noise_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        Just(";".to_string()),
        Just(";;".to_string()),
        "[a-z ]{0,20}",
        "[BCFGXYZ][0-9]{1,4};",
        "A[a-z]{1,5};E[a-z]{1,5};",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Parsing is total over arbitrary input.
    #[test]
    fn parse_never_panics(line in ".*") {
        let _ = parse_line(&line);
    }

    /// Order, spacing, and the trailing separator do not change the result.
    #[test]
    fn wire_format_round_trips(
        sample in arb_valid_sample(),
        order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        pad in prop_oneof![Just(""), Just(" "), Just("\t")],
        trailing in any::<bool>(),
    ) {
        let line = render(&sample, &order, pad, trailing);
        prop_assert_eq!(parse_line(&line), sample);
        prop_assert_eq!(parse_line(&format!("  {}\r\n", line)), sample);
    }

    /// Noise lines never parse to a valid sample.
    #[test]
    fn noise_lines_are_empty(line in arb_noise_line()) {
        prop_assert!(parse_line(&line).is_empty(), "{:?}", line);
    }

    /// Interleaving noise between valid lines yields the same sample set as
    /// the valid lines alone.
    #[test]
    fn collector_skips_noise(
        samples in prop::collection::vec(arb_valid_sample(), 1..20),
        noise in prop::collection::vec(prop::collection::vec(arb_noise_line(), 0..3), 20),
    ) {
        let quota = NonZeroUsize::new(samples.len()).unwrap();
        let clean: Vec<String> = samples
            .iter()
            .map(|s| render(s, &[0, 1, 2], "", true))
            .collect();

        let mut noisy = Vec::new();
        for (i, line) in clean.iter().enumerate() {
            noisy.extend(noise[i].iter().cloned());
            noisy.push(line.clone());
        }

        let expected = collect(quota, &mut from_lines(clean)).unwrap();
        let actual = collect(quota, &mut from_lines(noisy)).unwrap();
        prop_assert_eq!(actual, expected);
    }
}
