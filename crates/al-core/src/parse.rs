//! Parser for telemetry lines.
//!
//! # Line Format
//! ```text
//! A436; E1857; D13296;
//! ```
//! Fields are separated by `;`. Each field is a one-letter channel prefix
//! (`A`, `E` or `D`) followed by a base-10 integer. Order and presence are
//! free, unknown prefixes are ignored, the trailing `;` is optional.
//!
//! Parsing never fails: malformed fields simply leave their channel unset.
//! When a prefix repeats within one line, the last occurrence wins.

use al_common::{Channel, Sample};
use tracing::trace;

/// Field separator on the wire.
pub const SEPARATOR: char = ';';

/// Parse one telemetry line into a sample.
pub fn parse_line(line: &str) -> Sample {
    let mut sample = Sample::default();
    let body = line.trim();
    let body = body.strip_suffix(SEPARATOR).unwrap_or(body);

    for token in body.split(SEPARATOR) {
        if let Some((channel, value)) = parse_token(token) {
            sample.set(channel, value);
        }
    }
    sample
}

/// Parse one field token.
///
/// Returns `None` when the token carries no recognized prefix, and
/// `Some((channel, None))` when the prefix is recognized but the value is
/// not an integer.
pub fn parse_token(token: &str) -> Option<(Channel, Option<i64>)> {
    let token = token.trim();
    let mut chars = token.chars();
    let channel = Channel::from_prefix(chars.next()?)?;
    let value = parse_int(chars.as_str());
    if value.is_none() {
        trace!(token, channel = %channel, "Unparseable channel value");
    }
    Some((channel, value))
}

/// Parse a base-10 integer.
///
/// Accepts surrounding whitespace, an optional sign, ASCII digits, and single
/// underscores between digits. Values outside `i64` yield `None`.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.as_bytes().first()? {
        b'-' => (true, s.get(1..)?),
        b'+' => (false, s.get(1..)?),
        _ => (false, s),
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') {
        return None;
    }

    let mut value: i64 = 0;
    let mut prev_underscore = false;
    for b in digits.bytes() {
        match b {
            b'0'..=b'9' => {
                let d = i64::from(b - b'0');
                value = value.checked_mul(10)?;
                // Accumulate toward the sign so i64::MIN stays representable.
                value = if negative {
                    value.checked_sub(d)?
                } else {
                    value.checked_add(d)?
                };
                prev_underscore = false;
            }
            b'_' if !prev_underscore => prev_underscore = true,
            _ => return None,
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: Sample) -> (Option<i64>, Option<i64>, Option<i64>) {
        (s.a, s.e, s.d)
    }

    #[test]
    fn test_parse_well_formed_line() {
        assert_eq!(
            triple(parse_line("A436;E1857;D13296;")),
            (Some(436), Some(1857), Some(13296))
        );
    }

    #[test]
    fn test_parse_with_spaces() {
        assert_eq!(
            triple(parse_line("A436; E1857; D13296;")),
            (Some(436), Some(1857), Some(13296))
        );
        assert_eq!(
            triple(parse_line("  A436 ;  E1857 ;D13296 ;  \r\n")),
            (Some(436), Some(1857), Some(13296))
        );
    }

    #[test]
    fn test_parse_any_order_and_subset() {
        assert_eq!(triple(parse_line("D3;A1")), (Some(1), None, Some(3)));
        assert_eq!(triple(parse_line("E-5;")), (None, Some(-5), None));
    }

    #[test]
    fn test_parse_bad_value_leaves_field_unset() {
        assert_eq!(triple(parse_line("Axyz;E10;")), (None, Some(10), None));
        assert_eq!(triple(parse_line("A;E;D12x;")), (None, None, None));
    }

    #[test]
    fn test_parse_last_wins() {
        assert_eq!(triple(parse_line("A1;A2;")), (Some(2), None, None));
        // A later malformed occurrence clears the earlier value.
        assert_eq!(triple(parse_line("A1;Abad;")), (None, None, None));
    }

    #[test]
    fn test_parse_empty_and_separator_only() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
        assert!(parse_line(";").is_empty());
        assert!(parse_line(";;;").is_empty());
    }

    #[test]
    fn test_parse_ignores_unknown_prefixes() {
        assert!(parse_line("garbage").is_empty());
        assert!(parse_line("B12;X4;a5;").is_empty());
        assert_eq!(triple(parse_line("T25;E7;")), (None, Some(7), None));
    }

    #[test]
    fn test_parse_boot_banner_is_noise() {
        assert!(parse_line("ets Jun  8 2016 00:22:57").is_empty());
        assert!(parse_line("rst:0x1 (POWERON_RESET),boot:0x13").is_empty());
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token(" A12 "), Some((Channel::A, Some(12))));
        assert_eq!(parse_token("Dx"), Some((Channel::D, None)));
        assert_eq!(parse_token("Z1"), None);
        assert_eq!(parse_token(""), None);
    }

    #[test]
    fn test_parse_int_syntax() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" 42 "), Some(42));
        assert_eq!(parse_int("+7"), Some(7));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("007"), Some(7));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("1__000"), None);
        assert_eq!(parse_int("_1"), None);
        assert_eq!(parse_int("1_"), None);
        assert_eq!(parse_int("-"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("1.5"), None);
        assert_eq!(parse_int("0x10"), None);
        assert_eq!(parse_int("- 1"), None);
    }

    #[test]
    fn test_parse_int_bounds() {
        assert_eq!(parse_int("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_int("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_int("9223372036854775808"), None);
    }

    #[test]
    fn test_parse_out_of_range_leaves_field_unset() {
        // A line whose only value overflows i64 is noise.
        assert!(parse_line("A99999999999999999999;").is_empty());
        assert_eq!(
            triple(parse_line("A99999999999999999999;E5;")),
            (None, Some(5), None)
        );
    }

    #[test]
    fn test_parse_non_ascii_digits_leave_field_unset() {
        assert_eq!(parse_int("\u{0661}\u{0662}"), None);
        assert!(parse_line("A\u{0661}\u{0662};").is_empty());
    }
}
