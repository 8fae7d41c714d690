//! Numbers with engineering suffixes.

/// Parse a number with an optional engineering suffix.
///
/// Suffixes: `p n u m k meg M g`. `m` is milli and `M` or `meg` is mega.
/// Trailing unit letters are ignored, so `4.7uF` and `10kOhm` work.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let split = numeric_prefix_len(text);
    if split == 0 {
        return None;
    }
    let (number, suffix) = text.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier = if suffix.get(..3).is_some_and(|s| s.eq_ignore_ascii_case("meg")) {
        1e6
    } else {
        match suffix.chars().next() {
            None => 1.0,
            Some('p') | Some('P') => 1e-12,
            Some('n') | Some('N') => 1e-9,
            Some('u') | Some('U') | Some('µ') => 1e-6,
            Some('m') => 1e-3,
            Some('M') => 1e6,
            Some('k') | Some('K') => 1e3,
            Some('g') | Some('G') => 1e9,
            Some(c) if c.is_alphabetic() => 1.0,
            Some(_) => return None,
        }
    };
    Some(value * multiplier)
}

/// Length of the leading float literal (sign, digits, point, exponent).
fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i == digits_start {
        return 0;
    }
    // Exponent only when digits follow, so "1meg" is not read as "1e..."
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}
