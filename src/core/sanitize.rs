// src/core/sanitize.rs

/// Minimal HTML entity decoding: handle `&nbsp;` and `&amp;` only.
pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ").replace("&amp;", "&")
}

/// Collapse sequences of whitespace into a single space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Parse a displayed amount into integer cents.
///
/// Sites render amounts with currency signs, non-breaking spaces and either
/// French ("1 234,56") or dotted ("1.234,56") grouping. Everything except
/// digits, `-`, `,` and `.` is dropped; the last `,` or `.` is taken as the
/// decimal separator, any earlier ones as grouping.
pub fn parse_amount_cents(raw: &str) -> Option<i64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | '.'))
        .collect();
    if kept.is_empty() {
        return None;
    }

    let negative = kept.starts_with('-');
    let digits_and_seps: String = kept.chars().filter(|c| *c != '-').collect();

    let sep_idx = digits_and_seps.rfind([',', '.']);
    let (int_part, frac_part) = match sep_idx {
        Some(i) => (&digits_and_seps[..i], &digits_and_seps[i + 1..]),
        None => (digits_and_seps.as_str(), ""),
    };
    // A separator followed by 3 digits is grouping, not decimals.
    let (int_part, frac_part) = if frac_part.len() == 3 {
        (digits_and_seps.as_str(), "")
    } else {
        (int_part, frac_part)
    };

    let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
    let frac_digits: String = frac_part.chars().filter(char::is_ascii_digit).collect();
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }
    if frac_digits.len() > 2 {
        return None;
    }

    let units: i64 = if int_digits.is_empty() { 0 } else { int_digits.parse().ok()? };
    let mut cents = frac_digits.parse::<i64>().unwrap_or(0);
    if frac_digits.len() == 1 {
        cents *= 10;
    }
    let total = units * 100 + cents;
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn french_amounts() {
        assert_eq!(parse_amount_cents("1 234,56 €"), Some(123_456));
        assert_eq!(parse_amount_cents("1.234,56"), Some(123_456));
        assert_eq!(parse_amount_cents("-12,30"), Some(-1_230));
        assert_eq!(parse_amount_cents("7,5"), Some(750));
    }

    #[test]
    fn plain_and_grouped() {
        assert_eq!(parse_amount_cents("42"), Some(4_200));
        assert_eq!(parse_amount_cents("1,234"), Some(123_400)); // grouping, not decimals
        assert_eq!(parse_amount_cents("120.00"), Some(12_000));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_amount_cents("n/a"), None);
        assert_eq!(parse_amount_cents(""), None);
    }
}
