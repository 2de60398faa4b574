//! Italian-locale numeric codec.
//!
//! Every amount in a canonical record is held as an Italian display string
//! ("1.234,56"). Arithmetic (sums, sorts, negativity checks) always goes
//! through [`parse_italian`] first; display strings are never summed or
//! compared directly.
//!
//! CRITICAL: both functions are total. A spreadsheet with one bad cell must
//! not block the other 50,000 rows, so unrecognized input degrades to a
//! zero sentinel instead of failing.

use regex::Regex;
use std::sync::OnceLock;

/// Matches a number already in Italian notation: "1.234,56", "-500", "12,5".
fn italian_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(\.\d{3})*(,\d+)?$").unwrap())
}

/// Matches American/English notation: "1,234.56", "-500", "12.5".
fn american_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})*(\.\d+)?$").unwrap())
}

/// Format an f64 as an Italian display string with exactly two decimals:
/// `.` as thousands separator, `,` as decimal separator.
pub fn format_italian_f64(value: f64) -> String {
    if !value.is_finite() {
        return "0,00".to_string();
    }

    let negative = value < 0.0;
    let rounded = (value.abs() * 100.0).round() / 100.0;
    let int_part = rounded.trunc() as u64;
    let frac = ((rounded - rounded.trunc()) * 100.0).round() as u64;

    let digits = int_part.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!(
        "{}{},{:02}",
        if negative { "-" } else { "" },
        grouped,
        frac
    )
}

/// Normalize an arbitrary cell value into an Italian display string.
///
/// Strings already in Italian notation pass through unchanged (the function
/// is idempotent on its own output). American notation is reinterpreted.
/// Anything else is stripped to its numeric characters and the convention is
/// guessed by comparing separator counts; total failure yields "0,00".
pub fn format_italian(value: &str) -> String {
    let s = value.trim();
    if s.is_empty() {
        return "0,00".to_string();
    }

    if italian_pattern().is_match(s) {
        return s.to_string();
    }

    if american_pattern().is_match(s) {
        let cleaned: String = s.chars().filter(|c| *c != ',').collect();
        return match cleaned.parse::<f64>() {
            Ok(v) => format_italian_f64(v),
            Err(_) => "0,00".to_string(),
        };
    }

    // Unknown shape: keep digits, separators and sign, then guess the
    // convention from which separator occurs more often.
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '+' | '-'))
        .collect();
    if cleaned.is_empty() {
        return "0,00".to_string();
    }

    let dots = cleaned.matches('.').count();
    let commas = cleaned.matches(',').count();
    // Tie-break by position: the separator closer to the end of the string
    // is the decimal point ("1.234,56" is Italian, "1,234.56" is not).
    let italian_like = commas > dots || (commas == dots && cleaned.rfind(',') > cleaned.rfind('.'));
    let normalized = if italian_like {
        // Italian-looking: drop thousands dots, last comma is the decimal.
        replace_last_comma(&cleaned.replace('.', ""))
    } else {
        // American-looking: drop thousands commas; with several dots only
        // the last one can be the decimal point.
        let no_commas = cleaned.replace(',', "");
        if no_commas.matches('.').count() > 1 {
            keep_last_dot(&no_commas)
        } else {
            no_commas
        }
    };

    match normalized.parse::<f64>() {
        Ok(v) => format_italian_f64(v),
        Err(_) => "0,00".to_string(),
    }
}

/// Parse an Italian (or American, or plain) numeric string into an f64.
/// Never fails: non-parseable input yields 0.0.
pub fn parse_italian(value: &str) -> f64 {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '+' | '-'))
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }

    let normalized = if cleaned.contains(',') {
        // Comma present: every dot is a thousands separator, the last comma
        // is the decimal point.
        replace_last_comma(&cleaned.replace('.', ""))
    } else if cleaned.contains('.') {
        // Dot present, no comma: dots stay as the decimal point, commas (if
        // any slipped through) would have been thousands separators.
        cleaned
    } else {
        cleaned
    };

    normalized.parse::<f64>().unwrap_or(0.0)
}

fn keep_last_dot(s: &str) -> String {
    match s.rfind('.') {
        Some(pos) => {
            let mut out = s[..pos].replace('.', "");
            out.push_str(&s[pos..]);
            out
        }
        None => s.to_string(),
    }
}

fn replace_last_comma(s: &str) -> String {
    match s.rfind(',') {
        Some(pos) => {
            let mut out = String::with_capacity(s.len());
            out.push_str(&s[..pos].replace(',', ""));
            out.push('.');
            out.push_str(&s[pos + 1..]);
            out
        }
        None => s.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
