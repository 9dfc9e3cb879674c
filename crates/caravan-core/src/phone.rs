//! Phone number normalization
//!
//! Clients enter phone numbers in whatever format they like, so matching
//! works on digits. The stored normalized form keeps every digit plus a
//! leading `+`; duplicate comparison uses only the last seven digits, which
//! ignores country-code and trunk-prefix differences.

/// Length of the digit suffix compared when matching phone numbers
const TAIL_DIGITS: usize = 7;

/// Normalize a phone number to a leading `+` (if present) followed by its
/// digits. Returns `None` when the input has no digits at all.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

/// The last seven digits of a phone number, used for duplicate comparison.
/// Returns `None` when the input has no digits.
#[must_use]
pub fn phone_tail(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(TAIL_DIGITS);
    Some(digits[start..].to_string())
}
