/// Keep only the ASCII digits of `value`.
///
/// This is both the input sanitizer for the amount field and the inverse of
/// [`format_digits`]: stripping a formatted string recovers the plain digits.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a digit string for display with id-ID thousands grouping,
/// e.g. `"125000"` becomes `"125.000"`.
///
/// Non-digits are ignored and leading zeros collapse, so the result always
/// round-trips through [`digits_only`] to a canonical digit string. An input
/// with no digits at all formats as `""`.
pub fn format_digits(value: &str) -> String {
    let raw = digits_only(value);
    if raw.is_empty() {
        return String::new();
    }
    let trimmed = raw.trim_start_matches('0');
    let canonical = if trimmed.is_empty() { "0" } else { trimmed };

    let mut grouped = String::with_capacity(canonical.len() + canonical.len() / 3);
    for (i, c) in canonical.chars().rev().enumerate() {
        if i != 0 && i % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    grouped.chars().rev().collect()
}
