//! Derivation of valid SIO identifiers from arbitrary labels.

/// Prepended when a sanitized name would not start with a letter or `_`.
pub const NAME_MARKER: char = 'A';

/// Map an arbitrary label to a valid SIO name (a valid C-style identifier).
///
/// Every `.`, `\` and `/` becomes `_`, every other character that is not
/// ASCII alphanumeric or `_` is dropped, and [`NAME_MARKER`] is prepended
/// when the result does not start with a letter or underscore.  The
/// transform is total and idempotent.
pub fn valid_sio_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .filter_map(|c| match c {
            '.' | '\\' | '/' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect();

    let starts_ok = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok {
        name.insert(0, NAME_MARKER);
    }
    name
}
