//! Non-finite number literals in descriptor text.
//!
//! Python's `json.dumps` writes `NaN`, `Infinity` and `-Infinity` for
//! non-finite floats, and Keras descriptors carry them in float config fields.
//! They are not JSON, so before parsing each bare literal is swapped for a
//! marker string, and after serialization the marker strings are swapped back.
//!
//! The marker is a string starting with NUL. Raw control characters are not
//! valid inside JSON strings, so a NUL can only come from a `\u0000` escape;
//! text that already contains one is passed through unmasked.

use std::borrow::Cow;

/// Longest first, so `-Infinity` is not read as `-` followed by `Infinity`.
const LITERALS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Escaped NUL as it appears in JSON text, and as serde_json writes it.
const MARK: &str = "\\u0000";

/// Replace every bare non-finite literal outside string values with a marker
/// string.
pub(crate) fn mask(text: &str) -> Cow<'_, str> {
    if text.contains(MARK) || !(text.contains("NaN") || text.contains("Infinity")) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(lit) = LITERALS.iter().find(|lit| rest.starts_with(**lit)) {
            out.push('"');
            out.push_str(MARK);
            out.push_str(lit);
            out.push('"');
            rest = &rest[lit.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// Turn marker strings in serialized output back into bare literals.
pub(crate) fn unmask(text: &str) -> Cow<'_, str> {
    if !text.contains(MARK) {
        return Cow::Borrowed(text);
    }
    let mut out = text.to_string();
    for lit in LITERALS {
        out = out.replace(&format!("\"{MARK}{lit}\""), lit);
    }
    Cow::Owned(out)
}
