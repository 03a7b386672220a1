//! Identifier sanitizer.
//!
//! Container paths use `/` as the segment separator, so a `/` inside a group,
//! dataset or layer name splits it into two path segments on reload. We swap
//! every separator for a neutral substitute and leave everything else alone.
//!
//! The rewrite is a pure function of its input. Every definition site and
//! every reference site goes through the same `Sanitizer`, which is what keeps
//! renamed layers and their uses in agreement without a symbol table.

/// Reserved path separator of the container format.
pub const SEPARATOR: char = '/';

/// Replacement for [`SEPARATOR`].
pub const SUBSTITUTE: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    separator: char,
    substitute: char,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SEPARATOR, SUBSTITUTE)
    }
}

impl Sanitizer {
    pub const fn new(separator: char, substitute: char) -> Self {
        Self {
            separator,
            substitute,
        }
    }

    /// True if `raw` contains the separator, i.e. `sanitize` would change it.
    pub fn needs_sanitizing(&self, raw: &str) -> bool {
        raw.contains(self.separator)
    }

    /// Replace every separator in `raw` with the substitute.
    pub fn sanitize(&self, raw: &str) -> String {
        if !self.needs_sanitizing(raw) {
            return raw.to_string();
        }
        raw.chars()
            .map(|c| if c == self.separator { self.substitute } else { c })
            .collect()
    }

    /// Sanitize `value` in place. Returns true if it changed.
    pub fn sanitize_in_place(&self, value: &mut String) -> bool {
        if !self.needs_sanitizing(value) {
            return false;
        }
        *value = self.sanitize(value);
        true
    }
}

/// [`Sanitizer::sanitize`] with the default `/` -> `_` pair.
pub fn sanitize(raw: &str) -> String {
    Sanitizer::default().sanitize(raw)
}
