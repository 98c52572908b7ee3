//! Name sanitization for metric names and tag keys. Tag values are never
//! touched.

use std::borrow::Cow;

/// `*` and `"` break the export format, so they are always replaced.
const ALWAYS_UNSAFE: [char; 2] = ['*', '"'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    dedot: bool,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self { dedot: true }
    }
}

impl Sanitizer {
    pub fn new(dedot: bool) -> Self {
        Self { dedot }
    }

    pub fn dedot(&self) -> bool {
        self.dedot
    }

    fn is_unsafe(&self, c: char) -> bool {
        ALWAYS_UNSAFE.contains(&c) || (self.dedot && c == '.')
    }

    /// Replace unsafe characters with `_`. Borrows when nothing changes.
    pub fn sanitize<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if !name.chars().any(|c| self.is_unsafe(c)) {
            return Cow::Borrowed(name);
        }
        Cow::Owned(
            name.chars()
                .map(|c| if self.is_unsafe(c) { '_' } else { c })
                .collect(),
        )
    }
}
