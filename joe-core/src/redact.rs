//! Redaction wrapper for values that must never be written to logs verbatim.

use std::fmt;

/// Wraps a secret value so `{:?}` and `{}` never print it directly.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_secret() {
        let pw = Redacted::new("s3cr3t-password".to_string());
        assert_eq!(format!("{pw:?}"), "<redacted>");
        assert_eq!(format!("{pw}"), "<redacted>");
        assert_eq!(pw.expose(), "s3cr3t-password");
    }
}
