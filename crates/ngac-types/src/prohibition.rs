//! Prohibition naming.
//!
//! A prohibition is the negative counterpart of an operation. It is an
//! ordinary operation whose identifier is the original identifier prefixed
//! with `~`. Callers may not create such identifiers directly.

/// Prefix that marks an operation identifier as a prohibition.
pub const PROHIBITION_PREFIX: char = '~';

/// Naming rules for prohibitions.
pub struct Prohibition;

impl Prohibition {
    /// Returns the negated name of `operation`.
    pub fn on(operation: &str) -> String {
        format!("{PROHIBITION_PREFIX}{operation}")
    }

    pub fn is_prohibition_name(identifier: &str) -> bool {
        identifier.starts_with(PROHIBITION_PREFIX)
    }

    /// Returns the operation a prohibition negates, or `None` if the
    /// identifier is not a prohibition.
    pub fn negated_operation(identifier: &str) -> Option<&str> {
        identifier.strip_prefix(PROHIBITION_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_prefixes_name() {
        assert_eq!(Prohibition::on("read"), "~read");
        assert!(Prohibition::is_prohibition_name(&Prohibition::on("read")));
        assert!(!Prohibition::is_prohibition_name("read"));
    }

    #[test]
    fn test_negated_operation() {
        assert_eq!(Prohibition::negated_operation("~write"), Some("write"));
        assert_eq!(Prohibition::negated_operation("write"), None);
    }
}
