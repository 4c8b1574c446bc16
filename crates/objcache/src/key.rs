//! Cache entry keys.

use std::fmt;

/// Key of a cached object: one literal value, or an ordered tuple of
/// literal values for compound keys. Values use their SQL literal text so
/// keys derived from result rows and from notification statements compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn single(value: impl Into<String>) -> CacheKey {
        CacheKey(vec![value.into()])
    }

    pub fn compound(values: Vec<String>) -> CacheKey {
        debug_assert!(!values.is_empty());
        CacheKey(values)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}
