//! Path matching primitives for route classification.
//!
//! # Design Decisions
//! - Prefix matching respects segment boundaries (`/dashboardx` is not
//!   under `/dashboard`)
//! - Path matching is case-sensitive
//! - No regex, so matching stays linear in the table size

/// Matches a path prefix on segment boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True for the prefix itself and anything below it.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Split a leading locale segment off `path`.
///
/// Returns `(Some(locale), rest)` when the first segment is one of
/// `locales`; `rest` always starts with `/`.
pub fn split_locale<'a>(path: &'a str, locales: &[String]) -> (Option<&'a str>, &'a str) {
    let Some(after_slash) = path.strip_prefix('/') else {
        return (None, path);
    };
    let (first, rest) = match after_slash.find('/') {
        Some(idx) => (&after_slash[..idx], &after_slash[idx..]),
        None => (after_slash, ""),
    };
    if locales.iter().any(|l| l == first) {
        (Some(first), if rest.is_empty() { "/" } else { rest })
    } else {
        (None, path)
    }
}

/// Strip query string and fragment from a navigation target.
pub fn path_only(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}
