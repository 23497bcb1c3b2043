//! Route pattern matching.
//!
//! Plugins and middleware are scoped to request paths with simple patterns:
//!
//! | Pattern | Meaning | Example |
//! |---------|---------|---------|
//! | `/api/health` | exact path | matches only `/api/health` |
//! | `/api/*` | `*` matches any characters | matches `/api/users`, `/api/a/b` |
//! | `/api/` | trailing `/` is a prefix | matches `/api/anything` |
//!
//! Literal parts of wildcard patterns are escaped before being compiled into
//! a regular expression, so `/v1.0/*` does not match `/v1x0/users`.
//! Patterns longer than [`MAX_PATTERN_LEN`] bytes are rejected.

use regex::Regex;
use thiserror::Error;

/// The wildcard token in route patterns.
pub const WILDCARD: char = '*';

/// Longest accepted route pattern, in bytes.
pub const MAX_PATTERN_LEN: usize = 1024;

/// Errors raised while compiling a route pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern exceeds [`MAX_PATTERN_LEN`].
    #[error("Route pattern is {len} bytes long, the limit is {max}")]
    TooLong {
        /// Length of the pattern.
        len: usize,
        /// The limit.
        max: usize,
    },

    /// The wildcard pattern could not be compiled.
    #[error("Route pattern '{pattern}' failed to compile: {source}")]
    Regex {
        /// The pattern as written.
        pattern: String,
        /// Error raised by the regex compiler.
        #[source]
        source: regex::Error,
    },
}

/// Returns `true` if `path` matches `pattern`.
///
/// Rules are tried in order: exact equality, wildcard, trailing-slash prefix.
/// Anything else does not match. A pattern that fails to compile only
/// matches itself.
///
/// This compiles wildcard patterns on every call. Registries hold
/// precompiled [`RoutePattern`]s instead.
///
/// # Example
///
/// ```
/// use atelier_plugins::matcher::matches;
///
/// assert!(matches("/api/users", "/api/*"));
/// assert!(matches("/api/anything", "/api/"));
/// assert!(matches("/api/health", "/api/health"));
/// assert!(!matches("/other", "/api/*"));
/// ```
#[must_use]
pub fn matches(path: &str, pattern: &str) -> bool {
    RoutePattern::new(pattern).map_or(path == pattern, |compiled| compiled.matches(path))
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Exact,
    Prefix,
    Wildcard(Regex),
}

impl RoutePattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// - [`PatternError::TooLong`] if the pattern exceeds [`MAX_PATTERN_LEN`]
    /// - [`PatternError::Regex`] if the wildcard pattern does not compile
    pub fn new(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let raw = pattern.into();
        if raw.len() > MAX_PATTERN_LEN {
            return Err(PatternError::TooLong {
                len: raw.len(),
                max: MAX_PATTERN_LEN,
            });
        }
        let kind = if raw.contains(WILDCARD) {
            let regex = compile_wildcard(&raw).map_err(|source| PatternError::Regex {
                pattern: raw.clone(),
                source,
            })?;
            PatternKind::Wildcard(regex)
        } else if raw.ends_with('/') {
            PatternKind::Prefix
        } else {
            PatternKind::Exact
        };
        Ok(Self { raw, kind })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if `path` matches this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if path == self.raw {
            return true;
        }
        match &self.kind {
            PatternKind::Wildcard(regex) => regex.is_match(path),
            PatternKind::Prefix => path.starts_with(&self.raw),
            PatternKind::Exact => false,
        }
    }
}

/// Builds an anchored regex where each `*` becomes `.*` and everything else
/// is matched literally.
fn compile_wildcard(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
}

/// An allow-list / deny-list pair of route patterns.
///
/// A path is accepted when there is no allow-list or it matches some allow
/// pattern, and it matches no deny pattern. The deny-list always wins.
#[derive(Debug, Clone, Default)]
pub struct RouteFilter {
    include: Option<Vec<RoutePattern>>,
    exclude: Option<Vec<RoutePattern>>,
}

impl RouteFilter {
    /// Creates a filter that accepts every path.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Compiles a filter from optional pattern lists.
    ///
    /// # Errors
    ///
    /// Returns the first [`PatternError`] raised by either list.
    pub fn new(
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<Self, PatternError> {
        let compile = |patterns: &[String]| -> Result<Vec<RoutePattern>, PatternError> {
            patterns.iter().map(RoutePattern::new).collect()
        };
        Ok(Self {
            include: include.map(compile).transpose()?,
            exclude: exclude.map(compile).transpose()?,
        })
    }

    /// Returns `true` if the filter accepts `path`.
    #[must_use]
    pub fn applies_to(&self, path: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |patterns| patterns.iter().any(|p| p.matches(path)));

        included
            && !self
                .exclude
                .as_ref()
                .is_some_and(|patterns| patterns.iter().any(|p| p.matches(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_wildcard_pattern() {
        assert!(matches("/api/users", "/api/*"));
        assert!(matches("/api/a/b", "/api/*"));
        assert!(matches("/api/", "/api/*"));
        assert!(!matches("/other", "/api/*"));
        assert!(!matches("/api", "/api/*"));
    }

    #[test]
    fn test_wildcard_in_the_middle() {
        assert!(matches("/api/posts/42/comments", "/api/*/comments"));
        assert!(!matches("/api/posts/42/likes", "/api/*/comments"));
    }

    #[test]
    fn test_prefix_pattern() {
        assert!(matches("/api/anything", "/api/"));
        assert!(matches("/api/a/b/c", "/api/"));
        assert!(matches("/api/", "/api/"));
        assert!(!matches("/api", "/api/"));
        assert!(!matches("/apix/", "/api/"));
    }

    #[test]
    fn test_exact_pattern() {
        assert!(matches("/api/health", "/api/health"));
        assert!(!matches("/api/health/deep", "/api/health"));
        assert!(!matches("/api/healthz", "/api/health"));
    }

    #[test]
    fn test_literal_parts_are_escaped() {
        assert!(matches("/v1.0/users", "/v1.0/*"));
        assert!(!matches("/v1x0/users", "/v1.0/*"));
        assert!(matches("/a+b/c", "/a+b/*"));
        assert!(!matches("/aab/c", "/a+b/*"));
        assert!(matches("/(x)/y", "/(x)/*"));
    }

    #[test]
    fn test_pattern_as_str() {
        assert_eq!(RoutePattern::new("/api/*").unwrap().as_str(), "/api/*");
    }

    #[test]
    fn test_overlong_pattern_rejected() {
        let pattern = "/a*".repeat(MAX_PATTERN_LEN);
        let err = RoutePattern::new(pattern.as_str()).unwrap_err();
        assert!(matches!(
            err,
            PatternError::TooLong { len, max: MAX_PATTERN_LEN } if len == pattern.len()
        ));

        assert!(!matches("/a/b", &pattern));
        assert!(matches(&pattern, &pattern));
    }

    #[test]
    fn test_pattern_at_limit_compiles() {
        let mut pattern = "/a*".repeat(MAX_PATTERN_LEN / 3);
        pattern.push_str(&"b".repeat(MAX_PATTERN_LEN - pattern.len()));
        assert_eq!(pattern.len(), MAX_PATTERN_LEN);
        assert!(RoutePattern::new(pattern).is_ok());
    }

    #[test]
    fn test_filter_rejects_overlong_exclude_pattern() {
        let routes = strings(&["/api/*"]);
        let exclude = vec!["*".repeat(MAX_PATTERN_LEN + 1)];
        assert!(RouteFilter::new(Some(&routes), Some(&exclude)).is_err());
    }

    #[test]
    fn test_filter_without_lists_accepts_everything() {
        let filter = RouteFilter::any();
        assert!(filter.applies_to("/"));
        assert!(filter.applies_to("/api/users"));
    }

    #[test]
    fn test_filter_allow_list() {
        let routes = strings(&["/api/*", "/health"]);
        let filter = RouteFilter::new(Some(&routes), None).unwrap();
        assert!(filter.applies_to("/api/users"));
        assert!(filter.applies_to("/health"));
        assert!(!filter.applies_to("/admin"));
    }

    #[test]
    fn test_filter_deny_list_wins() {
        let routes = strings(&["/api/*"]);
        let exclude = strings(&["/api/internal/*"]);
        let filter = RouteFilter::new(Some(&routes), Some(&exclude)).unwrap();
        assert!(filter.applies_to("/api/users"));
        assert!(!filter.applies_to("/api/internal/stats"));
    }

    #[test]
    fn test_filter_deny_list_only() {
        let exclude = strings(&["/health"]);
        let filter = RouteFilter::new(None, Some(&exclude)).unwrap();
        assert!(filter.applies_to("/api/users"));
        assert!(!filter.applies_to("/health"));
    }

    #[test]
    fn test_filter_empty_allow_list_accepts_nothing() {
        let filter = RouteFilter::new(Some(&[]), None).unwrap();
        assert!(!filter.applies_to("/api/users"));
    }

    proptest! {
        #[test]
        fn prop_literal_patterns_match_only_themselves(
            pattern in "/[a-z.+?()\\[\\]^$|{}]{1,12}",
            path in "/[a-z.+?()\\[\\]^$|{}]{1,12}",
        ) {
            prop_assert_eq!(matches(&path, &pattern), path == pattern);
        }

        #[test]
        fn prop_metacharacters_before_wildcard_are_literal(
            literal in "/[a-z.+?()\\[\\]^$|{}]{1,12}",
            path in "/[a-z.+?()\\[\\]^$|{}]{1,16}",
        ) {
            let pattern = format!("{literal}*");
            prop_assert_eq!(matches(&path, &pattern), path.starts_with(&literal));
        }

        #[test]
        fn prop_prefix_pattern_matches_every_extension(
            prefix in "/[a-z0-9.]{1,8}/",
            rest in "[a-z0-9./]{0,16}",
        ) {
            let path = format!("{prefix}{rest}");
            prop_assert!(matches(&path, &prefix));
        }

        #[test]
        fn prop_trailing_wildcard_matches_like_prefix(
            base in "/[a-z0-9.]{1,8}/",
            rest in "[a-z0-9./]{0,16}",
        ) {
            let path = format!("{base}{rest}");
            let wildcard = format!("{base}*");
            prop_assert_eq!(matches(&path, &wildcard), matches(&path, &base));
        }
    }
}
