//! Cache Policy Module
//!
//! Glob-matched TTL/tag policies. Resolution order for a write is
//! explicit TTL, then the first matching policy's default, then the global
//! default.

use std::fmt;
use std::time::Duration;

use regex::Regex;

use crate::error::{CacheError, Result};

// == Glob Pattern ==
/// Redis-style glob: `*` any run, `?` one char, `[...]` a class (`[!...]`
/// negates), `\` escapes the next char.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| CacheError::InvalidKey(format!("bad pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobPattern").field(&self.source).finish()
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?s)^");
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(next) => out.push_str(&regex::escape(&next.to_string())),
                None => out.push_str(r"\\"),
            },
            '[' => {
                // An unterminated class is literal.
                match chars.clone().position(|c| c == ']') {
                    Some(end) if end > 0 => {
                        let class: String = chars.by_ref().take(end).collect();
                        chars.next();
                        out.push('[');
                        let body = class.strip_prefix('!').map_or_else(
                            || class.clone(),
                            |negated| format!("^{}", negated),
                        );
                        out.push_str(&body.replace('\\', r"\\"));
                        out.push(']');
                    }
                    _ => out.push_str(r"\["),
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

// == Cache Policy ==
/// Default TTL and tags for keys matching a pattern. Immutable once built.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub pattern: GlobPattern,
    pub default_ttl: Duration,
    pub tags: Vec<String>,
}

impl CachePolicy {
    pub fn new(pattern: &str, default_ttl: Duration, tags: &[&str]) -> Result<Self> {
        if default_ttl.is_zero() {
            return Err(CacheError::InvalidTtl(pattern.to_string()));
        }
        Ok(Self {
            pattern: GlobPattern::new(pattern)?,
            default_ttl,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
    }
}

// == Resolved Policy ==
/// Effective TTL and tags for a single write.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    pub ttl: Duration,
    pub tags: Vec<String>,
    pub matched_pattern: Option<String>,
}

// == Policy Set ==
/// Ordered policy list; the first matching policy wins.
#[derive(Debug, Clone)]
pub struct PolicySet {
    policies: Vec<CachePolicy>,
    default_ttl: Duration,
}

impl PolicySet {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            policies: Vec::new(),
            default_ttl,
        }
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Resolves TTL and tags for `key`.
    ///
    /// Fails with `InvalidTtl` when the explicit TTL or the global default
    /// is zero; nothing is ever stored without a positive TTL.
    pub fn resolve(&self, key: &str, explicit_ttl: Option<Duration>) -> Result<ResolvedPolicy> {
        let matched = self.policies.iter().find(|p| p.pattern.matches(key));

        let ttl = explicit_ttl
            .or_else(|| matched.map(|p| p.default_ttl))
            .unwrap_or(self.default_ttl);

        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl(key.to_string()));
        }

        Ok(ResolvedPolicy {
            ttl,
            tags: matched.map(|p| p.tags.clone()).unwrap_or_default(),
            matched_pattern: matched.map(|p| p.pattern.as_str().to_string()),
        })
    }
}

/// Policies registered for the platform keyspace at startup.
///
/// Keys look like `t:{tenant}:{component}:...`, hence the leading wildcard.
pub fn default_policies(default_ttl: Duration) -> Result<PolicySet> {
    Ok(PolicySet::new(default_ttl)
        .with_policy(CachePolicy::new(
            "t:*:validation:*",
            Duration::from_secs(3600),
            &["validation"],
        )?)
        .with_policy(CachePolicy::new(
            "t:*:pipeline:content:*",
            Duration::from_secs(3600),
            &["pipeline", "content"],
        )?)
        .with_policy(CachePolicy::new(
            "t:*:pipeline:result:*",
            Duration::from_secs(600),
            &["pipeline"],
        )?)
        .with_policy(CachePolicy::new(
            "t:*:gate:*",
            Duration::from_secs(60),
            &["gate"],
        )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_star_and_question() {
        let glob = GlobPattern::new("user:*:profile?").unwrap();
        assert!(glob.matches("user:42:profile1"));
        assert!(glob.matches("user::profileX"));
        assert!(!glob.matches("user:42:profile"));
        assert!(!glob.matches("account:42:profile1"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let glob = GlobPattern::new("a.b+(c)*").unwrap();
        assert!(glob.matches("a.b+(c)xyz"));
        assert!(!glob.matches("aXb+(c)"));
    }

    #[test]
    fn test_glob_character_class() {
        let glob = GlobPattern::new("scene:[abc]1").unwrap();
        assert!(glob.matches("scene:a1"));
        assert!(!glob.matches("scene:d1"));

        let negated = GlobPattern::new("scene:[!abc]1").unwrap();
        assert!(negated.matches("scene:d1"));
        assert!(!negated.matches("scene:a1"));
    }

    #[test]
    fn test_glob_unterminated_class_is_literal() {
        let glob = GlobPattern::new("weird[key").unwrap();
        assert!(glob.matches("weird[key"));
    }

    #[test]
    fn test_glob_backslash_escape() {
        let glob = GlobPattern::new(r"literal\*star").unwrap();
        assert!(glob.matches("literal*star"));
        assert!(!glob.matches("literalXstar"));
    }

    #[test]
    fn test_resolution_order() {
        let set = PolicySet::new(Duration::from_secs(300))
            .with_policy(CachePolicy::new("quiz:*", Duration::from_secs(60), &["quiz"]).unwrap());

        let explicit = set.resolve("quiz:1", Some(Duration::from_secs(5))).unwrap();
        assert_eq!(explicit.ttl, Duration::from_secs(5));
        assert_eq!(explicit.tags, vec!["quiz".to_string()]);

        let pattern = set.resolve("quiz:1", None).unwrap();
        assert_eq!(pattern.ttl, Duration::from_secs(60));
        assert_eq!(pattern.matched_pattern.as_deref(), Some("quiz:*"));

        let global = set.resolve("scene:1", None).unwrap();
        assert_eq!(global.ttl, Duration::from_secs(300));
        assert!(global.matched_pattern.is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let set = PolicySet::new(Duration::from_secs(300))
            .with_policy(CachePolicy::new("a:b:*", Duration::from_secs(10), &[]).unwrap())
            .with_policy(CachePolicy::new("a:*", Duration::from_secs(20), &[]).unwrap());

        assert_eq!(set.resolve("a:b:c", None).unwrap().ttl, Duration::from_secs(10));
        assert_eq!(set.resolve("a:x", None).unwrap().ttl, Duration::from_secs(20));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let set = PolicySet::new(Duration::from_secs(300));
        assert!(matches!(
            set.resolve("k", Some(Duration::ZERO)),
            Err(CacheError::InvalidTtl(_))
        ));
        assert!(CachePolicy::new("k:*", Duration::ZERO, &[]).is_err());
    }

    #[test]
    fn test_default_policies_cover_components() {
        let set = default_policies(Duration::from_secs(300)).unwrap();
        assert_eq!(set.len(), 4);
        let resolved = set.resolve("t:springfield:validation:abc", None).unwrap();
        assert_eq!(resolved.ttl, Duration::from_secs(3600));
        assert_eq!(resolved.tags, vec!["validation".to_string()]);
    }
}
