use regex::Regex;

/// Include/exclude filter over proxy tags (or types).
///
/// A candidate is kept iff it matches `include` (or `include` is empty)
/// and does not match `exclude` (or `exclude` is empty). Patterns are
/// unanchored and case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct TagMatcher {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl TagMatcher {
    /// Compile a matcher; an empty pattern disables that side
    pub fn new(include: &str, exclude: &str) -> Result<Self, (&'static str, regex::Error)> {
        Self::build(include, exclude, Regex::new)
    }

    /// Like [`TagMatcher::new`], but patterns may also be written as
    /// `/pattern/flags` (see [`smart_regex`])
    pub fn smart(include: &str, exclude: &str) -> Result<Self, (&'static str, regex::Error)> {
        Self::build(include, exclude, smart_regex)
    }

    fn build(
        include: &str,
        exclude: &str,
        compile: fn(&str) -> Result<Regex, regex::Error>,
    ) -> Result<Self, (&'static str, regex::Error)> {
        let side = |pattern: &str| -> Result<Option<Regex>, regex::Error> {
            if pattern.is_empty() {
                Ok(None)
            } else {
                compile(pattern).map(Some)
            }
        };
        Ok(Self {
            include: side(include).map_err(|e| ("include", e))?,
            exclude: side(exclude).map_err(|e| ("exclude", e))?,
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |re| re.is_match(candidate));
        let excluded = self
            .exclude
            .as_ref()
            .map_or(false, |re| re.is_match(candidate));
        included && !excluded
    }
}

/// Compiles `pattern`, accepting the `/pattern/flags` literal form.
///
/// Supported flags are `i`, `m` and `s`; `g` and `u` are accepted and
/// ignored. Anything else is compiled as a plain pattern.
pub fn smart_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(body) = pattern.strip_prefix('/') {
        if let Some(end) = body.rfind('/') {
            let (inner, flags) = (&body[..end], &body[end + 1..]);
            if flags.chars().all(|c| "gimsu".contains(c)) {
                let inline: String = flags.chars().filter(|c| "ims".contains(*c)).collect();
                if inline.is_empty() {
                    return Regex::new(inner);
                }
                return Regex::new(&format!("(?{}){}", inline, inner));
            }
        }
    }
    Regex::new(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matcher_keeps_everything() {
        let matcher = TagMatcher::new("", "").unwrap();
        assert!(matcher.is_match("anything"));
        assert!(matcher.is_match(""));
    }

    #[test]
    fn test_include_only() {
        let matcher = TagMatcher::new("^A", "").unwrap();
        assert!(matcher.is_match("A-01"));
        assert!(!matcher.is_match("B-01"));
        // case-sensitive
        assert!(!matcher.is_match("a-01"));
    }

    #[test]
    fn test_include_and_exclude() {
        let matcher = TagMatcher::new("HK|SG", "IPLC").unwrap();
        assert!(matcher.is_match("HK 01"));
        assert!(matcher.is_match("SG 02"));
        assert!(!matcher.is_match("HK IPLC 03"));
        assert!(!matcher.is_match("JP 01"));
    }

    #[test]
    fn test_exclude_only() {
        let matcher = TagMatcher::new("", "expire|traffic").unwrap();
        assert!(!matcher.is_match("traffic left: 10G"));
        assert!(matcher.is_match("US 01"));
    }

    #[test]
    fn test_smart_regex() {
        assert!(smart_regex("/hk/i").unwrap().is_match("HK 01"));
        assert!(smart_regex("/^a/").unwrap().is_match("a1"));
        assert!(!smart_regex("/hk/").unwrap().is_match("HK"));
        // not a literal: the flags are not flags
        assert!(smart_regex("/a/b").unwrap().is_match("/a/b"));

        let matcher = TagMatcher::smart("/us|jp/i", "").unwrap();
        assert!(matcher.is_match("JP-02"));
        assert!(!matcher.is_match("HK-02"));
    }

    #[test]
    fn test_invalid_pattern_reports_side() {
        let err = TagMatcher::new("ok", "(").unwrap_err();
        assert_eq!(err.0, "exclude");
        let err = TagMatcher::new("[", "").unwrap_err();
        assert_eq!(err.0, "include");
    }
}
