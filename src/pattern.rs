//! Pattern compilation and safety vetting.
//!
//! Two engines back regex rules: the linear-time `regex` crate by default,
//! and `fancy_regex` only when a pattern needs lookaround or backreferences.
//! Literal rules bypass the regex engines entirely.
//!
//! Custom patterns from project config additionally pass a safety check that
//! rejects catastrophic-backtracking shapes and overly permissive patterns
//! before they ever reach an engine.

use crate::rules::PatternType;
use std::fmt;

/// A compiled regex that auto-selects between linear-time and backtracking
/// engines. The linear engine guarantees O(n) matching; the backtracking
/// engine is only used for patterns the linear engine cannot express.
#[derive(Debug)]
pub enum CompiledRegex {
    Linear(regex::Regex),
    Backtracking(fancy_regex::Regex),
}

impl CompiledRegex {
    /// Compile a pattern, auto-selecting the appropriate engine.
    ///
    /// # Errors
    /// Returns an error string if the pattern fails to compile.
    pub fn new(pattern: &str) -> Result<Self, String> {
        if needs_backtracking_engine(pattern) {
            fancy_regex::Regex::new(pattern)
                .map(Self::Backtracking)
                .map_err(|e| format!("fancy_regex compile error: {e}"))
        } else {
            regex::Regex::new(pattern)
                .map(Self::Linear)
                .map_err(|e| format!("regex compile error: {e}"))
        }
    }

    /// Check if the pattern matches the text.
    ///
    /// For the backtracking engine, returns `false` on execution errors.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Linear(re) => re.is_match(text),
            Self::Backtracking(re) => re.is_match(text).unwrap_or(false),
        }
    }

    /// The first matched substring, if any.
    ///
    /// For the backtracking engine, returns `None` on execution errors.
    #[must_use]
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Self::Linear(re) => re.find(text).map(|m| m.as_str()),
            Self::Backtracking(re) => re.find(text).ok().flatten().map(|m| m.as_str()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear(re) => re.as_str(),
            Self::Backtracking(re) => re.as_str(),
        }
    }

    #[must_use]
    pub const fn uses_backtracking(&self) -> bool {
        matches!(self, Self::Backtracking(_))
    }
}

/// Check if a pattern requires the backtracking engine.
///
/// Heuristic on syntax: lookahead `(?=`/`(?!`, lookbehind `(?<=`/`(?<!`,
/// atomic groups `(?>`, possessive quantifiers, and backreferences `\1`-`\9`.
/// False positives just pick the slower engine.
#[must_use]
pub fn needs_backtracking_engine(pattern: &str) -> bool {
    if pattern.contains("(?=")
        || pattern.contains("(?!")
        || pattern.contains("(?<=")
        || pattern.contains("(?<!")
        || pattern.contains("(?>")
    {
        return true;
    }

    if pattern.contains("*+")
        || pattern.contains("++")
        || pattern.contains("?+")
        || pattern.contains("}+")
    {
        return true;
    }

    let bytes = pattern.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'\\' {
            let next = bytes[i + 1];
            if next.is_ascii_digit() && next != b'0' {
                return true;
            }
        }
    }

    false
}

/// A rule pattern ready for matching.
#[derive(Debug)]
pub enum CompiledPattern {
    /// Plain substring containment.
    Literal(String),
    Regex(CompiledRegex),
}

impl CompiledPattern {
    /// Compile a rule pattern according to its declared type.
    ///
    /// # Errors
    /// Returns [`PatternError::InvalidRegex`] if a regex pattern fails to
    /// compile. Literal patterns never fail.
    pub fn compile(pattern: &str, pattern_type: PatternType) -> Result<Self, PatternError> {
        match pattern_type {
            PatternType::Literal => Ok(Self::Literal(pattern.to_string())),
            PatternType::Regex => CompiledRegex::new(pattern)
                .map(Self::Regex)
                .map_err(|message| PatternError::InvalidRegex { message }),
        }
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Literal(needle) => text.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(text),
        }
    }

    /// The substring of `text` that the pattern matched, if it matches.
    ///
    /// A literal pattern matches itself; a regex pattern reports its first
    /// match.
    #[must_use]
    pub fn matched<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Self::Literal(needle) => text
                .find(needle.as_str())
                .map(|start| &text[start..start + needle.len()]),
            Self::Regex(re) => re.find(text),
        }
    }
}

/// Why a pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    InvalidRegex { message: String },
    OverlyPermissive,
    NestedQuantifiers,
    OverlappingAlternation { first: String, second: String },
    ExcessiveRepetition,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { message } => write!(f, "invalid regex pattern: {message}"),
            Self::OverlyPermissive => {
                write!(f, "pattern is overly permissive and would match everything")
            }
            Self::NestedQuantifiers => write!(
                f,
                "pattern contains nested quantifiers which can cause catastrophic backtracking"
            ),
            Self::OverlappingAlternation { first, second } => write!(
                f,
                "pattern contains overlapping alternation ({first}|{second}) which can cause catastrophic backtracking"
            ),
            Self::ExcessiveRepetition => write!(
                f,
                "pattern contains an excessive repetition limit which can cause performance issues"
            ),
        }
    }
}

impl std::error::Error for PatternError {}

/// Vet a pattern before accepting it into the effective rule set.
///
/// Literal patterns are always safe. Regex patterns must compile and must
/// not exhibit known ReDoS shapes: overly permissive catch-alls, overlapping
/// quantified alternations, nested/consecutive quantifiers, or huge
/// repetition bounds.
///
/// # Errors
/// Returns the first [`PatternError`] found.
pub fn validate_pattern_safety(
    pattern: &str,
    pattern_type: PatternType,
) -> Result<(), PatternError> {
    if pattern_type == PatternType::Literal {
        return Ok(());
    }

    // Compile first so syntax errors win over shape complaints.
    CompiledRegex::new(pattern).map_err(|message| PatternError::InvalidRegex { message })?;

    if matches!(pattern, "^.*$" | ".*" | "^.+$") {
        return Err(PatternError::OverlyPermissive);
    }

    check_overlapping_alternation(pattern)?;

    if has_consecutive_quantifiers(pattern) {
        return Err(PatternError::NestedQuantifiers);
    }

    if has_quantified_group_quantifier(pattern) {
        return Err(PatternError::NestedQuantifiers);
    }

    if has_excessive_repetition(pattern) {
        return Err(PatternError::ExcessiveRepetition);
    }

    Ok(())
}

const fn is_quantifier_byte(b: u8) -> bool {
    matches!(b, b'*' | b'+' | b'?' | b'{')
}

/// Reject `(a|aa)+` shapes: a quantified group whose alternatives share a
/// prefix. Only the first quantified alternation group is inspected.
fn check_overlapping_alternation(pattern: &str) -> Result<(), PatternError> {
    let bytes = pattern.as_bytes();
    for (open, &b) in bytes.iter().enumerate() {
        if b != b'(' {
            continue;
        }
        let Some(rel_close) = bytes[open + 1..].iter().position(|&c| c == b')') else {
            continue;
        };
        let close = open + 1 + rel_close;
        let content = &pattern[open + 1..close];
        if content.is_empty() || !content.contains('|') {
            continue;
        }
        let quantified = matches!(bytes.get(close + 1), Some(b'*' | b'+' | b'?'));
        if !quantified {
            continue;
        }

        let options: Vec<&str> = content.split('|').collect();
        for (i, first) in options.iter().enumerate() {
            for second in &options[i + 1..] {
                if first.starts_with(second) || second.starts_with(first) {
                    return Err(PatternError::OverlappingAlternation {
                        first: (*first).to_string(),
                        second: (*second).to_string(),
                    });
                }
            }
        }
        // Mirror the single-occurrence search: only the first candidate group
        // is checked for overlap.
        return Ok(());
    }
    Ok(())
}

/// Reject adjacent quantifier characters (`a++`, `a*?{`, ...).
fn has_consecutive_quantifiers(pattern: &str) -> bool {
    pattern
        .as_bytes()
        .windows(2)
        .any(|w| is_quantifier_byte(w[0]) && is_quantifier_byte(w[1]))
}

/// Reject `(a+)+` shapes: a group whose body ends in quantifiers, itself
/// followed by a quantifier. Alternation groups are handled separately.
fn has_quantified_group_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    for (open, &b) in bytes.iter().enumerate() {
        if b != b'(' {
            continue;
        }
        let Some(rel_close) = bytes[open + 1..].iter().position(|&c| c == b')') else {
            continue;
        };
        let close = open + 1 + rel_close;
        if !matches!(bytes.get(close + 1), Some(&c) if is_quantifier_byte(c)) {
            continue;
        }

        let content = &bytes[open + 1..close];
        let trailing = content
            .iter()
            .rev()
            .take_while(|&&c| is_quantifier_byte(c))
            .count();
        if trailing == 0 {
            continue;
        }
        let body = &content[..content.len() - trailing];
        if !body.is_empty() && !body.iter().any(|&c| matches!(c, b'|' | b'*' | b')')) {
            return true;
        }
    }
    false
}

/// Reject repetition bounds that are large enough to stall matching:
/// `{1000}`, `{500,}`, `{0,10000}` and similar.
fn has_excessive_repetition(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let Some(rel_close) = bytes[i + 1..].iter().position(|&c| c == b'}') else {
            break;
        };
        let close = i + 1 + rel_close;
        let content = &pattern[i + 1..close];

        if let Some((low, high)) = content.split_once(',') {
            let digits_only =
                low.bytes().all(|c| c.is_ascii_digit()) && high.bytes().all(|c| c.is_ascii_digit());
            if digits_only && (low.len() >= 3 || high.len() >= 4) {
                return true;
            }
        } else if !content.is_empty()
            && content.bytes().all(|c| c.is_ascii_digit())
            && content.len() >= 4
        {
            return true;
        }

        i = close + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_engine_selection() {
        let re = CompiledRegex::new(r"rm\s+-rf").unwrap();
        assert!(!re.uses_backtracking());
        assert!(re.is_match("rm -rf /"));
    }

    #[test]
    fn test_backtracking_engine_selection() {
        let re = CompiledRegex::new(r"git\s+push(?=.*--force)").unwrap();
        assert!(re.uses_backtracking());
        assert!(re.is_match("git push --force"));
        assert!(!re.is_match("git push"));
    }

    #[test]
    fn test_needs_backtracking_detection() {
        assert!(!needs_backtracking_engine(r"git\s+status"));
        assert!(!needs_backtracking_engine(r"\d+\.\d+"));
        assert!(needs_backtracking_engine(r"(?=lookahead)"));
        assert!(needs_backtracking_engine(r"(?<!behind)"));
        assert!(needs_backtracking_engine(r"(foo)\1"));
    }

    #[test]
    fn test_literal_pattern_substring() {
        let p = CompiledPattern::compile("drop table", PatternType::Literal).unwrap();
        assert!(p.is_match("psql -c 'drop table users'"));
        assert!(!p.is_match("drop  table"));
    }

    #[test]
    fn test_literal_never_interpreted_as_regex() {
        let p = CompiledPattern::compile("a.*b", PatternType::Literal).unwrap();
        assert!(p.is_match("xx a.*b yy"));
        assert!(!p.is_match("a123b"));
    }

    #[test]
    fn test_matched_reports_regex_match_text() {
        let p = CompiledPattern::compile(r"(?i)\brm\s+-rf?\s+/", PatternType::Regex).unwrap();
        assert_eq!(p.matched("sudo rm -rf /etc"), Some("rm -rf /"));
        assert_eq!(p.matched("ls -la"), None);
    }

    #[test]
    fn test_matched_reports_literal_needle() {
        let p = CompiledPattern::compile("drop table", PatternType::Literal).unwrap();
        assert_eq!(p.matched("psql -c 'drop table users'"), Some("drop table"));
        assert_eq!(p.matched("create table"), None);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = validate_pattern_safety("(unclosed", PatternType::Regex).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_literal_always_safe() {
        assert!(validate_pattern_safety("(unclosed", PatternType::Literal).is_ok());
        assert!(validate_pattern_safety(".*", PatternType::Literal).is_ok());
    }

    #[test]
    fn test_overly_permissive_rejected() {
        for p in ["^.*$", ".*", "^.+$"] {
            assert_eq!(
                validate_pattern_safety(p, PatternType::Regex),
                Err(PatternError::OverlyPermissive),
                "pattern {p} should be rejected"
            );
        }
    }

    #[test]
    fn test_overlapping_alternation_rejected() {
        let err = validate_pattern_safety("(a|aa)+$", PatternType::Regex).unwrap_err();
        assert!(matches!(err, PatternError::OverlappingAlternation { .. }));
    }

    #[test]
    fn test_non_overlapping_alternation_allowed() {
        assert!(validate_pattern_safety("(foo|bar)+", PatternType::Regex).is_ok());
    }

    #[test]
    fn test_nested_quantifier_rejected() {
        assert_eq!(
            validate_pattern_safety("(a+)+", PatternType::Regex),
            Err(PatternError::NestedQuantifiers)
        );
        assert_eq!(
            validate_pattern_safety("(b*)*", PatternType::Regex),
            Err(PatternError::NestedQuantifiers)
        );
    }

    #[test]
    fn test_excessive_repetition_rejected() {
        assert_eq!(
            validate_pattern_safety("a{10000}", PatternType::Regex),
            Err(PatternError::ExcessiveRepetition)
        );
        assert_eq!(
            validate_pattern_safety("a{500,}", PatternType::Regex),
            Err(PatternError::ExcessiveRepetition)
        );
        assert_eq!(
            validate_pattern_safety("a{2,50000}", PatternType::Regex),
            Err(PatternError::ExcessiveRepetition)
        );
    }

    #[test]
    fn test_small_repetition_allowed() {
        assert!(validate_pattern_safety("a{2,20}", PatternType::Regex).is_ok());
        assert!(validate_pattern_safety(r"[0-9A-Z]{16}", PatternType::Regex).is_ok());
    }

    #[test]
    fn test_builtin_style_patterns_pass() {
        // Representative shapes from the built-in catalog.
        for p in [
            r"(?i)\brm\s+-rf?\s+/",
            r"(?i)\biptables\s+-F",
            r"(?i)https?://(127\.|10\.|192\.168\.)",
        ] {
            assert!(
                validate_pattern_safety(p, PatternType::Regex).is_ok(),
                "pattern {p} should pass"
            );
        }
    }
}
