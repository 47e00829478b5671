//! Validation rule model.
//!
//! Rules are declarative: a pattern (regex or literal substring), a severity
//! that drives the block/warn decision, a priority for tie-breaking, and
//! applicability filters (tool kinds, evaluation context). Rules never decide
//! blocking themselves; the evaluator interprets the winning match.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a rule violation is. Ordering is ascending, so `Critical`
/// compares greatest; the detector picks the highest-severity match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable label used in audit events and CLI output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Evaluation order among rules of equal severity. `P0` compares greatest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    P3,
    P2,
    P1,
    P0,
}

impl Priority {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::P0 => "p0",
            Self::P1 => "p1",
            Self::P2 => "p2",
            Self::P3 => "p3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a rule's pattern is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    #[default]
    Regex,
    /// Plain substring containment, no regex semantics.
    Literal,
}

/// Which slice of a tool invocation a rule inspects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleContext {
    Command,
    FileContent,
    FilePath,
    #[default]
    All,
}

/// Tool kinds covered by the gate. Serialized names match the hook
/// protocol's `tool_name` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Bash,
    Write,
    Edit,
    Read,
    WebFetch,
    WebSearch,
}

impl ToolKind {
    /// Map a hook `tool_name` to a kind. Unknown tools return `None` and are
    /// never validated.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Bash" => Some(Self::Bash),
            "Write" => Some(Self::Write),
            "Edit" => Some(Self::Edit),
            "Read" => Some(Self::Read),
            "WebFetch" => Some(Self::WebFetch),
            "WebSearch" => Some(Self::WebSearch),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bash => "Bash",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::Read => "Read",
            Self::WebFetch => "WebFetch",
            Self::WebSearch => "WebSearch",
        }
    }

    /// Whether the tool writes files (and therefore honors allowed-paths).
    #[must_use]
    pub const fn is_file_oriented(self) -> bool {
        matches!(self, Self::Write | Self::Edit)
    }
}

/// A single validation rule.
///
/// Custom rules deserialized from project config use the same shape; unknown
/// keys are rejected so typos surface as config errors instead of silently
/// weakening a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ValidationRule {
    /// Stable identifier, `[a-zA-Z0-9_-]+`. Unique within the effective set.
    pub rule_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(default)]
    pub pattern_type: PatternType,
    pub severity: Severity,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    /// Tool kinds this rule applies to. Empty means all tools.
    #[serde(default)]
    pub tool_kinds: Vec<ToolKind>,
    #[serde(default)]
    pub context: RuleContext,
    /// Human-readable explanation shown when the rule fires.
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub category: String,
}

const fn default_priority() -> Priority {
    Priority::P2
}

const fn default_enabled() -> bool {
    true
}

impl ValidationRule {
    #[must_use]
    pub fn applies_to_tool(&self, kind: ToolKind) -> bool {
        self.tool_kinds.is_empty() || self.tool_kinds.contains(&kind)
    }

    #[must_use]
    pub fn applies_in_context(&self, context: RuleContext) -> bool {
        self.context == RuleContext::All || self.context == context
    }

    /// Critical findings can never be overridden by a token.
    #[must_use]
    pub fn can_override(&self) -> bool {
        self.severity != Severity::Critical
    }
}

/// The detector's winning match for one piece of text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleMatch {
    pub rule_id: String,
    pub severity: Severity,
    /// The rule's message, surfaced as the decision reason.
    pub reason: String,
    pub suggestions: Vec<String>,
    /// The substring of the input that the rule's pattern matched.
    pub matched_text: String,
    pub can_override: bool,
}

impl RuleMatch {
    #[must_use]
    pub fn from_rule(rule: &ValidationRule, matched_text: &str) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            severity: rule.severity,
            reason: rule.message.clone(),
            suggestions: rule.suggestions.clone(),
            matched_text: matched_text.to_string(),
            can_override: rule.can_override(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> ValidationRule {
        ValidationRule {
            rule_id: "test-rule".to_string(),
            name: "Test rule".to_string(),
            description: String::new(),
            pattern: "danger".to_string(),
            pattern_type: PatternType::Literal,
            severity: Severity::High,
            priority: Priority::P1,
            tool_kinds: vec![ToolKind::Bash],
            context: RuleContext::Command,
            message: "dangerous".to_string(),
            suggestions: vec![],
            enabled: true,
            category: "test".to_string(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::P0 > Priority::P1);
        assert!(Priority::P1 > Priority::P2);
        assert!(Priority::P2 > Priority::P3);
    }

    #[test]
    fn test_severity_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn test_tool_kind_from_name() {
        assert_eq!(ToolKind::from_name("Bash"), Some(ToolKind::Bash));
        assert_eq!(ToolKind::from_name("WebFetch"), Some(ToolKind::WebFetch));
        assert_eq!(ToolKind::from_name("NotebookEdit"), None);
    }

    #[test]
    fn test_rule_tool_applicability() {
        let rule = sample_rule();
        assert!(rule.applies_to_tool(ToolKind::Bash));
        assert!(!rule.applies_to_tool(ToolKind::Write));

        let mut any_tool = sample_rule();
        any_tool.tool_kinds.clear();
        assert!(any_tool.applies_to_tool(ToolKind::WebSearch));
    }

    #[test]
    fn test_rule_context_applicability() {
        let rule = sample_rule();
        assert!(rule.applies_in_context(RuleContext::Command));
        assert!(!rule.applies_in_context(RuleContext::FileContent));
        assert!(!rule.applies_in_context(RuleContext::All));

        let mut any_ctx = sample_rule();
        any_ctx.context = RuleContext::All;
        assert!(any_ctx.applies_in_context(RuleContext::Command));
        assert!(any_ctx.applies_in_context(RuleContext::All));
    }

    #[test]
    fn test_can_override_follows_severity() {
        let mut rule = sample_rule();
        assert!(rule.can_override());
        rule.severity = Severity::Critical;
        assert!(!rule.can_override());
        let m = RuleMatch::from_rule(&rule, "danger");
        assert!(!m.can_override);
        assert_eq!(m.matched_text, "danger");
    }

    #[test]
    fn test_custom_rule_deserialization_defaults() {
        let json = r#"{
            "rule_id": "no-curl-pipe",
            "name": "No curl pipe to shell",
            "pattern": "curl[^|]*\\|\\s*(ba)?sh",
            "severity": "high",
            "message": "Piping remote scripts to a shell is not allowed"
        }"#;
        let rule: ValidationRule = serde_json::from_str(json).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.pattern_type, PatternType::Regex);
        assert_eq!(rule.priority, Priority::P2);
        assert_eq!(rule.context, RuleContext::All);
        assert!(rule.tool_kinds.is_empty());
    }

    #[test]
    fn test_custom_rule_unknown_key_rejected() {
        let json = r#"{
            "rule_id": "x",
            "name": "x",
            "pattern": "x",
            "severity": "low",
            "message": "x",
            "patern_type": "literal"
        }"#;
        let result: Result<ValidationRule, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
