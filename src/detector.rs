//! Pattern detection.
//!
//! The detector is a pure matcher: given a piece of text, the context it came
//! from, and the tool that produced it, it reports the winning matched rule
//! or nothing. It never decides whether to block; that interpretation belongs
//! to the evaluator.

use crate::registry::RuleRegistry;
use crate::rules::{RuleContext, RuleMatch, ToolKind};

/// Run every applicable rule over `text` and return the winning match.
///
/// A rule participates when it applies to `tool` and its declared context
/// matches `context` (or is `all`). Among matches, the winner is the highest
/// severity, then the highest priority, then the earliest rule in the
/// effective set. The result is deterministic for a given registry.
#[must_use]
pub fn detect(
    registry: &RuleRegistry,
    text: &str,
    context: RuleContext,
    tool: ToolKind,
) -> Option<RuleMatch> {
    let mut winner: Option<&crate::registry::CompiledRule> = None;

    for candidate in registry.rules() {
        let rule = &candidate.rule;
        if !rule.applies_to_tool(tool) || !rule.applies_in_context(context) {
            continue;
        }
        if !candidate.matcher.is_match(text) {
            continue;
        }

        let beats_current = match winner {
            None => true,
            // Strict comparison keeps the earliest rule on exact ties.
            Some(current) => {
                (rule.severity, rule.priority) > (current.rule.severity, current.rule.priority)
            }
        };
        if beats_current {
            winner = Some(candidate);
        }
    }

    winner.map(|c| {
        // is_match already succeeded; the backtracking engine can still error
        // on find, in which case the match text is empty.
        let matched = c.matcher.matched(text).unwrap_or_default();
        RuleMatch::from_rule(&c.rule, matched)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernanceConfig;
    use crate::rules::{PatternType, Priority, Severity, ValidationRule};

    fn rule(
        rule_id: &str,
        pattern: &str,
        severity: Severity,
        priority: Priority,
    ) -> ValidationRule {
        ValidationRule {
            rule_id: rule_id.to_string(),
            name: rule_id.to_string(),
            description: String::new(),
            pattern: pattern.to_string(),
            pattern_type: PatternType::Literal,
            severity,
            priority,
            tool_kinds: vec![ToolKind::Bash],
            context: RuleContext::Command,
            message: format!("{rule_id} fired"),
            suggestions: vec![],
            enabled: true,
            category: "test".to_string(),
        }
    }

    fn registry_of(rules: Vec<ValidationRule>) -> RuleRegistry {
        let config = GovernanceConfig {
            custom_rules: rules,
            // Keep the catalog out of the way so only test rules participate.
            disabled_rules: crate::catalog::builtin_rules()
                .into_iter()
                .map(|r| r.rule_id)
                .collect(),
            ..GovernanceConfig::default()
        };
        RuleRegistry::build(&config).unwrap()
    }

    #[test]
    fn test_no_match_returns_none() {
        let registry = registry_of(vec![rule("a", "danger", Severity::High, Priority::P1)]);
        assert!(detect(&registry, "echo hello", RuleContext::Command, ToolKind::Bash).is_none());
    }

    #[test]
    fn test_severity_wins_over_priority() {
        let registry = registry_of(vec![
            rule("high-p0", "boom", Severity::High, Priority::P0),
            rule("critical-p3", "boom", Severity::Critical, Priority::P3),
        ]);
        let m = detect(&registry, "boom", RuleContext::Command, ToolKind::Bash).unwrap();
        assert_eq!(m.rule_id, "critical-p3");
        assert_eq!(m.severity, Severity::Critical);
    }

    #[test]
    fn test_priority_breaks_severity_tie() {
        let registry = registry_of(vec![
            rule("high-p2", "boom", Severity::High, Priority::P2),
            rule("high-p0", "boom", Severity::High, Priority::P0),
        ]);
        let m = detect(&registry, "boom", RuleContext::Command, ToolKind::Bash).unwrap();
        assert_eq!(m.rule_id, "high-p0");
    }

    #[test]
    fn test_declaration_order_breaks_full_tie() {
        let registry = registry_of(vec![
            rule("first", "boom", Severity::High, Priority::P1),
            rule("second", "boom", Severity::High, Priority::P1),
        ]);
        let m = detect(&registry, "boom", RuleContext::Command, ToolKind::Bash).unwrap();
        assert_eq!(m.rule_id, "first");
    }

    #[test]
    fn test_tool_filter_excludes_rule() {
        let registry = registry_of(vec![rule("bash-only", "boom", Severity::High, Priority::P1)]);
        assert!(detect(&registry, "boom", RuleContext::Command, ToolKind::Write).is_none());
    }

    #[test]
    fn test_context_filter_excludes_rule() {
        let registry = registry_of(vec![rule("cmd-only", "boom", Severity::High, Priority::P1)]);
        assert!(detect(&registry, "boom", RuleContext::FileContent, ToolKind::Bash).is_none());
    }

    #[test]
    fn test_all_context_rule_matches_any_context() {
        let mut r = rule("anywhere", "boom", Severity::Medium, Priority::P2);
        r.context = RuleContext::All;
        r.tool_kinds.clear();
        let registry = registry_of(vec![r]);
        for context in [
            RuleContext::Command,
            RuleContext::FileContent,
            RuleContext::FilePath,
            RuleContext::All,
        ] {
            assert!(
                detect(&registry, "boom", context, ToolKind::Bash).is_some(),
                "context {context:?} should match"
            );
        }
    }

    #[test]
    fn test_builtin_rm_rf_root_detected() {
        let registry = RuleRegistry::build(&GovernanceConfig::default()).unwrap();
        let m = detect(
            &registry,
            "rm -rf /",
            RuleContext::Command,
            ToolKind::Bash,
        )
        .unwrap();
        assert_eq!(m.rule_id, "bash-rm-rf-root");
        assert_eq!(m.severity, Severity::Critical);
        assert!(!m.can_override);
    }

    #[test]
    fn test_match_carries_matched_text() {
        let registry = RuleRegistry::build(&GovernanceConfig::default()).unwrap();
        let input = "sudo rm -rf /etc";
        let m = detect(&registry, input, RuleContext::Command, ToolKind::Bash).unwrap();
        assert_eq!(m.rule_id, "bash-rm-rf-root");

        // The capture is the matched input substring, not the rule's pattern.
        assert_eq!(m.matched_text, "rm -rf /");
        assert!(input.contains(&m.matched_text));
    }

    #[test]
    fn test_literal_match_carries_needle() {
        let registry = registry_of(vec![rule("lit", "boom", Severity::High, Priority::P1)]);
        let m = detect(&registry, "pre boom post", RuleContext::Command, ToolKind::Bash).unwrap();
        assert_eq!(m.matched_text, "boom");
    }

    #[test]
    fn test_deterministic_across_runs() {
        let registry = registry_of(vec![
            rule("one", "boom", Severity::High, Priority::P1),
            rule("two", "boom", Severity::High, Priority::P1),
            rule("three", "boom", Severity::High, Priority::P1),
        ]);
        let first = detect(&registry, "boom", RuleContext::Command, ToolKind::Bash).unwrap();
        for _ in 0..10 {
            let again = detect(&registry, "boom", RuleContext::Command, ToolKind::Bash).unwrap();
            assert_eq!(again.rule_id, first.rule_id);
        }
    }
}
