//! Effective rule set construction.
//!
//! The registry merges the built-in catalog with a project's configuration:
//! custom rules are vetted and grafted in, disabled rules drop out, and
//! severity overrides are applied. The result is immutable and compiled once;
//! evaluation never mutates it.
//!
//! A custom rule whose id matches a built-in replaces that built-in entirely,
//! keeping its position in the set. Two custom rules sharing an id is a
//! configuration error. A built-in that fails to compile is skipped with a
//! diagnostic instead of failing the build.

use crate::catalog::builtin_rules;
use crate::config::GovernanceConfig;
use crate::pattern::{validate_pattern_safety, CompiledPattern, PatternError};
use crate::rules::ValidationRule;
use std::collections::HashSet;
use std::fmt;

/// A rule paired with its compiled matcher.
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: ValidationRule,
    pub matcher: CompiledPattern,
}

/// A rule excluded from the effective set, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRule {
    pub rule_id: String,
    pub reason: String,
}

/// Why registry construction failed. These are configuration errors; the
/// evaluator treats them as internal errors and fails open, while the admin
/// surface reports them to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidRuleId { rule_id: String },
    DuplicateCustomRule { rule_id: String },
    UnsafePattern { rule_id: String, error: PatternError },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRuleId { rule_id } => write!(
                f,
                "rule id '{rule_id}' must contain only alphanumeric characters, hyphens, and underscores"
            ),
            Self::DuplicateCustomRule { rule_id } => {
                write!(f, "custom rule id '{rule_id}' appears more than once")
            }
            Self::UnsafePattern { rule_id, error } => {
                write!(f, "custom rule '{rule_id}': {error}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// The immutable effective rule set for one project configuration.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<CompiledRule>,
    skipped: Vec<SkippedRule>,
}

impl RuleRegistry {
    /// Build the effective rule set from the built-in catalog and a config.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when a custom rule has a malformed id,
    /// duplicates another custom rule, or carries an unsafe pattern.
    pub fn build(config: &GovernanceConfig) -> Result<Self, RegistryError> {
        let mut effective = builtin_rules();

        let mut seen_custom: HashSet<&str> = HashSet::new();
        for custom in &config.custom_rules {
            if !is_valid_rule_id(&custom.rule_id) {
                return Err(RegistryError::InvalidRuleId {
                    rule_id: custom.rule_id.clone(),
                });
            }
            if !seen_custom.insert(custom.rule_id.as_str()) {
                return Err(RegistryError::DuplicateCustomRule {
                    rule_id: custom.rule_id.clone(),
                });
            }
            validate_pattern_safety(&custom.pattern, custom.pattern_type).map_err(|error| {
                RegistryError::UnsafePattern {
                    rule_id: custom.rule_id.clone(),
                    error,
                }
            })?;

            // Same id as a built-in: the custom rule replaces it in place so
            // tie-break ordering stays stable.
            if let Some(existing) = effective.iter_mut().find(|r| r.rule_id == custom.rule_id) {
                *existing = custom.clone();
            } else {
                effective.push(custom.clone());
            }
        }

        let mut rules = Vec::with_capacity(effective.len());
        let mut skipped = Vec::new();

        for mut rule in effective {
            if !rule.enabled || config.is_rule_disabled(&rule.rule_id) {
                continue;
            }
            if let Some(severity) = config.severity_override(&rule.rule_id) {
                rule.severity = severity;
            }

            match CompiledPattern::compile(&rule.pattern, rule.pattern_type) {
                Ok(matcher) => rules.push(CompiledRule { rule, matcher }),
                // Custom patterns were vetted above, so this only fires for a
                // broken built-in. Skip it with a diagnostic.
                Err(error) => skipped.push(SkippedRule {
                    rule_id: rule.rule_id,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(Self { rules, skipped })
    }

    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    #[must_use]
    pub fn skipped(&self) -> &[SkippedRule] {
        &self.skipped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn find(&self, rule_id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|c| c.rule.rule_id == rule_id)
    }
}

fn is_valid_rule_id(rule_id: &str) -> bool {
    !rule_id.is_empty()
        && rule_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
