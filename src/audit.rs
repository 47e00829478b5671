//! Audit trail for governance decisions.
//!
//! Every consequential decision is appended as one JSON line to
//! `<project>/.governor/audit.jsonl`. Tool inputs are sanitized before they
//! are written: secret-bearing keys are redacted and oversized values are
//! truncated. Audit failures are swallowed so logging can never change a
//! decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::STATE_DIR;
use crate::rules::Severity;

/// Audit file name inside the state directory.
pub const AUDIT_FILE: &str = "audit.jsonl";

/// Value keys whose contents are never written to the audit trail.
const SENSITIVE_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "secret",
    "password",
    "token",
    "authorization",
    "auth",
    "credential",
    "private_key",
];

const MAX_STRING_LEN: usize = 200;
const MAX_LIST_ITEMS: usize = 10;

/// The outcome recorded for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Allowed,
    Blocked,
    Warned,
    Overridden,
    PathBypassed,
    Error,
}

impl AuditDecision {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::Warned => "warned",
            Self::Overridden => "overridden",
            Self::PathBypassed => "path_bypassed",
            Self::Error => "error",
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub decision: AuditDecision,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity: Option<Severity>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub override_token_id: Option<Uuid>,
    pub tool_input_summary: Value,
}

impl AuditEvent {
    /// Build an event with a sanitized copy of the tool input.
    #[must_use]
    pub fn new(
        tool_name: &str,
        decision: AuditDecision,
        reason: &str,
        tool_input: &Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            decision,
            rule_id: None,
            severity: None,
            reason: reason.to_string(),
            override_token_id: None,
            tool_input_summary: sanitize_tool_input(tool_input),
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule_id: &str, severity: Severity) -> Self {
        self.rule_id = Some(rule_id.to_string());
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_override_token(mut self, token_id: Uuid) -> Self {
        self.override_token_id = Some(token_id);
        self
    }
}

/// Appends audit events for one project.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
    log_all_validations: bool,
}

impl AuditLogger {
    #[must_use]
    pub fn new(path: PathBuf, log_all_validations: bool) -> Self {
        Self {
            path,
            log_all_validations,
        }
    }

    /// The logger for a project's state directory.
    #[must_use]
    pub fn for_project(project_dir: &Path, log_all_validations: bool) -> Self {
        Self::new(
            project_dir.join(STATE_DIR).join(AUDIT_FILE),
            log_all_validations,
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Plain allows are recorded only when
    /// `log_all_validations` is set; every other decision is always recorded.
    /// Failures are ignored.
    pub fn record(&self, event: &AuditEvent) {
        if event.decision == AuditDecision::Allowed && !self.log_all_validations {
            return;
        }
        self.append(event);
    }

    fn append(&self, event: &AuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Read the audit trail back, skipping lines that fail to parse.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be opened. A missing
/// file yields an empty list.
pub fn read_events(path: &Path) -> std::io::Result<Vec<AuditEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<AuditEvent>(&line) {
            events.push(event);
        }
    }
    Ok(events)
}

/// Aggregated counts over a set of audit events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub by_decision: BTreeMap<String, usize>,
    pub by_rule: BTreeMap<String, usize>,
    pub by_tool: BTreeMap<String, usize>,
}

impl AuditSummary {
    #[must_use]
    pub fn from_events(events: &[AuditEvent]) -> Self {
        let mut summary = Self {
            total: events.len(),
            ..Self::default()
        };
        for event in events {
            *summary
                .by_decision
                .entry(event.decision.label().to_string())
                .or_insert(0) += 1;
            if let Some(ref rule_id) = event.rule_id {
                *summary.by_rule.entry(rule_id.clone()).or_insert(0) += 1;
            }
            *summary.by_tool.entry(event.tool_name.clone()).or_insert(0) += 1;
        }
        summary
    }
}

/// Produce a redacted, size-bounded copy of a tool input for the audit trail.
#[must_use]
pub fn sanitize_tool_input(input: &Value) -> Value {
    match input {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(key.clone(), sanitize_tool_input(value));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_LIST_ITEMS)
                .map(sanitize_tool_input)
                .collect();
            if items.len() > MAX_LIST_ITEMS {
                out.push(Value::String(format!(
                    "... [{} more items]",
                    items.len() - MAX_LIST_ITEMS
                )));
            }
            Value::Array(out)
        }
        Value::String(s) => Value::String(truncate_string(s)),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| lowered.contains(sensitive))
}

fn truncate_string(s: &str) -> String {
    if s.chars().count() <= MAX_STRING_LEN {
        return s.to_string();
    }
    let truncated: String = s.chars().take(MAX_STRING_LEN).collect();
    format!("{truncated}... [TRUNCATED]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn logger_in(dir: &TempDir, log_all: bool) -> AuditLogger {
        AuditLogger::new(dir.path().join(AUDIT_FILE), log_all)
    }

    #[test]
    fn test_sanitize_redacts_sensitive_keys() {
        let input = json!({
            "command": "curl https://example.com",
            "api_key": "sk-12345",
            "GitHub_Token": "ghp_abc",
            "nested": {"password": "hunter2", "path": "ok"}
        });
        let sanitized = sanitize_tool_input(&input);
        assert_eq!(sanitized["api_key"], "[REDACTED]");
        assert_eq!(sanitized["GitHub_Token"], "[REDACTED]");
        assert_eq!(sanitized["nested"]["password"], "[REDACTED]");
        assert_eq!(sanitized["nested"]["path"], "ok");
        assert_eq!(sanitized["command"], "curl https://example.com");
    }

    #[test]
    fn test_sanitize_truncates_long_strings() {
        let long = "x".repeat(500);
        let sanitized = sanitize_tool_input(&json!({ "content": long }));
        let value = sanitized["content"].as_str().unwrap();
        assert!(value.ends_with("... [TRUNCATED]"));
        assert!(value.len() < 250);
    }

    #[test]
    fn test_sanitize_truncates_long_lists() {
        let items: Vec<i64> = (0..25).collect();
        let sanitized = sanitize_tool_input(&json!({ "args": items }));
        let list = sanitized["args"].as_array().unwrap();
        assert_eq!(list.len(), MAX_LIST_ITEMS + 1);
        assert_eq!(list[MAX_LIST_ITEMS], "... [15 more items]");
    }

    #[test]
    fn test_record_appends_jsonl() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, false);

        let event = AuditEvent::new(
            "Bash",
            AuditDecision::Blocked,
            "matched rule",
            &json!({"command": "rm -rf /"}),
        )
        .with_rule("bash-rm-rf-root", Severity::Critical);
        logger.record(&event);
        logger.record(&event);

        let events = read_events(logger.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].decision, AuditDecision::Blocked);
        assert_eq!(events[0].rule_id.as_deref(), Some("bash-rm-rf-root"));
        assert_eq!(events[0].severity, Some(Severity::Critical));
    }

    #[test]
    fn test_plain_allows_gated_by_log_all() {
        let dir = TempDir::new().unwrap();
        let quiet = logger_in(&dir, false);
        let allow = AuditEvent::new("Bash", AuditDecision::Allowed, "no match", &json!({}));
        quiet.record(&allow);
        assert!(read_events(quiet.path()).unwrap().is_empty());

        let verbose = logger_in(&dir, true);
        verbose.record(&allow);
        assert_eq!(read_events(verbose.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_non_allow_decisions_always_recorded() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, false);
        for decision in [
            AuditDecision::Blocked,
            AuditDecision::Warned,
            AuditDecision::Overridden,
            AuditDecision::PathBypassed,
            AuditDecision::Error,
        ] {
            logger.record(&AuditEvent::new("Write", decision, "r", &json!({})));
        }
        assert_eq!(read_events(logger.path()).unwrap().len(), 5);
    }

    #[test]
    fn test_read_events_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, false);
        logger.record(&AuditEvent::new(
            "Bash",
            AuditDecision::Warned,
            "r",
            &json!({}),
        ));
        {
            let mut file = OpenOptions::new().append(true).open(logger.path()).unwrap();
            writeln!(file, "{{garbage").unwrap();
        }
        logger.record(&AuditEvent::new(
            "Bash",
            AuditDecision::Blocked,
            "r",
            &json!({}),
        ));

        let events = read_events(logger.path()).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_summary_counts() {
        let block = AuditEvent::new("Bash", AuditDecision::Blocked, "r", &json!({}))
            .with_rule("bash-rm-rf-root", Severity::Critical);
        let warn = AuditEvent::new("WebFetch", AuditDecision::Warned, "r", &json!({}))
            .with_rule("web-fetch-internal-ip", Severity::Medium);
        let events = vec![block.clone(), block, warn];

        let summary = AuditSummary::from_events(&events);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_decision["blocked"], 2);
        assert_eq!(summary.by_decision["warned"], 1);
        assert_eq!(summary.by_rule["bash-rm-rf-root"], 2);
        assert_eq!(summary.by_tool["Bash"], 2);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let events = read_events(&dir.path().join("absent.jsonl")).unwrap();
        assert!(events.is_empty());
    }
}
