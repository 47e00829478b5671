#![cfg_attr(not(test), forbid(unsafe_code))]
//! Agent Governor (governor) library.
//!
//! This library provides the core functionality for governing tool use in
//! AI coding agent workflows. Dangerous shell commands, secret-bearing file
//! writes, sensitive path modifications, and risky web requests are matched
//! against a rule set and blocked or flagged before they execute.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Configuration                             │
//! │  (.governor/config.json: rules, paths, custom rules, strict)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Evaluator                                │
//! │  (unified entry point for hook mode and CLI)                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                  │                │                 │
//!                  ▼                ▼                 ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────┐
//! │  Rule Registry   │ │  Allowed Paths   │ │  Override Tokens     │
//! │  (built-ins +    │ │  (glob bypass    │ │  (scoped, durable,   │
//! │   vetted custom) │ │   for writes)    │ │   consumed once)     │
//! └──────────────────┘ └──────────────────┘ └──────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Audit Trail                               │
//! │  (sanitized JSONL, one line per consequential decision)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! The main entry point for evaluation is the [`evaluator`] module:
//!
//! ```ignore
//! use agent_governor::evaluator::{evaluate_tool_use, GateAction};
//! use serde_json::json;
//!
//! let input = json!({"command": "rm -rf /"});
//! let outcome = evaluate_tool_use("Bash", &input, std::path::Path::new("."));
//!
//! if outcome.is_blocked() {
//!     let found = outcome.rule_match.unwrap();
//!     println!("Blocked by {}: {}", found.rule_id, found.reason);
//! }
//! ```

pub mod allowed_paths;
pub mod audit;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod detector;
pub mod evaluator;
pub mod hook;
pub mod overrides;
pub mod pattern;
pub mod registry;
pub mod rules;

// Re-export commonly used types
pub use allowed_paths::{AllowedPaths, AllowedPathsError};
pub use audit::{AuditDecision, AuditEvent, AuditLogger, AuditSummary, sanitize_tool_input};
pub use config::{ConfigError, GovernanceConfig, load_config, load_config_cached};
pub use detector::detect;
pub use evaluator::{
    GateAction, GateOutcome, evaluate_tool_use, evaluate_with, invalidate_project_cache,
};
pub use hook::{HookInput, HookOutput, HookSpecificOutput};
pub use overrides::{OverrideContext, OverrideToken, StoreError, TokenScope, TokenStore};
pub use registry::{CompiledRule, RegistryError, RuleRegistry};
pub use rules::{
    PatternType, Priority, RuleContext, RuleMatch, Severity, ToolKind, ValidationRule,
};

// Re-export the dual regex engine abstraction and safety vetting
pub use pattern::{
    CompiledPattern, CompiledRegex, PatternError, needs_backtracking_engine,
    validate_pattern_safety,
};
