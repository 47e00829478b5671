//! CLI argument parsing and command handling.
//!
//! This module provides the command-line interface for governor, including
//! subcommands for checking inputs, managing override tokens, inspecting the
//! effective rule set, and reading the audit trail.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::audit::{read_events, AuditLogger, AuditSummary, AUDIT_FILE};
use crate::config::{config_path, generate_sample_config, load_config, GovernanceConfig, STATE_DIR};
use crate::evaluator::{evaluate_with, GateAction};
use crate::overrides::{TokenScope, TokenStore};
use crate::registry::RuleRegistry;

/// Governance gate for autonomous coding agents.
///
/// governor runs as a `PreToolUse` hook and validates tool invocations
/// against a configurable rule set before they execute. Dangerous commands,
/// secret-bearing file writes, and sensitive path modifications are blocked
/// or flagged; the user can issue scoped override tokens for exceptions.
#[derive(Parser, Debug)]
#[command(name = "governor")]
#[command(version, about, long_about = None)]
#[command(after_help = "Run without a subcommand to operate in hook mode.")]
pub struct Cli {
    /// Subcommand to run (omit to run in hook mode)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate an input the way hook mode would
    #[command(name = "check")]
    Check {
        /// The input text: a command line, file content, or URL
        text: String,

        /// Tool to evaluate as
        #[arg(long, short, value_enum, default_value_t = CheckTool::Bash)]
        tool: CheckTool,

        /// Target path for file tools (Write/Edit)
        #[arg(long, value_name = "PATH")]
        file_path: Option<String>,
    },

    /// Manage override tokens
    #[command(name = "token")]
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// List the effective rule set for this project
    #[command(name = "rules")]
    Rules {
        /// Only show rules in this category
        #[arg(long)]
        category: Option<String>,

        /// Show patterns and suggestions
        #[arg(short, long)]
        verbose: bool,
    },

    /// Inspect or initialize project configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Summarize the audit trail
    #[command(name = "report")]
    Report,
}

/// Tool identity for `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckTool {
    Bash,
    Write,
    Edit,
    #[value(name = "web-fetch")]
    WebFetch,
    #[value(name = "web-search")]
    WebSearch,
}

impl CheckTool {
    const fn tool_name(self) -> &'static str {
        match self {
            Self::Bash => "Bash",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::WebFetch => "WebFetch",
            Self::WebSearch => "WebSearch",
        }
    }
}

/// Override token subcommands.
#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Issue a new override token for a rule
    Create {
        /// Rule the token overrides (e.g., "bash-chmod-777")
        rule_id: String,

        /// Scope: "all", "file:<glob>", or "command:<pattern>"
        #[arg(long, short, default_value = "all")]
        scope: String,

        /// Minutes until expiry (0 = never expires)
        #[arg(long, value_name = "MINUTES")]
        expires: Option<i64>,

        /// Maximum uses (0 = unlimited)
        #[arg(long, value_name = "N")]
        max_uses: Option<u32>,

        /// Why the override is needed
        #[arg(long, short, default_value = "")]
        reason: String,
    },

    /// List tokens (valid ones by default)
    List {
        /// Include expired and exhausted tokens
        #[arg(long)]
        all: bool,

        /// Only show tokens for this rule
        #[arg(long, value_name = "RULE_ID")]
        rule: Option<String>,
    },

    /// Revoke a token by id
    Revoke {
        /// Token id (UUID)
        token_id: Uuid,
    },

    /// Remove expired tokens from the store
    Prune,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Parse the configuration and vet every custom rule
    Validate,

    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,
}

/// Dispatch a parsed CLI invocation.
///
/// # Errors
///
/// Returns an error for invalid input (bad scope strings, unknown rules,
/// broken configuration) and for I/O failures against project state.
pub fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let project_dir = match cli.project {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Some(Command::Check {
            text,
            tool,
            file_path,
        }) => check_input(&project_dir, &text, tool, file_path.as_deref()),
        Some(Command::Token { action }) => handle_token_command(&project_dir, action),
        Some(Command::Rules { category, verbose }) => list_rules(&project_dir, category.as_deref(), verbose),
        Some(Command::Config { action }) => handle_config_command(&project_dir, action),
        Some(Command::Report) => report(&project_dir),
        None => {
            // No subcommand - hook mode is handled by main.rs
            Err("No subcommand provided. Running in hook mode.".into())
        }
    }
}

/// Evaluate an input through the same path hook mode uses and print the
/// outcome. Exits with status 2 when the input would be blocked.
fn check_input(
    project_dir: &std::path::Path,
    text: &str,
    tool: CheckTool,
    file_path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tool_input = match tool {
        CheckTool::Bash => json!({"command": text}),
        CheckTool::Write => json!({"file_path": file_path.unwrap_or(""), "content": text}),
        CheckTool::Edit => json!({"file_path": file_path.unwrap_or(""), "new_string": text}),
        CheckTool::WebFetch => json!({"url": text}),
        CheckTool::WebSearch => json!({"query": text}),
    };

    let config = load_config(project_dir)?;
    let store = TokenStore::for_project(project_dir);
    let logger = AuditLogger::for_project(project_dir, config.log_all_validations);
    let outcome = evaluate_with(
        &config,
        &store,
        &logger,
        tool.tool_name(),
        &tool_input,
        project_dir,
    );

    match outcome.action {
        GateAction::Allow => {
            if outcome.bypassed_by_allowed_path {
                println!("{} (allowed path)", "ALLOW".green().bold());
            } else if let Some(token_id) = outcome.override_token_id {
                println!("{} (override token {token_id})", "ALLOW".green().bold());
            } else if let Some(error) = outcome.internal_error {
                println!("{} (internal error: {error})", "ALLOW".green().bold());
            } else {
                println!("{}", "ALLOW".green().bold());
            }
        }
        GateAction::Warn => {
            let m = outcome.rule_match.as_ref().ok_or("missing match")?;
            println!(
                "{} {} [{}]: {}",
                "WARN".yellow().bold(),
                m.rule_id.yellow(),
                m.severity.label(),
                m.reason
            );
        }
        GateAction::Block => {
            let m = outcome.rule_match.as_ref().ok_or("missing match")?;
            println!(
                "{} {} [{}]: {}",
                "BLOCK".red().bold(),
                m.rule_id.yellow(),
                m.severity.label(),
                m.reason
            );
            for suggestion in m.suggestions.iter().take(3) {
                println!("  💡 {suggestion}");
            }
            std::process::exit(2);
        }
    }
    Ok(())
}

fn handle_token_command(
    project_dir: &std::path::Path,
    action: TokenAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = TokenStore::for_project(project_dir);

    match action {
        TokenAction::Create {
            rule_id,
            scope,
            expires,
            max_uses,
            reason,
        } => {
            let config = load_config(project_dir)?;
            let registry = RuleRegistry::build(&config)?;
            let rule = registry
                .find(&rule_id)
                .ok_or_else(|| format!("unknown rule '{rule_id}'"))?;
            if !rule.rule.can_override() {
                return Err(format!(
                    "rule '{rule_id}' is {} severity and cannot be overridden",
                    rule.rule.severity.label()
                )
                .into());
            }

            let scope = TokenScope::parse(&scope)?;
            let token = store.generate(&rule_id, scope, expires, max_uses, &reason, "user")?;

            println!("{} override token issued", "OK".green().bold());
            println!("  Token:   {}", token.token_id.to_string().cyan());
            println!("  Rule:    {}", token.rule_id);
            println!("  Scope:   {}", token.scope);
            match token.expires_at {
                Some(at) => println!("  Expires: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  Expires: never"),
            }
            match token.remaining_uses() {
                Some(n) => println!("  Uses:    {n}"),
                None => println!("  Uses:    unlimited"),
            }
        }
        TokenAction::List { all, rule } => {
            let now = Utc::now();
            let tokens = store.list(rule.as_deref(), all, now)?;
            if tokens.is_empty() {
                println!("No {}tokens.", if all { "" } else { "valid " });
                return Ok(());
            }
            for token in tokens {
                let status = if token.is_valid(now) {
                    "valid".green()
                } else {
                    "invalid".bright_black()
                };
                let uses = match token.remaining_uses() {
                    Some(n) => format!("{n} left"),
                    None => "unlimited".to_string(),
                };
                println!(
                    "{}  {}  {}  scope={}  {}",
                    token.token_id.to_string().cyan(),
                    token.rule_id.yellow(),
                    status,
                    token.scope,
                    uses
                );
                if !token.reason.is_empty() {
                    println!("    reason: {}", token.reason);
                }
            }
        }
        TokenAction::Revoke { token_id } => {
            if store.revoke(token_id)? {
                println!("{} token {token_id} revoked", "OK".green().bold());
            } else {
                return Err(format!("token {token_id} not found").into());
            }
        }
        TokenAction::Prune => {
            let pruned = store.prune_expired(Utc::now())?;
            println!("Pruned {pruned} expired token(s).");
        }
    }
    Ok(())
}

fn list_rules(
    project_dir: &std::path::Path,
    category: Option<&str>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(project_dir)?;
    let registry = RuleRegistry::build(&config)?;

    let mut shown = 0usize;
    for compiled in registry.rules() {
        let rule = &compiled.rule;
        if let Some(wanted) = category {
            if rule.category != wanted {
                continue;
            }
        }
        shown += 1;
        println!(
            "{}  [{}/{}]  {}",
            rule.rule_id.cyan(),
            rule.severity.label(),
            rule.priority.label(),
            rule.name
        );
        if verbose {
            println!("    {}", rule.description.bright_black());
            println!("    pattern: {}", rule.pattern);
            for tool in &rule.tool_kinds {
                print!("    tools: {} ", tool.name());
            }
            if !rule.tool_kinds.is_empty() {
                println!();
            }
            for suggestion in &rule.suggestions {
                println!("    💡 {suggestion}");
            }
        }
    }
    println!();
    println!("{shown} rule(s) active.");

    if !registry.skipped().is_empty() {
        println!();
        for skipped in registry.skipped() {
            println!(
                "{} {}: {}",
                "skipped".yellow(),
                skipped.rule_id,
                skipped.reason
            );
        }
    }
    Ok(())
}

fn handle_config_command(
    project_dir: &std::path::Path,
    action: ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Validate => {
            let config = load_config(project_dir)?;
            let registry = RuleRegistry::build(&config)?;
            println!(
                "{} configuration is valid ({} active rules, {} custom)",
                "OK".green().bold(),
                registry.len(),
                config.custom_rules.len()
            );
            for skipped in registry.skipped() {
                println!(
                    "{} {}: {}",
                    "warning".yellow(),
                    skipped.rule_id,
                    skipped.reason
                );
            }
        }
        ConfigAction::Init { force } => {
            let path = config_path(project_dir);
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, generate_sample_config())?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(project_dir)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn report(project_dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = project_dir.join(STATE_DIR).join(AUDIT_FILE);
    let events = read_events(&path)?;
    if events.is_empty() {
        println!("No audit events recorded.");
        return Ok(());
    }

    let summary = AuditSummary::from_events(&events);
    println!("Audit summary ({} events)", summary.total);
    println!();
    println!("By decision:");
    for (decision, count) in &summary.by_decision {
        println!("  {decision:<14} {count}");
    }
    if !summary.by_rule.is_empty() {
        println!();
        println!("By rule:");
        for (rule_id, count) in &summary.by_rule {
            println!("  {rule_id:<32} {count}");
        }
    }
    println!();
    println!("By tool:");
    for (tool, count) in &summary.by_tool {
        println!("  {tool:<14} {count}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ToolKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_tool_names_match_hook_names() {
        assert!(ToolKind::from_name(CheckTool::Bash.tool_name()).is_some());
        assert!(ToolKind::from_name(CheckTool::Write.tool_name()).is_some());
        assert!(ToolKind::from_name(CheckTool::Edit.tool_name()).is_some());
        assert!(ToolKind::from_name(CheckTool::WebFetch.tool_name()).is_some());
        assert!(ToolKind::from_name(CheckTool::WebSearch.tool_name()).is_some());
    }

    #[test]
    fn test_token_create_args() {
        let cli = Cli::try_parse_from([
            "governor",
            "token",
            "create",
            "bash-chmod-777",
            "--scope",
            "file:src/**",
            "--expires",
            "30",
            "--max-uses",
            "2",
            "--reason",
            "migration",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Token {
                action:
                    TokenAction::Create {
                        rule_id,
                        scope,
                        expires,
                        max_uses,
                        reason,
                    },
            }) => {
                assert_eq!(rule_id, "bash-chmod-777");
                assert_eq!(scope, "file:src/**");
                assert_eq!(expires, Some(30));
                assert_eq!(max_uses, Some(2));
                assert_eq!(reason, "migration");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_check_defaults_to_bash() {
        let cli = Cli::try_parse_from(["governor", "check", "rm -rf /"]).unwrap();
        match cli.command {
            Some(Command::Check { text, tool, .. }) => {
                assert_eq!(text, "rm -rf /");
                assert_eq!(tool, CheckTool::Bash);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
