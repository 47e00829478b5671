#![forbid(unsafe_code)]
//! Agent Governor (governor) for Claude Code.
//!
//! Validates tool invocations before they execute. The hook runs as
//! `PreToolUse` and can deny dangerous commands, secret-bearing file writes,
//! and sensitive path modifications, or flag them with a warning.
//!
//! Exit behavior:
//!   - Exit 0 with JSON {"hookSpecificOutput": {"permissionDecision": "deny", ...}} = block
//!   - Exit 0 with no stdout output = allow (warnings go to stderr)
//!
//! The gate is advisory: any internal failure resolves to allow so a broken
//! configuration or unreadable token store can never wedge the agent.

use agent_governor::cli::{self, Cli};
use agent_governor::evaluator::{evaluate_tool_use, GateAction};
use agent_governor::hook;
use clap::Parser;
use serde_json::Value;

/// Upper bound on hook input size. Write inputs carry whole file contents,
/// so this is generous.
const MAX_HOOK_INPUT_BYTES: usize = 10 * 1024 * 1024;

fn main() {
    hook::configure_colors();

    let cli = Cli::parse();
    if cli.command.is_some() {
        if let Err(e) = cli::run_command(cli) {
            eprintln!("governor: {e}");
            std::process::exit(1);
        }
        return;
    }

    run_hook_mode();
}

/// Hook mode: read one request from stdin, evaluate it, and emit the
/// decision. Malformed input allows the tool call.
fn run_hook_mode() {
    let input = match hook::read_hook_input(MAX_HOOK_INPUT_BYTES) {
        Ok(input) => input,
        Err(_) => return,
    };

    let Some(tool_name) = input.tool_name.as_deref() else {
        return;
    };
    let tool_input = input
        .tool_input
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    let project_dir = input.project_dir();

    let outcome = evaluate_tool_use(tool_name, &tool_input, &project_dir);
    match outcome.action {
        GateAction::Allow => {}
        GateAction::Warn => {
            if let Some(ref found) = outcome.rule_match {
                hook::output_warning(input.display_input(), found);
            }
        }
        GateAction::Block => {
            if let Some(ref found) = outcome.rule_match {
                hook::output_denial(input.display_input(), found);
            }
        }
    }
}
