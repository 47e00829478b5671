//! Claude Code hook protocol handling.
//!
//! This module handles the JSON input/output for the `PreToolUse` hook. It
//! parses incoming hook requests and formats deny responses and warning
//! banners.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use crate::rules::RuleMatch;

/// Input structure from the `PreToolUse` hook.
#[derive(Debug, Deserialize)]
pub struct HookInput {
    /// The name of the tool being invoked (e.g., "Bash", "Write", "WebFetch").
    pub tool_name: Option<String>,

    /// Tool-specific input parameters, passed through as-is.
    pub tool_input: Option<serde_json::Value>,

    /// The working directory of the session, used to locate project state.
    pub cwd: Option<String>,
}

impl HookInput {
    /// Project directory for this invocation: the session cwd if present,
    /// otherwise the process working directory.
    #[must_use]
    pub fn project_dir(&self) -> PathBuf {
        self.cwd
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The most relevant input text for display purposes.
    #[must_use]
    pub fn display_input(&self) -> Option<&str> {
        let input = self.tool_input.as_ref()?;
        for key in ["command", "file_path", "url", "query"] {
            if let Some(s) = input.get(key).and_then(serde_json::Value::as_str) {
                if !s.is_empty() {
                    return Some(s);
                }
            }
        }
        None
    }
}

/// Output structure for denying a tool call.
#[derive(Debug, Serialize)]
pub struct HookOutput<'a> {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput<'a>,
}

/// Hook-specific output with decision and reason.
#[derive(Debug, Serialize)]
pub struct HookSpecificOutput<'a> {
    /// Always "`PreToolUse`" for this hook.
    #[serde(rename = "hookEventName")]
    pub hook_event_name: &'static str,

    /// The permission decision: "allow" or "deny".
    #[serde(rename = "permissionDecision")]
    pub permission_decision: &'static str,

    /// Human-readable explanation of the decision.
    #[serde(rename = "permissionDecisionReason")]
    pub permission_decision_reason: Cow<'a, str>,
}

/// Error type for reading and parsing hook input.
#[derive(Debug)]
pub enum HookReadError {
    /// Failed to read from stdin.
    Io(io::Error),
    /// Input exceeded the configured size limit.
    InputTooLarge(usize),
    /// Failed to parse JSON input.
    Json(serde_json::Error),
}

/// Read and parse hook input from stdin.
///
/// # Errors
///
/// Returns [`HookReadError::Io`] if stdin cannot be read, [`HookReadError::Json`]
/// if the input is not valid hook JSON, or [`HookReadError::InputTooLarge`] if
/// the input exceeds `max_bytes`.
pub fn read_hook_input(max_bytes: usize) -> Result<HookInput, HookReadError> {
    let mut input = String::with_capacity(256);
    {
        let stdin = io::stdin();
        // Read up to limit + 1 to detect overflow
        let mut handle = stdin.lock().take(max_bytes as u64 + 1);
        handle
            .read_to_string(&mut input)
            .map_err(HookReadError::Io)?;
    }

    if input.len() > max_bytes {
        return Err(HookReadError::InputTooLarge(input.len()));
    }

    serde_json::from_str(&input).map_err(HookReadError::Json)
}

/// Configure colored output based on TTY detection.
pub fn configure_colors() {
    if !io::stderr().is_terminal() {
        colored::control::set_override(false);
    }
}

/// Format the denial message for the JSON output (plain text).
#[must_use]
pub fn format_denial_message(input: Option<&str>, found: &RuleMatch) -> String {
    let mut message = format!(
        "BLOCKED by governor\n\n\
         Rule: {} ({})\n\n\
         Reason: {}",
        found.rule_id,
        found.severity.label(),
        found.reason
    );
    if let Some(text) = input {
        message.push_str(&format!("\n\nInput: {text}"));
    }
    if found.can_override {
        message.push_str(&format!(
            "\n\nIf this operation is truly needed, ask the user to issue an \
             override token:\n  governor token create {} --reason \"...\"",
            found.rule_id
        ));
    } else {
        message.push_str(
            "\n\nThis rule is critical and cannot be overridden. Ask the user \
             to perform the operation manually if it is truly needed.",
        );
    }
    message
}

/// Print a colorful banner to stderr for human visibility.
fn print_banner(header: &str, input: Option<&str>, found: &RuleMatch, blocking: bool) {
    // Box width (content area, excluding border characters)
    const WIDTH: usize = 70;

    let paint = |s: &str| {
        if blocking {
            s.red()
        } else {
            s.yellow()
        }
    };

    let stderr = io::stderr();
    let mut handle = stderr.lock();

    let _ = writeln!(handle);

    // Top border with corners
    let _ = writeln!(
        handle,
        "{}{}{}",
        paint("╭"),
        paint(&"─".repeat(WIDTH)),
        paint("╮")
    );

    // Shield icon and header
    let styled_header = if blocking {
        header.white().on_red().bold()
    } else {
        header.black().on_yellow().bold()
    };
    let _ = writeln!(
        handle,
        "{}  🛡  {}  {}{}",
        paint("│"),
        styled_header,
        " ".repeat(WIDTH.saturating_sub(9 + header.len())),
        paint("│")
    );

    // Identifier line
    let id_line = "   Agent Governor (governor)";
    let _ = writeln!(
        handle,
        "{}{}{}{}",
        paint("│"),
        id_line.bright_black(),
        " ".repeat(WIDTH - id_line.len()),
        paint("│")
    );

    // Separator
    let _ = writeln!(
        handle,
        "{}{}{}",
        paint("├"),
        paint(&"─".repeat(WIDTH)).dimmed(),
        paint("┤")
    );

    // Rule line with severity
    let rule_text = format!("{} [{}]", found.rule_id, found.severity.label());
    let rule_line_len = "  Rule: ".len() + rule_text.len();
    let _ = write!(handle, "{}", paint("│"));
    let _ = write!(handle, "  {} ", "Rule:".bright_black());
    let _ = write!(handle, "{}", rule_text.yellow());
    let _ = writeln!(
        handle,
        "{}{}",
        " ".repeat(WIDTH.saturating_sub(rule_line_len)),
        paint("│")
    );

    // Empty line
    let _ = writeln!(handle, "{}{}{}", paint("│"), " ".repeat(WIDTH), paint("│"));

    // Reason section - wrap long reasons
    let reason_label = "  Reason: ";
    let reason_width = WIDTH - reason_label.len() - 1;
    let wrapped_reason = wrap_text(&found.reason, reason_width);

    for (i, line) in wrapped_reason.iter().enumerate() {
        if i == 0 {
            let _ = write!(handle, "{}", paint("│"));
            let _ = write!(handle, "  {} ", "Reason:".yellow().bold());
            let _ = write!(handle, "{}", line.white());
            let padding = WIDTH.saturating_sub(reason_label.len() + line.len());
            let _ = writeln!(handle, "{}{}", " ".repeat(padding), paint("│"));
        } else {
            let indent = " ".repeat(reason_label.len());
            let padding = WIDTH.saturating_sub(indent.len() + line.len());
            let _ = write!(handle, "{}", paint("│"));
            let _ = write!(handle, "{}{}", indent, line.white());
            let _ = writeln!(handle, "{}{}", " ".repeat(padding), paint("│"));
        }
    }

    // Input section - highlight the offending input
    if let Some(text) = input {
        let _ = writeln!(handle, "{}{}{}", paint("│"), " ".repeat(WIDTH), paint("│"));
        let _ = write!(handle, "{}", paint("│"));
        let _ = write!(handle, "  {} ", "Input:".cyan().bold());

        let display = truncate_for_display(text, 50);
        let _ = write!(handle, "{}", display.bright_white().bold());
        // Use char count for padding (more correct for UTF-8 than byte length)
        let line_len = "  Input: ".len() + display.chars().count();
        let _ = writeln!(
            handle,
            "{}{}",
            " ".repeat(WIDTH.saturating_sub(line_len)),
            paint("│")
        );
    }

    // Separator before suggestions
    if !found.suggestions.is_empty() {
        let _ = writeln!(
            handle,
            "{}{}{}",
            paint("├"),
            paint(&"─".repeat(WIDTH)).dimmed(),
            paint("┤")
        );
        for suggestion in found.suggestions.iter().take(3) {
            let text = truncate_for_display(suggestion, WIDTH.saturating_sub(8));
            let _ = write!(handle, "{}", paint("│"));
            let _ = write!(handle, "  💡 {}", text.green());
            let line_len = 6 + text.len();
            let _ = writeln!(
                handle,
                "{}{}",
                " ".repeat(WIDTH.saturating_sub(line_len)),
                paint("│")
            );
        }
    }

    // Override hint for blocking, overridable rules
    if blocking && found.can_override {
        let _ = writeln!(handle, "{}{}{}", paint("│"), " ".repeat(WIDTH), paint("│"));
        let hint_cmd = format!("governor token create {} --reason \"...\"", found.rule_id);
        let _ = write!(handle, "{}", paint("│"));
        let _ = write!(handle, "  {} ", "Override:".bright_black());
        let _ = write!(handle, "{}", hint_cmd.cyan());
        let line_len = "  Override: ".len() + hint_cmd.len();
        let _ = writeln!(
            handle,
            "{}{}",
            " ".repeat(WIDTH.saturating_sub(line_len)),
            paint("│")
        );
    }

    // Bottom border with corners
    let _ = writeln!(
        handle,
        "{}{}{}",
        paint("╰"),
        paint(&"─".repeat(WIDTH)),
        paint("╯")
    );
    let _ = writeln!(handle);
}

/// Output a denial response to stdout (JSON for hook protocol).
#[cold]
#[inline(never)]
pub fn output_denial(input: Option<&str>, found: &RuleMatch) {
    // Colorful banner to stderr (visible to user)
    print_banner("BLOCKED", input, found, true);

    // JSON response for the hook protocol (stdout)
    let message = format_denial_message(input, found);
    let output = HookOutput {
        hook_specific_output: HookSpecificOutput {
            hook_event_name: "PreToolUse",
            permission_decision: "deny",
            permission_decision_reason: Cow::Owned(message),
        },
    };

    if let Ok(json) = serde_json::to_string(&output) {
        println!("{json}");
    }
}

/// Print a warning banner to stderr. The tool call still proceeds, so no
/// JSON decision is emitted.
#[cold]
#[inline(never)]
pub fn output_warning(input: Option<&str>, found: &RuleMatch) {
    print_banner("WARNING", input, found, false);
}

/// Truncate a string for display, appending "..." if truncated.
fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        // Find a safe UTF-8 boundary for truncation
        let target = max_len.saturating_sub(3);
        let boundary = s
            .char_indices()
            .take_while(|(i, _)| *i < target)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &s[..boundary])
    }
}

/// Wrap text to fit within a given width.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}
