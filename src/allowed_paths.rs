//! Allowed-paths bypass.
//!
//! Projects can declare glob patterns for directories where file operations
//! are sanctioned; a Write or Edit whose target matches bypasses content
//! rules entirely. `*` and `?` never cross a path separator, `**` does, and
//! matches are anchored against the full normalized path. An empty list
//! allows nothing.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::Path;

/// Compiled allowed-path patterns for one project config.
#[derive(Debug)]
pub struct AllowedPaths {
    set: GlobSet,
    patterns: Vec<String>,
}

/// A pattern in `allowed_paths` failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedPathsError {
    pub pattern: String,
    pub message: String,
}

impl fmt::Display for AllowedPathsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid allowed_paths pattern '{}': {}",
            self.pattern, self.message
        )
    }
}

impl std::error::Error for AllowedPathsError {}

impl AllowedPaths {
    /// Compile the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AllowedPathsError`] for the first pattern that is not a
    /// valid glob. This is a configuration error.
    pub fn compile(patterns: &[String]) -> Result<Self, AllowedPathsError> {
        let mut builder = GlobSetBuilder::new();
        let mut normalized_patterns = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let normalized = normalize(pattern);
            let glob = GlobBuilder::new(&normalized)
                .literal_separator(true)
                .build()
                .map_err(|e| AllowedPathsError {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
            normalized_patterns.push(normalized);
        }

        let set = builder.build().map_err(|e| AllowedPathsError {
            pattern: String::new(),
            message: e.to_string(),
        })?;

        Ok(Self {
            set,
            patterns: normalized_patterns,
        })
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path` falls under a sanctioned directory.
    ///
    /// The path is checked as given; when it sits inside `project_dir` the
    /// project-relative form is checked too, and a relative path is also
    /// checked in its absolute form. Patterns are usually written relative to
    /// the project root.
    #[must_use]
    pub fn is_allowed(&self, path: &str, project_dir: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let given = normalize(path);
        if self.set.is_match(given.as_str()) {
            return true;
        }

        let project = normalize(&project_dir.to_string_lossy());
        if Path::new(&given).is_absolute() {
            let prefix = format!("{}/", project.trim_end_matches('/'));
            if let Some(relative) = given.strip_prefix(&prefix) {
                if self.set.is_match(relative) {
                    return true;
                }
            }
        } else {
            let absolute = format!("{}/{}", project.trim_end_matches('/'), given);
            if self.set.is_match(absolute.as_str()) {
                return true;
            }
        }

        false
    }
}

/// Normalize separators: backslashes become slashes, duplicate slashes
/// collapse.
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    out
}
