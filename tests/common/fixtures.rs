//! Project scaffolding for integration tests.
//!
//! Builds throwaway project directories with a `.governor/` state directory
//! and an optional configuration file.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project directory with governor state.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Create a project with no configuration (defaults apply).
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp project");
        std::fs::create_dir_all(dir.path().join(".governor"))
            .expect("failed to create state dir");
        Self { dir }
    }

    /// Create a project with the given `config.json` contents.
    #[must_use]
    pub fn with_config(config_json: &str) -> Self {
        let project = Self::new();
        std::fs::write(project.config_path(), config_json).expect("failed to write config");
        project
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join(".governor").join("config.json")
    }

    #[must_use]
    pub fn tokens_path(&self) -> PathBuf {
        self.dir.path().join(".governor").join("override-tokens.json")
    }

    #[must_use]
    pub fn audit_path(&self) -> PathBuf {
        self.dir.path().join(".governor").join("audit.jsonl")
    }

    /// Read the raw audit trail, empty if nothing was recorded.
    #[must_use]
    pub fn audit_contents(&self) -> String {
        std::fs::read_to_string(self.audit_path()).unwrap_or_default()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
