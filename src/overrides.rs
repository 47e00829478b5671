//! Override token store.
//!
//! Tokens grant scoped, time-bounded permission to bypass a specific rule.
//! They live in a JSON document at `<project>/.governor/override-tokens.json`
//! shaped as `{"tokens": [...]}`. Every mutation holds an OS exclusive file
//! lock across the whole read-modify-write cycle, so consuming a token is
//! atomic even when several gate processes race: exactly one consumer of a
//! single-use token wins.
//!
//! Lock acquisition is bounded. If the lock cannot be taken within the retry
//! budget the store reports an error and the caller fails open.

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::STATE_DIR;

/// Token file name inside the state directory.
pub const TOKENS_FILE: &str = "override-tokens.json";

const DEFAULT_EXPIRY_MINUTES: i64 = 60;
const DEFAULT_MAX_USES: u32 = 1;

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY_MS: u64 = 10;

/// What an override token covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScope {
    /// Any invocation that matched the token's rule.
    All,
    /// File operations whose target path matches this glob.
    File(String),
    /// Shell commands containing this substring.
    Command(String),
}

impl TokenScope {
    /// Parse the stored form: `all`, `file:<glob>`, or `command:<pattern>`.
    ///
    /// # Errors
    ///
    /// Returns a message for unrecognized scope strings or empty values.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw == "all" {
            return Ok(Self::All);
        }
        if let Some(glob) = raw.strip_prefix("file:") {
            if glob.is_empty() {
                return Err("file scope requires a glob pattern".to_string());
            }
            return Ok(Self::File(glob.to_string()));
        }
        if let Some(pattern) = raw.strip_prefix("command:") {
            if pattern.is_empty() {
                return Err("command scope requires a pattern".to_string());
            }
            return Ok(Self::Command(pattern.to_string()));
        }
        Err(format!(
            "unrecognized scope '{raw}' (expected 'all', 'file:<glob>', or 'command:<pattern>')"
        ))
    }

    /// Whether this scope covers the invocation context.
    #[must_use]
    pub fn covers(&self, context: &OverrideContext) -> bool {
        match (self, context) {
            (Self::All, _) => true,
            (Self::File(glob), OverrideContext::File(path)) => {
                GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher().is_match(path.as_str()))
                    .unwrap_or(false)
            }
            (Self::Command(pattern), OverrideContext::Command(command)) => {
                command.contains(pattern.as_str())
            }
            _ => false,
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::File(glob) => write!(f, "file:{glob}"),
            Self::Command(pattern) => write!(f, "command:{pattern}"),
        }
    }
}

impl Serialize for TokenScope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenScope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The invocation side of a scope check, derived by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideContext {
    /// Target path of a Write/Edit.
    File(String),
    /// Full command line of a Bash invocation.
    Command(String),
}

/// A stored override token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideToken {
    pub token_id: Uuid,
    pub rule_id: String,
    pub scope: TokenScope,
    pub created_at: DateTime<Utc>,
    /// `None` means the token never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// `0` means unlimited uses.
    pub max_uses: u32,
    pub use_count: u32,
    pub reason: String,
    pub creator: String,
}

impl OverrideToken {
    /// Valid iff not expired and not exhausted.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let not_expired = self.expires_at.map_or(true, |expires| now < expires);
        let has_uses = self.max_uses == 0 || self.use_count < self.max_uses;
        not_expired && has_uses
    }

    #[must_use]
    pub fn remaining_uses(&self) -> Option<u32> {
        if self.max_uses == 0 {
            None
        } else {
            Some(self.max_uses.saturating_sub(self.use_count))
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenDocument {
    tokens: Vec<OverrideToken>,
}

/// Token store errors. The evaluator fails open on any of these.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// Lock retries exhausted.
    LockTimeout { path: PathBuf },
    InvalidInput(String),
    TokenNotFound { token_id: Uuid },
    /// Found, but expired or exhausted.
    TokenNotValid { token_id: Uuid },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "token store I/O error: {e}"),
            Self::LockTimeout { path } => {
                write!(f, "could not lock token store {}", path.display())
            }
            Self::InvalidInput(message) => write!(f, "invalid token request: {message}"),
            Self::TokenNotFound { token_id } => write!(f, "token {token_id} not found"),
            Self::TokenNotValid { token_id } => {
                write!(f, "token {token_id} is expired or exhausted")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Durable override token store for one project.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The store for a project's state directory.
    #[must_use]
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(STATE_DIR).join(TOKENS_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create and persist a new token.
    ///
    /// `expiry_minutes` of 0 means the token never expires; `max_uses` of 0
    /// means unlimited uses.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an empty rule id, or an I/O
    /// or lock error from the store file.
    pub fn generate(
        &self,
        rule_id: &str,
        scope: TokenScope,
        expiry_minutes: Option<i64>,
        max_uses: Option<u32>,
        reason: &str,
        creator: &str,
    ) -> Result<OverrideToken, StoreError> {
        if rule_id.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "rule_id must not be empty".to_string(),
            ));
        }
        let expiry_minutes = expiry_minutes.unwrap_or(DEFAULT_EXPIRY_MINUTES);
        if expiry_minutes < 0 {
            return Err(StoreError::InvalidInput(
                "expiry_minutes must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let token = OverrideToken {
            token_id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            scope,
            created_at: now,
            expires_at: (expiry_minutes > 0).then(|| now + Duration::minutes(expiry_minutes)),
            max_uses: max_uses.unwrap_or(DEFAULT_MAX_USES),
            use_count: 0,
            reason: reason.to_string(),
            creator: creator.to_string(),
        };

        let mut file = self.open_locked()?;
        let mut doc = load_document(&mut file, &self.path);
        doc.tokens.push(token.clone());
        rewrite_document(&mut file, &doc)?;

        Ok(token)
    }

    /// Valid tokens for `rule_id` whose scope covers `context`, ordered
    /// oldest-created-first (token id breaks exact ties).
    ///
    /// # Errors
    ///
    /// Returns I/O or lock errors from the store file.
    pub fn find_applicable(
        &self,
        rule_id: &str,
        context: &OverrideContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverrideToken>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut file = self.open_locked()?;
        let doc = load_document(&mut file, &self.path);

        let mut applicable: Vec<OverrideToken> = doc
            .tokens
            .into_iter()
            .filter(|t| t.rule_id == rule_id && t.is_valid(now) && t.scope.covers(context))
            .collect();
        applicable.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.token_id.cmp(&b.token_id))
        });
        Ok(applicable)
    }

    /// Atomically record one use of a token.
    ///
    /// The exclusive lock spans the read, validity check, increment, and
    /// rewrite. Concurrent consumers of a single-use token serialize here and
    /// all but the first see [`StoreError::TokenNotValid`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TokenNotFound`] for unknown ids,
    /// [`StoreError::TokenNotValid`] for expired or exhausted tokens, or an
    /// I/O or lock error from the store file.
    pub fn consume(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<OverrideToken, StoreError> {
        let mut file = self.open_locked()?;
        let mut doc = load_document(&mut file, &self.path);

        let token = doc
            .tokens
            .iter_mut()
            .find(|t| t.token_id == token_id)
            .ok_or(StoreError::TokenNotFound { token_id })?;

        if !token.is_valid(now) {
            return Err(StoreError::TokenNotValid { token_id });
        }

        token.use_count += 1;
        let consumed = token.clone();
        rewrite_document(&mut file, &doc)?;
        Ok(consumed)
    }

    /// Remove a token. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns I/O or lock errors from the store file.
    pub fn revoke(&self, token_id: Uuid) -> Result<bool, StoreError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let mut file = self.open_locked()?;
        let mut doc = load_document(&mut file, &self.path);

        let before = doc.tokens.len();
        doc.tokens.retain(|t| t.token_id != token_id);
        let removed = doc.tokens.len() < before;
        if removed {
            rewrite_document(&mut file, &doc)?;
        }
        Ok(removed)
    }

    /// List tokens, newest first. `rule_id` of `None` lists every rule;
    /// invalid tokens are included only on request.
    ///
    /// # Errors
    ///
    /// Returns I/O or lock errors from the store file.
    pub fn list(
        &self,
        rule_id: Option<&str>,
        include_invalid: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<OverrideToken>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut file = self.open_locked()?;
        let doc = load_document(&mut file, &self.path);

        let mut tokens: Vec<OverrideToken> = doc
            .tokens
            .into_iter()
            .filter(|t| rule_id.map_or(true, |r| t.rule_id == r))
            .filter(|t| include_invalid || t.is_valid(now))
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    /// Drop expired tokens from the document. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns I/O or lock errors from the store file.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut file = self.open_locked()?;
        let mut doc = load_document(&mut file, &self.path);

        let before = doc.tokens.len();
        doc.tokens
            .retain(|t| t.expires_at.map_or(true, |expires| now < expires));
        let pruned = before - doc.tokens.len();
        if pruned > 0 {
            rewrite_document(&mut file, &doc)?;
        }
        Ok(pruned)
    }

    fn open_locked(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        for attempt in 0..LOCK_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if attempt + 1 < LOCK_ATTEMPTS {
                        std::thread::sleep(std::time::Duration::from_millis(LOCK_RETRY_DELAY_MS));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::LockTimeout {
            path: self.path.clone(),
        })
    }
}

/// Read the document under the lock. A corrupt or empty file is treated as
/// an empty document rather than an error; the corruption is reported on
/// stderr and the next write repairs the file.
fn load_document(file: &mut File, path: &Path) -> TokenDocument {
    let mut raw = String::new();

    if file.seek(SeekFrom::Start(0)).is_err() || file.read_to_string(&mut raw).is_err() {
        eprintln!(
            "governor: token store {} is unreadable; treating it as empty",
            path.display()
        );
        return TokenDocument::default();
    }
    if raw.trim().is_empty() {
        return TokenDocument::default();
    }

    match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!(
                "governor: token store {} is corrupt ({e}); treating it as empty",
                path.display()
            );
            TokenDocument::default()
        }
    }
}

fn rewrite_document(file: &mut File, doc: &TokenDocument) -> Result<(), StoreError> {
    let serialized = serde_json::to_string_pretty(doc).map_err(io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(())
}
