//! Tool execution context, scoped to a single run's working directory

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::registry::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TOOL_TIMEOUT};
use super::safety::SafetyGuard;

/// Execution context for tools
#[derive(Clone)]
pub struct ToolContext {
    /// Project root; every path argument must resolve inside it
    root: PathBuf,
    run_id: String,
    safety: Arc<SafetyGuard>,
    /// Budget for the current call, set by the registry before dispatch
    timeout: Duration,
    /// Bytes a command may keep per output stream
    max_output: usize,
}

impl ToolContext {
    pub fn new(root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
            safety: Arc::new(SafetyGuard::new()),
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_output: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn with_safety(mut self, safety: Arc<SafetyGuard>) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn with_max_output(&self, max_output: usize) -> Self {
        Self {
            max_output,
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn safety(&self) -> &SafetyGuard {
        &self.safety
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_output(&self) -> usize {
        self.max_output
    }

    /// Canonical project root
    pub fn canonical_root(&self) -> Result<PathBuf, ToolError> {
        self.root.canonicalize().map_err(|e| ToolError::Io {
            operation: format!("canonicalize {}", self.root.display()),
            source: e,
        })
    }

    /// Resolve a path argument against the project root.
    ///
    /// `..` segments are folded lexically first, then the deepest existing
    /// ancestor is canonicalized so symlinks cannot lead outside the root. The
    /// returned path may not exist yet (for writes).
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf, ToolError> {
        let root = self.canonical_root()?;
        let denied = || ToolError::PathTraversal {
            path: raw.to_string(),
            root: root.clone(),
        };

        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() { candidate.to_path_buf() } else { root.join(candidate) };
        let normalized = normalize(&joined);
        if !normalized.starts_with(&root) {
            return Err(denied());
        }

        let mut existing = normalized.clone();
        let mut missing: Vec<OsString> = Vec::new();
        while std::fs::symlink_metadata(&existing).is_err() {
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => break,
            }
        }

        // Dangling symlinks fail here too
        let mut resolved = existing.canonicalize().map_err(|_| denied())?;
        if !resolved.starts_with(&root) {
            return Err(denied());
        }
        for name in missing.iter().rev() {
            resolved.push(name);
        }
        Ok(resolved)
    }
}

/// Fold `.` and `..` without touching the file system
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Errors raised inside tools; the registry renders them into failed results
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Path traversal denied: '{path}' resolves outside {}", .root.display())]
    PathTraversal { path: String, root: PathBuf },

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Command blocked by safety guard: {reason}")]
    Blocked { reason: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::InvalidInput {
            message: message.into(),
        }
    }
}
