//! Git-backed implementation of the [`VcsBackend`] seam.
//!
//! Shells out to the `git` binary with opaque argument vectors; the core
//! never interprets repository contents itself.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use keel_engine::{EngineError, VcsBackend};
use tracing::debug;

/// Runs `git -C <repo_root> ...` for queries and pushes.
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Find the repository root containing `start`, if any.
    pub fn discover_root(start: &Path) -> Option<PathBuf> {
        let output = Command::new("git")
            .arg("-C")
            .arg(start)
            .args(["rev-parse", "--show-toplevel"])
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() { None } else { Some(PathBuf::from(root)) }
    }

    /// The symbolic ref of HEAD (e.g. `refs/heads/main`), if on a branch.
    pub fn head_ref(&self) -> Option<String> {
        self.output(&["symbolic-ref", "-q", "HEAD"])
    }

    /// Run a git query, returning trimmed stdout on success.
    fn output(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    }
}

impl VcsBackend for GitCli {
    fn current_branch(&self) -> Option<String> {
        self.output(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn upstream(&self) -> Option<String> {
        self.output(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
    }

    fn rev_parse(&self, rev: &str) -> Option<String> {
        self.output(&["rev-parse", rev])
    }

    fn push(&self, args: &[String]) -> Result<(), EngineError> {
        debug!(?args, "running git push");
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .arg("push")
            .args(args)
            .status()
            .map_err(|e| EngineError::Backend(format!("could not run git: {e}")))?;
        if !status.success() {
            return Err(EngineError::Backend(format!(
                "git push exited with {status}"
            )));
        }
        Ok(())
    }
}
