//! Git collaborator (spec §1: "out of scope... collaborator exposing:
//! `ensure_cloned`, `checkout(ref)`, `current_ref`, `list_tags`,
//! `read_tree(ref) -> Tree`").
//!
//! Shells out to the `git` binary, grounded in the teacher's
//! `connector_git.rs` (`git_clone`, `git_pull`, `git_head_sha` via
//! `std::process::Command`).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CangjieError, Result};

pub struct TreeEntry {
    pub path: String,
    pub contents: Vec<u8>,
}

pub struct GitRepo {
    dir: PathBuf,
    url: String,
}

impl GitRepo {
    pub fn new(dir: PathBuf, url: String) -> Self {
        Self { dir, url }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.dir)
            .args(args)
            .output()
            .map_err(|e| CangjieError::SourceUnavailable(format!("failed to run git: {e}")))?;
        if !output.status.success() {
            return Err(CangjieError::SourceUnavailable(format!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn ensure_cloned(&self) -> Result<()> {
        if self.dir.join(".git").exists() {
            Command::new("git")
                .current_dir(&self.dir)
                .args(["fetch", "--all", "--tags"])
                .output()
                .map_err(|e| CangjieError::SourceUnavailable(format!("git fetch failed: {e}")))?;
            return Ok(());
        }
        if let Some(parent) = self.dir.parent() {
            std::fs::create_dir_all(parent).map_err(CangjieError::backend)?;
        }
        let output = Command::new("git")
            .args(["clone", &self.url, &self.dir.display().to_string()])
            .output()
            .map_err(|e| CangjieError::SourceUnavailable(format!("git clone failed: {e}")))?;
        if !output.status.success() {
            return Err(CangjieError::SourceUnavailable(format!(
                "git clone of {} failed: {}",
                self.url,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// "latest" resolves to the default branch (`main` then `master`) per spec §4.8.
    pub fn checkout(&self, reference: &str) -> Result<()> {
        let target = if reference == "latest" {
            self.default_branch()?
        } else {
            reference.to_string()
        };
        self.run(&["checkout", &target])?;
        Ok(())
    }

    fn default_branch(&self) -> Result<String> {
        for candidate in ["main", "master"] {
            if self
                .run(&["show-ref", "--verify", &format!("refs/remotes/origin/{candidate}")])
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }
        Err(CangjieError::SourceUnavailable(
            "neither main nor master branch found".into(),
        ))
    }

    pub fn current_ref(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        let out = self.run(&["tag", "--list"])?;
        Ok(out.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Reads every blob under `subpath` at `reference` directly from the git
    /// object database, via `git ls-tree`/`git cat-file blob` — the working
    /// tree is never checked out or touched (spec §4.9).
    pub fn read_tree(&self, reference: &str, subpath: &str) -> Result<Vec<TreeEntry>> {
        let target = if reference == "latest" {
            self.default_branch()?
        } else {
            reference.to_string()
        };

        let tree_spec = format!("{target}:{subpath}");
        let listing = match self.run(&["ls-tree", "-r", "--name-only", &tree_spec]) {
            Ok(out) => out,
            Err(_) => return Ok(Vec::new()),
        };

        let mut entries = Vec::new();
        for rel in listing.lines().filter(|l| !l.is_empty()) {
            let blob_spec = format!("{target}:{subpath}/{rel}");
            let contents = self.read_blob(&blob_spec)?;
            entries.push(TreeEntry {
                path: format!("{subpath}/{rel}"),
                contents,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// `git cat-file blob <spec>`, returning raw bytes. Bypasses `run()`,
    /// which decodes to UTF-8 and trims — unsuitable for binary content.
    fn read_blob(&self, spec: &str) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .current_dir(&self.dir)
            .args(["cat-file", "blob", spec])
            .output()
            .map_err(|e| CangjieError::SourceUnavailable(format!("failed to run git: {e}")))?;
        if !output.status.success() {
            return Err(CangjieError::SourceUnavailable(format!(
                "git cat-file blob {spec} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(output.stdout)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
