//! Git integration utilities.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::errors::LinkError;
use crate::domain::model::RepoContext;

/// Runs the `git` executable to learn where a file lives upstream.
#[derive(Debug, Clone)]
pub struct GitClient {
    program: OsString,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific git executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolve remote slug, repository-relative path and HEAD commit for `file`.
    pub fn resolve(&self, file: &Path, ssh_prefix: &str) -> Result<RepoContext> {
        let dir = parent_dir(file);
        let slug = self
            .remote_slug(dir, ssh_prefix)
            .context("cannot get repo")?;
        let relative_path = self
            .relative_path(file)
            .context("cannot get relative path")?;
        let commit = self.head_commit(dir).context("cannot get commit")?;

        Ok(RepoContext {
            slug,
            relative_path,
            commit,
        })
    }

    /// `owner/name` of the origin remote, which must start with `ssh_prefix`.
    pub fn remote_slug(&self, dir: &Path, ssh_prefix: &str) -> Result<String, LinkError> {
        let remote = self.output(dir, &["remote", "get-url", "origin"])?;
        strip_remote_prefix(&remote, ssh_prefix)
    }

    /// Path of `file` from the root of its repository, `/`-separated.
    pub fn relative_path(&self, file: &Path) -> Result<String, LinkError> {
        let prefix = self.output(parent_dir(file), &["rev-parse", "--show-prefix"])?;
        let name = file.file_name().ok_or_else(|| {
            LinkError::UnexpectedFormat(format!("{} has no file name", file.display()))
        })?;
        Ok(join_prefix(prefix.trim(), &name.to_string_lossy()))
    }

    pub fn head_commit(&self, dir: &Path) -> Result<String, LinkError> {
        Ok(self.output(dir, &["rev-parse", "HEAD"])?.trim().to_owned())
    }

    fn output(&self, dir: &Path, args: &[&str]) -> Result<String, LinkError> {
        let command_line = format!("git {}", args.join(" "));
        debug!(dir = %dir.display(), command = %command_line, "running git");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| LinkError::ExternalTool(format!("cannot run {command_line}: {err}")))?;

        if !output.status.success() {
            return Err(LinkError::ExternalTool(format!(
                "{command_line} failed: {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Strip `prefix` from a remote URL, leaving the trimmed `owner/name` part.
pub fn strip_remote_prefix(remote: &str, prefix: &str) -> Result<String, LinkError> {
    match remote.strip_prefix(prefix) {
        Some(rest) => Ok(rest.trim().to_owned()),
        None => Err(LinkError::UnexpectedFormat(format!(
            "unexpected prefix for remote {remote:?} (want {prefix:?})"
        ))),
    }
}

fn join_prefix(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

fn parent_dir(file: &Path) -> &Path {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
