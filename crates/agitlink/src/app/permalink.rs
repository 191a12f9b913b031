//! Composing permalinks and running the full window-to-URL pipeline.

use anyhow::{Context, Result};
use tracing::info;

use crate::app::window::{EditorWindow, read_snapshot};
use crate::domain::model::{LineRange, RepoContext, WindowSnapshot};
use crate::infra::acme::Win;
use crate::infra::config::Invocation;
use crate::infra::git::GitClient;

/// `https://<host>/<owner/name>/blob/<commit>/<path>#L<start>[-L<end>]`
pub fn compose(host: &str, repo: &RepoContext, lines: LineRange) -> String {
    let mut url = format!(
        "https://{host}/{}/blob/{}/{}",
        repo.slug, repo.commit, repo.relative_path
    );
    if lines.is_single_line() {
        url.push_str(&format!("#L{}", lines.start));
    } else {
        url.push_str(&format!("#L{}-L{}", lines.start, lines.end));
    }
    url
}

/// Permalink for the selection held in `snapshot`.
pub fn permalink_for(host: &str, snapshot: &WindowSnapshot, repo: &RepoContext) -> String {
    let lines = LineRange::from_selection(
        &snapshot.body,
        snapshot.selection_start,
        snapshot.selection_end,
    );
    compose(host, repo, lines)
}

/// Capture `window`, release it, then resolve its file's repository through `git`.
pub fn generate<W: EditorWindow>(
    mut window: W,
    git: &GitClient,
    invocation: &Invocation,
) -> Result<String> {
    let snapshot =
        read_snapshot(&mut window, invocation.chunk_size).context("cannot read acme window")?;
    drop(window);

    let repo = git.resolve(&snapshot.path, &invocation.ssh_prefix)?;
    let url = permalink_for(&invocation.host, &snapshot, &repo);
    info!(%url, "composed permalink");
    Ok(url)
}

/// Open the configured acme window and produce the permalink for its selection.
pub fn run(invocation: &Invocation) -> Result<String> {
    let window = Win::connect(&invocation.namespace, invocation.window_id, &invocation.user)?;
    generate(window, &GitClient::new(), invocation)
}
