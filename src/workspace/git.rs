use std::path::{Path, PathBuf};

use git2::{
    build::RepoBuilder, Cred, FetchOptions, PushOptions, RemoteCallbacks, Repository, Signature,
};

use crate::error::{AppError, Result};

const BOT_NAME: &str = "Momentum Bot";
const BOT_EMAIL: &str = "momentum[bot]@users.noreply.github.com";

/// Validate a branch name to prevent argument injection.
/// Rejects names starting with `-` and anything git itself refuses.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    if !git2::Reference::is_valid_name(&format!("refs/heads/{name}")) {
        return Err(AppError::Git(format!("Invalid branch name: {name}")));
    }
    Ok(())
}

/// Build `FetchOptions` that authenticate via credential callback.
/// The token is captured by the closure and never written to disk.
fn make_fetch_options(token: &str) -> FetchOptions<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Build `PushOptions` that authenticate via credential callback.
///
/// libgit2 reports per-ref rejections (non-fast-forward, protected branch, hook
/// declined) through `push_update_reference` rather than as an error; they are
/// collected into `rejected` as `"<ref>: <reason>"`.
fn make_push_options<'a>(token: &'a str, rejected: &'a mut Vec<String>) -> PushOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    callbacks.push_update_reference(move |refname, status| {
        if let Some(reason) = status {
            rejected.push(format!("{refname}: {reason}"));
        }
        Ok(())
    });
    let mut opts = PushOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Clone a repository into the target directory.
///
/// The remote URL stored in `.git/config` will be the **plain** URL
/// (no credentials). Authentication is handled via credential callback only.
pub async fn clone(url: &str, target: &Path, token: &str) -> Result<()> {
    if !url.starts_with("https://") {
        return Err(AppError::Git(format!(
            "Expected HTTPS clone URL, got: {url}"
        )));
    }

    let url = url.to_string();
    let target = target.to_path_buf();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let fetch_opts = make_fetch_options(&token);
        RepoBuilder::new()
            .fetch_options(fetch_opts)
            .clone(&url, &target)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Create and checkout a new branch from HEAD.
pub async fn create_branch(dir: &Path, branch_name: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        repo.branch(&branch_name, &commit, false)?;
        let obj = repo.revparse_single(&format!("refs/heads/{branch_name}"))?;
        repo.checkout_tree(&obj, None)?;
        repo.set_head(&format!("refs/heads/{branch_name}"))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Create-branch task panicked: {e}")))?
}

/// Stage the given working-copy paths. A path missing from disk is staged as a deletion.
pub async fn add_paths(dir: &Path, paths: &[&str]) -> Result<()> {
    let dir = dir.to_path_buf();
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        for path in &paths {
            if dir.join(path).is_file() {
                index.add_path(path)?;
            } else {
                index.remove_path(path)?;
            }
        }
        index.write()?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Add task panicked: {e}")))?
}

/// Commit the index on top of HEAD.
pub async fn commit(dir: &Path, message: &str) -> Result<()> {
    let dir = dir.to_path_buf();
    let message = message.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let sig = Signature::now(BOT_NAME, BOT_EMAIL)?;
        let mut index = repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;
        let head = repo.head()?;
        let parent = head.peel_to_commit()?;
        repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Commit task panicked: {e}")))?
}

/// Push a local branch to the same name on origin.
pub async fn push(dir: &Path, branch_name: &str, token: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
        let mut rejected = Vec::new();
        {
            let mut push_opts = make_push_options(&token, &mut rejected);
            remote.push(&[&refspec], Some(&mut push_opts))?;
        }
        ensure_accepted(&rejected)
    })
    .await
    .map_err(|e| AppError::Git(format!("Push task panicked: {e}")))?
}

fn ensure_accepted(rejected: &[String]) -> Result<()> {
    if rejected.is_empty() {
        Ok(())
    } else {
        Err(AppError::Git(format!("Push rejected: {}", rejected.join("; "))))
    }
}

/// Check whether the index differs from HEAD.
pub async fn has_staged_changes(dir: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head_tree = repo.head()?.peel_to_tree()?;
        let index = repo.index()?;
        let diff = repo.diff_tree_to_index(Some(&head_tree), Some(&index), None)?;
        Ok(diff.deltas().next().is_some())
    })
    .await
    .map_err(|e| AppError::Git(format!("Staged-changes task panicked: {e}")))?
}
