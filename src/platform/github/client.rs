use async_trait::async_trait;
use octocrab::Octocrab;
use std::future::Future;
use std::sync::Arc;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::CodeHost;

use super::auth::GitHubAuth;
use super::mapper;

const COMMENTS_PER_PAGE: usize = 100;

/// Pull requests and reviews on the configured GitHub repository.
pub struct GitHubHost {
    auth: Arc<GitHubAuth>,
    owner: String,
    repo: String,
}

impl GitHubHost {
    pub fn new(config: &GitHubConfig, auth: Arc<GitHubAuth>) -> Result<Self> {
        let (owner, repo) = Self::parse_repo(&config.repository)?;
        Ok(Self {
            auth,
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    async fn client(&self) -> Result<Octocrab> {
        let token = self.auth.access_token().await?;
        Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))
    }

    fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
        match repo_full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
            _ => Err(AppError::GitHubApi(format!(
                "Invalid repo name: {repo_full_name}"
            ))),
        }
    }
}

#[async_trait]
impl CodeHost for GitHubHost {
    async fn create_pull_request(&self, pr: &CreatePullRequest) -> Result<PullRequestHandle> {
        let client = self.client().await?;

        let created = client
            .pulls(&self.owner, &self.repo)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .send()
            .await?;

        Ok(mapper::map_pull_request(&created))
    }

    /// Review comments that still need an answer: top-level comments made against the
    /// pull request's current head commit. Comments on earlier pushes and replies in a
    /// thread are dropped, so a fix push retires the feedback it addressed.
    async fn get_review_comments(&self, pr_id: u64) -> Result<Vec<ReviewComment>> {
        let client = self.client().await?;

        let head_sha = client.pulls(&self.owner, &self.repo).get(pr_id).await?.head.sha;

        let comments = collect_pages(|page| {
            let client = client.clone();
            let url = format!(
                "/repos/{}/{}/pulls/{pr_id}/comments?per_page={COMMENTS_PER_PAGE}&page={page}",
                self.owner, self.repo
            );
            async move {
                client
                    .get::<Vec<serde_json::Value>, _, _>(&url, None::<&()>)
                    .await
                    .map_err(|e| {
                        AppError::GitHubApi(format!("Failed to fetch review comments: {e}"))
                    })
            }
        })
        .await?;

        let outstanding = mapper::outstanding_review_comments(&comments, &head_sha);
        tracing::debug!(
            pr = pr_id,
            head = %head_sha,
            total = comments.len(),
            outstanding = outstanding.len(),
            "Fetched review comments"
        );
        Ok(outstanding)
    }
}

/// Fetch 1-based pages until one comes back short.
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    for page in 1.. {
        let batch = fetch(page).await?;
        let last = batch.len() < COMMENTS_PER_PAGE;
        items.extend(batch);
        if last {
            break;
        }
    }
    Ok(items)
}
