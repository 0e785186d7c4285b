pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Open a pull request from `head_branch` into `base_branch`.
    async fn create_pull_request(&self, pr: &CreatePullRequest) -> Result<PullRequestHandle>;

    /// Fetch review comments on a pull request.
    ///
    /// An empty list means there is no outstanding feedback.
    async fn get_review_comments(&self, pr_id: u64) -> Result<Vec<ReviewComment>>;
}
