use serde::{Deserialize, Serialize};

/// Identifies a pull request opened by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHandle {
    /// Pull request number.
    pub id: u64,
    pub url: String,
}

/// One review comment, in the order the host returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub author: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}
