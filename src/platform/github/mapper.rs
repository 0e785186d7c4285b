use crate::platform::types;

/// Map an octocrab pull request to our handle.
pub fn map_pull_request(pr: &octocrab::models::pulls::PullRequest) -> types::PullRequestHandle {
    types::PullRequestHandle {
        id: pr.number,
        url: pr
            .html_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_default(),
    }
}

/// Map a raw review comment from the REST API.
pub fn map_review_comment(comment: &serde_json::Value) -> types::ReviewComment {
    types::ReviewComment {
        author: comment["user"]["login"].as_str().map(|s| s.to_string()),
        body: comment["body"].as_str().unwrap_or("").to_string(),
    }
}

/// Keep top-level comments made on `head_sha`, in host order.
///
/// `original_commit_id` is the commit the reviewer looked at; `commit_id` moves forward
/// with the diff, so it is only consulted when the former is absent.
pub fn outstanding_review_comments(
    comments: &[serde_json::Value],
    head_sha: &str,
) -> Vec<types::ReviewComment> {
    comments
        .iter()
        .filter(|c| c["in_reply_to_id"].is_null())
        .filter(|c| {
            c["original_commit_id"]
                .as_str()
                .or_else(|| c["commit_id"].as_str())
                == Some(head_sha)
        })
        .map(map_review_comment)
        .collect()
}
