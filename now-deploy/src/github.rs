//! Commit status and pull-request comment reporting.
//!
//! Every call here is fire-and-forget: the outcome is logged and never
//! escalated, reporting problems must not change the deployment flow.

use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Pending,
    Success,
    Error,
}

impl StatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[async_trait]
pub trait CommitReporter {
    /// Sets a commit status under the given context label.
    async fn set_status(
        &self,
        sha: &str,
        context: &str,
        state: StatusState,
        description: &str,
        target_url: Option<&str>,
    );

    /// Comments on the configured pull request.
    async fn comment_on_pr(&self, body: &str);
}

/// Reports through the GitHub REST API.
pub struct GitHubReporter {
    client: Octocrab,
    repo_slug: String,
    pull_request: Option<u64>,
}

impl GitHubReporter {
    pub fn new(token: &str, repo_slug: &str, pull_request: Option<u64>) -> anyhow::Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;
        Ok(Self {
            client,
            repo_slug: repo_slug.to_string(),
            pull_request,
        })
    }
}

#[async_trait]
impl CommitReporter for GitHubReporter {
    async fn set_status(
        &self,
        sha: &str,
        context: &str,
        state: StatusState,
        description: &str,
        target_url: Option<&str>,
    ) {
        let route = format!("/repos/{}/statuses/{}", self.repo_slug, sha);
        let mut body = json!({
            "context": context,
            "state": state.as_str(),
            "description": description,
        });
        if let Some(url) = target_url {
            body["target_url"] = json!(url);
        }

        let posted: octocrab::Result<serde_json::Value> =
            self.client.post(route, Some(&body)).await;
        match posted {
            Ok(_) => info!(sha, state = state.as_str(), "commit status posted"),
            Err(err) => warn!(error = %err, sha, "failed to post commit status"),
        }
    }

    async fn comment_on_pr(&self, body: &str) {
        let Some(number) = self.pull_request else {
            warn!("no pull request number configured, skipping comment");
            return;
        };
        let Some((owner, repo)) = self.repo_slug.split_once('/') else {
            warn!(slug = %self.repo_slug, "malformed repository slug, skipping comment");
            return;
        };

        match self
            .client
            .issues(owner, repo)
            .create_comment(number, body)
            .await
        {
            Ok(_) => info!(number, "pull request comment created"),
            Err(err) => warn!(error = %err, number, "failed to create pull request comment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_states_render_github_values() {
        assert_eq!(StatusState::Pending.as_str(), "pending");
        assert_eq!(StatusState::Success.as_str(), "success");
        assert_eq!(StatusState::Error.as_str(), "error");
    }
}
