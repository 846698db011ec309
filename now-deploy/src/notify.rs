//! Discord webhook notifications.
//!
//! One message per deployment outcome, posted exactly once. A missing hook
//! URL or a failed POST is logged and swallowed.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    content: &'a str,
}

#[async_trait]
pub trait Notify {
    /// Posts the fixed failure message with a link to the build log.
    async fn failure(&self);

    /// Posts the success summary, preferring the alias URL when present.
    async fn success(&self, context_label: &str, url: &str, alias_url: Option<&str>);
}

/// Markdown summary of a finished deployment, shared by the PR comment and
/// the Discord success message.
pub fn deployment_summary(context_label: &str, url: &str) -> String {
    format!(
        "### New Δ Now {context_label} deployment complete\n\
         - ✅ **Build Passed**\n\
         - 🚀 **URL** : {url}\n\
         ---\n\
         Note: **This is autogenerated through travis-ci build**"
    )
}

fn success_content(context_label: &str, url: &str, alias_url: Option<&str>) -> String {
    deployment_summary(context_label, alias_url.unwrap_or(url))
}

/// Posts to a Discord webhook as `<deployment-name>-BOT`.
pub struct DiscordWebhook {
    client: reqwest::Client,
    hook_url: Option<String>,
    username: String,
    log_url: String,
}

impl DiscordWebhook {
    pub fn new(hook_url: Option<String>, deployment_name: &str, log_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            hook_url,
            username: format!("{deployment_name}-BOT"),
            log_url,
        }
    }

    async fn post(&self, content: &str) {
        let Some(hook) = &self.hook_url else {
            warn!("DISCORD_HOOK not configured, skipping notification");
            return;
        };

        let payload = WebhookPayload {
            username: &self.username,
            content,
        };
        match self.client.post(hook).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("notification posted to discord");
            }
            Ok(response) => {
                warn!(status = %response.status(), "discord webhook rejected notification");
            }
            Err(err) => warn!(error = %err, "failed to post discord notification"),
        }
    }
}

#[async_trait]
impl Notify for DiscordWebhook {
    async fn failure(&self) {
        self.post(&format!(
            "Deployment failed, check travis logs here {}",
            self.log_url
        ))
        .await;
    }

    async fn success(&self, context_label: &str, url: &str, alias_url: Option<&str>) {
        self.post(&success_content(context_label, url, alias_url))
            .await;
    }
}
