//! Travis CI deployment driver for the `now` CLI.
//!
//! Waits for the rest of the build matrix, deploys the build through `now`,
//! then reports the result: pull-request builds go to staging and report back
//! to GitHub (commit status plus PR comment), push builds go to production
//! and get an alias bound. Both paths notify Discord on failure; production
//! also notifies on success.
//!
//! # Usage
//!
//! ```bash
//! # Staging/production deployment, picked from TRAVIS_EVENT_TYPE
//! now-deploy
//!
//! # Public deployment of a subfolder under a team scope
//! now-deploy --public --team acme --folder ./dist
//!
//! # Skip the PR comment
//! now-deploy --comment false
//! ```

mod barrier;
mod config;
mod extract;
mod github;
mod notify;
mod now;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::barrier::{BarrierOutcome, JobBarrier, TravisBarrier};
use crate::config::{ArgBundle, Config};
use crate::extract::first_url;
use crate::github::{CommitReporter, GitHubReporter, StatusState};
use crate::notify::{DiscordWebhook, Notify, deployment_summary};
use crate::now::{Deployer, NowCli};

/// Deploys Travis builds through the `now` CLI and reports the result.
#[derive(Parser, Debug)]
#[command(name = "now-deploy")]
#[command(about = "Deploys Travis builds through the now CLI and reports results")]
struct Args {
    /// Show debug info.
    #[arg(short, long)]
    debug: bool,

    /// Deployment is public (`/_src` is exposed).
    #[arg(short, long)]
    public: bool,

    /// Set a custom team scope.
    #[arg(short = 'T', long)]
    team: Option<String>,

    /// Set a folder to deploy.
    #[arg(short = 'F', long)]
    folder: Option<PathBuf>,

    /// Post a comment to the PR issue summarizing the deployment results.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    comment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Staging,
    Production,
}

impl Context {
    fn label(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Event types other than these two are deliberately ignored.
fn select_context(event_type: &str) -> Option<Context> {
    match event_type {
        "pull_request" => Some(Context::Staging),
        "push" => Some(Context::Production),
        _ => None,
    }
}

fn alias_link(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// One deployment attempt. Every reporting call in here is fire-and-forget;
/// only a failure to spawn the tool itself propagates as an error.
#[allow(clippy::too_many_arguments)]
async fn deploy(
    context: Context,
    sha: &str,
    cfg: &Config,
    bundle: &ArgBundle,
    deployer: &dyn Deployer,
    reporter: &dyn CommitReporter,
    notifier: &dyn Notify,
    post_comment: bool,
) -> anyhow::Result<()> {
    let label = context.label();
    info!(context = label, sha, "starting deployment");

    if context == Context::Staging {
        reporter
            .set_status(
                sha,
                label,
                StatusState::Pending,
                &format!("Δ Now {label} deployment pending"),
                None,
            )
            .await;
    }

    let outcome = deployer.run(&bundle.deploy_args()).await?;

    if !outcome.succeeded() {
        if context == Context::Staging {
            reporter
                .set_status(
                    sha,
                    label,
                    StatusState::Error,
                    &format!("Δ Now {label} deployment failed"),
                    None,
                )
                .await;
        }
        notifier.failure().await;
        error!(exit_code = outcome.exit_code, "now process exited with failure");
        return Ok(());
    }

    let deployed_url = first_url(&outcome.output);
    info!(url = deployed_url.as_deref().unwrap_or("<none>"), "deployment finished");

    match context {
        Context::Staging => {
            reporter
                .set_status(
                    sha,
                    label,
                    StatusState::Success,
                    &format!("Δ Now {label} deployment complete"),
                    deployed_url.as_deref(),
                )
                .await;
            if post_comment {
                if let Some(url) = &deployed_url {
                    reporter.comment_on_pr(&deployment_summary(label, url)).await;
                }
            }
        }
        Context::Production => {
            let Some(url) = &deployed_url else {
                error!("no deployment URL found in now output");
                notifier.failure().await;
                return Ok(());
            };

            let code = deployer
                .alias(&bundle.base, url, cfg.alias_host.as_deref())
                .await?;
            if code != 0 {
                notifier.failure().await;
                error!(exit_code = code, "now alias exited with failure");
                return Ok(());
            }

            let alias_url = cfg.alias_host.as_deref().map(alias_link);
            notifier.success(label, url, alias_url.as_deref()).await;
            info!("done");
        }
    }

    Ok(())
}

/// Top-level driver: barrier, then the branch selected by the event type.
/// Barrier failure and unrecognized event types are silent no-ops.
async fn run(
    cfg: &Config,
    bundle: &ArgBundle,
    barrier: &dyn JobBarrier,
    deployer: &dyn Deployer,
    reporter: &dyn CommitReporter,
    notifier: &dyn Notify,
    post_comment: bool,
) -> anyhow::Result<()> {
    match barrier.await_all_jobs().await {
        Ok(BarrierOutcome::Release) => {}
        Ok(BarrierOutcome::Skip) => {
            info!("barrier did not release for this job, nothing to do");
            return Ok(());
        }
        Err(err) => {
            warn!(error = %err, "job barrier failed, nothing to do");
            return Ok(());
        }
    }

    match select_context(&cfg.event_type) {
        Some(context @ Context::Staging) => {
            let sha = cfg.pull_request_sha.clone().unwrap_or_default();
            deploy(context, &sha, cfg, bundle, deployer, reporter, notifier, post_comment).await
        }
        Some(context @ Context::Production) => {
            let sha = cfg.commit_sha.clone().unwrap_or_default();
            deploy(context, &sha, cfg, bundle, deployer, reporter, notifier, post_comment).await
        }
        None => {
            info!(event = %cfg.event_type, "unhandled event type, nothing to do");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env()?;
    let bundle = ArgBundle::assemble(
        &cfg,
        args.debug,
        args.team.as_deref(),
        args.public,
        args.folder.as_deref(),
    );

    let barrier = TravisBarrier::new(cfg.build_id.clone(), cfg.job_number.clone());
    let deployer = NowCli::default();
    let reporter = GitHubReporter::new(&cfg.github_token, &cfg.repo_slug, cfg.pull_request)?;
    let notifier = DiscordWebhook::new(
        cfg.discord_hook.clone(),
        &cfg.deployment_name(),
        cfg.log_url(),
    );

    run(&cfg, &bundle, &barrier, &deployer, &reporter, &notifier, args.comment).await
}
