//! Thin wrapper around the `now` deployment CLI.
//!
//! Subprocess failure is data here: a nonzero exit code comes back in the
//! outcome, it is never an `Err`. Errors are reserved for not being able to
//! spawn the tool at all.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Exit code and combined output of one `now` invocation.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,

    /// Captured stdout, with stderr appended when non-empty.
    pub output: String,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Deployer {
    /// Runs one deployment with the given argument list.
    async fn run(&self, args: &[String]) -> anyhow::Result<DeployOutcome>;

    /// Binds `alias_host` to `deployed_url`. Without a host the tool falls
    /// back to the alias configured in its own config file.
    async fn alias(
        &self,
        base_args: &[String],
        deployed_url: &str,
        alias_host: Option<&str>,
    ) -> anyhow::Result<i32>;
}

/// Shells out to the real `now` binary.
pub struct NowCli {
    binary: String,
}

impl NowCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn invoke(&self, args: &[String]) -> anyhow::Result<DeployOutcome> {
        debug!(binary = %self.binary, ?args, "invoking deployment tool");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let exit_code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(&stderr);
        }

        Ok(DeployOutcome { exit_code, output: text })
    }
}

impl Default for NowCli {
    fn default() -> Self {
        Self::new("now")
    }
}

#[async_trait]
impl Deployer for NowCli {
    async fn run(&self, args: &[String]) -> anyhow::Result<DeployOutcome> {
        self.invoke(args).await
    }

    async fn alias(
        &self,
        base_args: &[String],
        deployed_url: &str,
        alias_host: Option<&str>,
    ) -> anyhow::Result<i32> {
        let mut args = vec!["alias".to_string(), deployed_url.to_string()];
        if let Some(host) = alias_host {
            args.push(host.to_string());
        }
        args.extend_from_slice(base_args);

        Ok(self.invoke(&args).await?.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let cli = NowCli::new("echo");
        let outcome = cli
            .run(&["deployed".to_string(), "https://example.com".to_string()])
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert!(outcome.output.contains("https://example.com"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_data_not_an_error() {
        let cli = NowCli::new("false");
        let outcome = cli.run(&[]).await.unwrap();
        assert!(!outcome.succeeded());
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn unspawnable_binary_is_an_error() {
        let cli = NowCli::new("/definitely/not/a/real/binary");
        assert!(cli.run(&[]).await.is_err());
    }
}
