//! Environment validation and immutable process configuration.
//!
//! Everything the deployment needs from the Travis environment is read once
//! at startup into a [`Config`]. Validation is deliberately narrow: only the
//! CI markers and the two secrets are fatal when absent, everything else
//! degrades to an `Option`.

use std::path::Path;

use thiserror::Error;

/// Fatal startup problems. These abort before any side effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not detect Travis CI environment")]
    NotTravis,

    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Immutable snapshot of the Travis environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Auth token for the `now` CLI.
    pub now_token: String,

    /// GitHub personal access token.
    pub github_token: String,

    /// Discord webhook URL, if notifications are configured.
    pub discord_hook: Option<String>,

    /// Repository slug in `owner/name` form.
    pub repo_slug: String,

    /// Pull request number, set on pull-request builds.
    pub pull_request: Option<u64>,

    /// Head SHA of the pull request, set on pull-request builds.
    pub pull_request_sha: Option<String>,

    /// Commit SHA of the push that triggered the build.
    pub commit_sha: Option<String>,

    /// Travis event type (`pull_request`, `push`, ...).
    pub event_type: String,

    /// Travis build id, used for the log link and barrier polling.
    pub build_id: String,

    /// Job number within the build matrix (`"42.1"` form).
    pub job_number: Option<String>,

    /// Alias host to bind production deployments to.
    pub alias_host: Option<String>,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary lookup, so tests never have to
    /// mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("CI").is_none() || lookup("TRAVIS").is_none() {
            return Err(ConfigError::NotTravis);
        }

        let required = |key: &'static str| lookup(key).ok_or(ConfigError::MissingVar(key));

        let github_token = required("GH_TOKEN")?;
        let now_token = required("NOW_TOKEN")?;
        let repo_slug = required("TRAVIS_REPO_SLUG")?;

        Ok(Self {
            now_token,
            github_token,
            discord_hook: lookup("DISCORD_HOOK"),
            repo_slug,
            pull_request: lookup("TRAVIS_PULL_REQUEST").and_then(|v| v.parse().ok()),
            pull_request_sha: lookup("TRAVIS_PULL_REQUEST_SHA"),
            commit_sha: lookup("TRAVIS_COMMIT"),
            event_type: lookup("TRAVIS_EVENT_TYPE").unwrap_or_default(),
            build_id: lookup("TRAVIS_BUILD_ID").unwrap_or_default(),
            job_number: lookup("TRAVIS_JOB_NUMBER"),
            alias_host: lookup("NOW_ALIAS"),
        })
    }

    /// Repository slug with `/` flattened, used as the deployment name and
    /// the webhook bot name.
    pub fn deployment_name(&self) -> String {
        self.repo_slug.replace('/', "-")
    }

    /// Link to this build's Travis log.
    pub fn log_url(&self) -> String {
        format!(
            "https://travis-ci.org/{}/builds/{}",
            self.repo_slug, self.build_id
        )
    }
}

/// The two argument lists handed to the `now` CLI, assembled once at startup.
///
/// `base` carries auth and identity and is reused for alias binding;
/// `behavior` carries per-deployment flags.
#[derive(Debug, Clone)]
pub struct ArgBundle {
    pub base: Vec<String>,
    pub behavior: Vec<String>,
}

impl ArgBundle {
    pub fn assemble(
        cfg: &Config,
        debug: bool,
        team: Option<&str>,
        public: bool,
        folder: Option<&Path>,
    ) -> Self {
        let mut base = vec![
            "--token".to_string(),
            cfg.now_token.clone(),
            "--name".to_string(),
            cfg.deployment_name(),
        ];

        if debug {
            base.push("--debug".to_string());
        }

        if let Some(team) = team {
            base.push("--team".to_string());
            base.push(team.to_string());
        }

        let mut behavior = vec!["--no-clipboard".to_string()];

        if public {
            behavior.push("--public".to_string());
        }

        // A folder that does not resolve to an existing directory is
        // silently skipped.
        if let Some(folder) = folder {
            if let Ok(resolved) = folder.canonicalize() {
                if resolved.is_dir() {
                    behavior.push("--name".to_string());
                    behavior.push(cfg.deployment_name());
                    behavior.push(resolved.to_string_lossy().into_owned());
                }
            }
        }

        Self { base, behavior }
    }

    /// Full argument list for a deployment invocation.
    pub fn deploy_args(&self) -> Vec<String> {
        let mut args = self.base.clone();
        args.extend(self.behavior.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn travis_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CI", "true"),
            ("TRAVIS", "true"),
            ("GH_TOKEN", "gh-secret"),
            ("NOW_TOKEN", "now-secret"),
            ("TRAVIS_REPO_SLUG", "acme/widgets"),
            ("TRAVIS_EVENT_TYPE", "push"),
            ("TRAVIS_BUILD_ID", "271828"),
        ])
    }

    fn config_from(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn detects_missing_ci_environment() {
        let mut env = travis_env();
        env.remove("TRAVIS");
        assert_eq!(config_from(&env).unwrap_err(), ConfigError::NotTravis);
    }

    #[test]
    fn missing_deploy_token_is_fatal() {
        let mut env = travis_env();
        env.remove("NOW_TOKEN");
        assert_eq!(
            config_from(&env).unwrap_err(),
            ConfigError::MissingVar("NOW_TOKEN")
        );
    }

    #[test]
    fn missing_github_token_is_fatal() {
        let mut env = travis_env();
        env.remove("GH_TOKEN");
        assert_eq!(
            config_from(&env).unwrap_err(),
            ConfigError::MissingVar("GH_TOKEN")
        );
    }

    #[test]
    fn optional_values_degrade_to_none() {
        let cfg = config_from(&travis_env()).unwrap();
        assert_eq!(cfg.discord_hook, None);
        assert_eq!(cfg.pull_request, None);
        assert_eq!(cfg.alias_host, None);
        assert_eq!(cfg.deployment_name(), "acme-widgets");
        assert_eq!(
            cfg.log_url(),
            "https://travis-ci.org/acme/widgets/builds/271828"
        );
    }

    #[test]
    fn base_args_carry_token_and_name() {
        let cfg = config_from(&travis_env()).unwrap();
        let bundle = ArgBundle::assemble(&cfg, false, None, false, None);
        assert_eq!(
            bundle.base,
            vec!["--token", "now-secret", "--name", "acme-widgets"]
        );
        assert_eq!(bundle.behavior, vec!["--no-clipboard"]);
    }

    #[test]
    fn debug_and_team_extend_base_args() {
        let cfg = config_from(&travis_env()).unwrap();
        let bundle = ArgBundle::assemble(&cfg, true, Some("acme"), true, None);
        assert!(bundle.base.contains(&"--debug".to_string()));
        let team_at = bundle.base.iter().position(|a| a == "--team").unwrap();
        assert_eq!(bundle.base[team_at + 1], "acme");
        assert!(bundle.behavior.contains(&"--public".to_string()));
    }

    #[test]
    fn existing_folder_adds_custom_name_and_path() {
        let cfg = config_from(&travis_env()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let bundle = ArgBundle::assemble(&cfg, false, None, false, Some(dir.path()));
        let name_at = bundle.behavior.iter().position(|a| a == "--name").unwrap();
        assert_eq!(bundle.behavior[name_at + 1], "acme-widgets");
        assert!(bundle.behavior.last().is_some_and(|p| {
            Path::new(p).is_dir()
        }));
    }

    #[test]
    fn nonexistent_folder_is_silently_skipped() {
        let cfg = config_from(&travis_env()).unwrap();
        let bundle = ArgBundle::assemble(
            &cfg,
            false,
            None,
            false,
            Some(Path::new("/definitely/not/a/real/dir")),
        );
        assert_eq!(bundle.behavior, vec!["--no-clipboard"]);
    }
}
