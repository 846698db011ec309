//! Barrier that waits for every parallel job in the build matrix.
//!
//! Only one job per build may deploy. The first job in the matrix is the
//! leader; it polls the Travis build API until the rest of the matrix has
//! finished and releases only when every other job passed. Non-leader jobs
//! resolve to [`BarrierOutcome::Skip`] immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// All other jobs finished successfully, deployment may proceed.
    Release,

    /// This job must not deploy: it is not the leader, or another job
    /// failed.
    Skip,
}

#[async_trait]
pub trait JobBarrier {
    async fn await_all_jobs(&self) -> anyhow::Result<BarrierOutcome>;
}

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: u32 = 240;

#[derive(Debug, Deserialize)]
struct Build {
    matrix: Vec<MatrixJob>,
}

#[derive(Debug, Deserialize)]
struct MatrixJob {
    number: String,
    finished_at: Option<String>,
    result: Option<i64>,
}

/// Decision over one snapshot of the build matrix: `None` while any other
/// job is still running. Without a job number there is no matrix to wait
/// on, so the barrier releases.
fn matrix_outcome(jobs: &[MatrixJob], own_number: Option<&str>) -> Option<BarrierOutcome> {
    let Some(own_number) = own_number else {
        return Some(BarrierOutcome::Release);
    };

    let others: Vec<&MatrixJob> = jobs
        .iter()
        .filter(|job| job.number != own_number)
        .collect();

    if others.iter().any(|job| job.finished_at.is_none()) {
        return None;
    }
    if others.iter().all(|job| job.result == Some(0)) {
        Some(BarrierOutcome::Release)
    } else {
        Some(BarrierOutcome::Skip)
    }
}

/// Polls the Travis build API.
pub struct TravisBarrier {
    client: reqwest::Client,
    api_url: String,
    build_id: String,
    job_number: Option<String>,
}

impl TravisBarrier {
    pub fn new(build_id: String, job_number: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: "https://api.travis-ci.org".to_string(),
            build_id,
            job_number,
        }
    }

    /// The leader is the first job in the matrix. A build without a job
    /// number has no matrix and leads trivially.
    fn is_leader(&self) -> bool {
        match &self.job_number {
            Some(number) => number.ends_with(".1"),
            None => true,
        }
    }

    async fn fetch_matrix(&self) -> anyhow::Result<Vec<MatrixJob>> {
        let url = format!("{}/builds/{}", self.api_url, self.build_id);
        let build: Build = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.travis-ci.2.1+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(build.matrix)
    }
}

#[async_trait]
impl JobBarrier for TravisBarrier {
    async fn await_all_jobs(&self) -> anyhow::Result<BarrierOutcome> {
        let Some(own_number) = self.job_number.as_deref() else {
            debug!("no job matrix, releasing immediately");
            return Ok(BarrierOutcome::Release);
        };
        if !self.is_leader() {
            debug!(job = own_number, "not the leader job");
            return Ok(BarrierOutcome::Skip);
        }

        for _ in 0..MAX_POLLS {
            let jobs = self.fetch_matrix().await?;
            if let Some(outcome) = matrix_outcome(&jobs, Some(own_number)) {
                return Ok(outcome);
            }
            debug!("matrix still running, polling again");
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        anyhow::bail!("timed out waiting for parallel jobs to finish")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(number: &str, finished: bool, result: Option<i64>) -> MatrixJob {
        MatrixJob {
            number: number.to_string(),
            finished_at: finished.then(|| "2017-10-06T09:00:00Z".to_string()),
            result,
        }
    }

    #[test]
    fn first_job_in_matrix_leads() {
        assert!(TravisBarrier::new("1".into(), Some("42.1".into())).is_leader());
        assert!(!TravisBarrier::new("1".into(), Some("42.2".into())).is_leader());
        assert!(TravisBarrier::new("1".into(), None).is_leader());
    }

    #[test]
    fn waits_while_other_jobs_run() {
        let jobs = [job("42.1", false, None), job("42.2", false, None)];
        assert_eq!(matrix_outcome(&jobs, Some("42.1")), None);
    }

    #[test]
    fn releases_when_all_other_jobs_passed() {
        let jobs = [
            job("42.1", false, None),
            job("42.2", true, Some(0)),
            job("42.3", true, Some(0)),
        ];
        assert_eq!(
            matrix_outcome(&jobs, Some("42.1")),
            Some(BarrierOutcome::Release)
        );
    }

    #[test]
    fn skips_when_any_other_job_failed() {
        let jobs = [job("42.1", false, None), job("42.2", true, Some(1))];
        assert_eq!(
            matrix_outcome(&jobs, Some("42.1")),
            Some(BarrierOutcome::Skip)
        );
    }

    #[test]
    fn missing_job_number_releases_without_waiting() {
        let jobs = [job("42.1", false, None)];
        assert_eq!(matrix_outcome(&jobs, None), Some(BarrierOutcome::Release));
    }

    #[tokio::test]
    async fn build_without_job_number_never_polls() {
        let barrier = TravisBarrier::new("271828".into(), None);
        assert_eq!(
            barrier.await_all_jobs().await.unwrap(),
            BarrierOutcome::Release
        );
    }

    #[test]
    fn single_job_build_releases_immediately() {
        let jobs = [job("42.1", false, None)];
        assert_eq!(
            matrix_outcome(&jobs, Some("42.1")),
            Some(BarrierOutcome::Release)
        );
    }
}
