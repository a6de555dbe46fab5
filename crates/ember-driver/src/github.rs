//! GitHub Actions driver.
//!
//! Talks to the REST v3 API under `/repos/{owner}/{repo}/actions/`. Job
//! start lines in the agent log carry no identifier, so completion is
//! recovered through [`CiDriver::poll_jobs`]. GitHub also imposes a hard
//! execution ceiling on workflow runs; the controller shuts the runner
//! down five minutes before it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use ember_core::driver::{CiDriver, DriverError};
use ember_model::{DriverKind, JobRecord, JobStatus, PolledJob, RemoteRunner};

/// Hard workflow ceiling (72 h), minus a 5 minute margin to shut down
/// before the platform kills the job.
const JOB_CEILING: Duration = Duration::from_secs((72 * 60 - 5) * 60);

pub struct GithubDriver {
    client: Client,
    api_base: String,
    slug: String,
    token: String,
}

impl GithubDriver {
    pub fn new(repo: &str, token: &str) -> Result<Self, DriverError> {
        let slug = repo_slug(repo)?;
        let client = Client::builder()
            .user_agent("ember-runner")
            .build()
            .map_err(|e| DriverError::Api(e.to_string()))?;
        Ok(Self {
            client,
            api_base: "https://api.github.com".to_owned(),
            slug,
            token: token.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}{path}", self.api_base, self.slug)
    }

    async fn get(&self, path: &str) -> Result<String, DriverError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| DriverError::Api(e.to_string()))?;
        read_body(response).await
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> Result<String, DriverError> {
        let response = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| DriverError::Api(e.to_string()))?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, DriverError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DriverError::Api(e.to_string()))?;
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DriverError::Auth(format!("{status}: {body}")));
    }
    if !status.is_success() {
        return Err(DriverError::Api(format!("{status}: {body}")));
    }
    Ok(body)
}

#[async_trait]
impl CiDriver for GithubDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Github
    }

    async fn check_token(&self) -> Result<(), DriverError> {
        self.get("").await.map(drop)
    }

    async fn runners(&self) -> Result<Vec<RemoteRunner>, DriverError> {
        let body = self.get("/actions/runners?per_page=100").await?;
        decode_runners(&body)
    }

    async fn runner_token(&self) -> Result<String, DriverError> {
        let body = self
            .request(
                reqwest::Method::POST,
                "/actions/runners/registration-token",
            )
            .await?;
        let token: RegistrationToken =
            serde_json::from_str(&body).map_err(|e| DriverError::Decode(e.to_string()))?;
        Ok(token.token)
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), DriverError> {
        let runners = self.runners().await?;
        let Some(runner) = RemoteRunner::find_by_name(name, &runners) else {
            debug!(%name, "runner already absent on the provider side");
            return Ok(());
        };
        self.request(
            reqwest::Method::DELETE,
            &format!("/actions/runners/{}", runner.id),
        )
        .await
        .map(drop)
    }

    async fn restart_job(&self, job_id: &str) -> Result<(), DriverError> {
        self.request(reqwest::Method::POST, &format!("/actions/jobs/{job_id}/rerun"))
            .await
            .map(drop)
    }

    async fn poll_jobs(&self, jobs: &[JobRecord]) -> Result<Vec<PolledJob>, DriverError> {
        let mut polled = Vec::new();
        for record in jobs {
            let Some(id) = &record.id else { continue };
            let body = self.get(&format!("/actions/jobs/{id}")).await?;
            polled.push(decode_job(&body)?);
        }
        Ok(polled)
    }

    fn job_ceiling(&self) -> Option<Duration> {
        Some(JOB_CEILING)
    }
}

#[derive(Deserialize)]
struct RegistrationToken {
    token: String,
}

#[derive(Deserialize)]
struct RunnerList {
    runners: Vec<WireRunner>,
}

#[derive(Deserialize)]
struct WireRunner {
    id: u64,
    name: String,
    status: String,
    busy: bool,
    #[serde(default)]
    labels: Vec<WireLabel>,
}

#[derive(Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Deserialize)]
struct WireJob {
    id: u64,
    status: String,
}

fn decode_runners(body: &str) -> Result<Vec<RemoteRunner>, DriverError> {
    let list: RunnerList =
        serde_json::from_str(body).map_err(|e| DriverError::Decode(e.to_string()))?;
    Ok(list
        .runners
        .into_iter()
        .map(|r| RemoteRunner {
            id: r.id.to_string(),
            name: r.name,
            labels: r.labels.into_iter().map(|l| l.name).collect(),
            online: r.status == "online",
            busy: r.busy,
        })
        .collect())
}

fn decode_job(body: &str) -> Result<PolledJob, DriverError> {
    let job: WireJob = serde_json::from_str(body).map_err(|e| DriverError::Decode(e.to_string()))?;
    let status = match job.status.as_str() {
        "completed" => JobStatus::Completed,
        "in_progress" => JobStatus::Running,
        _ => JobStatus::Queued,
    };
    Ok(PolledJob {
        id: job.id.to_string(),
        status,
    })
}

/// `owner/name` from a repository URL or a bare slug.
fn repo_slug(repo: &str) -> Result<String, DriverError> {
    let trimmed = repo.trim_end_matches('/').trim_end_matches(".git");
    let path = match trimmed.split_once("github.com/") {
        Some((_, path)) => path,
        None if !trimmed.contains("://") && trimmed.matches('/').count() == 1 => trimmed,
        None => return Err(DriverError::Repo(format!("not a github repository: {repo}"))),
    };
    if path.is_empty() || path.contains(char::is_whitespace) || path.matches('/').count() != 1 {
        return Err(DriverError::Repo(format!("not a github repository: {repo}")));
    }
    Ok(path.to_owned())
}
