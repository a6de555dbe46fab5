//! GitLab CI driver.
//!
//! API v4 under the repository's own host, so self-managed instances work
//! unchanged. The agent's JSON log carries job identifiers, so `job_ended`
//! events usually match directly and reconciliation is rare. No platform
//! execution ceiling.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use ember_core::driver::{CiDriver, DriverError};
use ember_model::{DriverKind, JobRecord, JobStatus, PolledJob, RemoteRunner};

pub struct GitlabDriver {
    client: Client,
    api_base: String,
    /// URL-encoded `group/project` path.
    project: String,
    token: String,
}

impl GitlabDriver {
    pub fn new(repo: &str, token: &str) -> Result<Self, DriverError> {
        let (host, project) = split_repo(repo)?;
        let client = Client::builder()
            .user_agent("ember-runner")
            .build()
            .map_err(|e| DriverError::Api(e.to_string()))?;
        Ok(Self {
            client,
            api_base: format!("{host}/api/v4"),
            project,
            token: token.to_owned(),
        })
    }

    async fn request(&self, method: Method, path: &str) -> Result<String, DriverError> {
        let response = self
            .client
            .request(method, format!("{}{path}", self.api_base))
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| DriverError::Api(e.to_string()))?;

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

    async fn get(&self, path: &str) -> Result<String, DriverError> {
        self.request(Method::GET, path).await
    }
}

#[async_trait]
impl CiDriver for GitlabDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Gitlab
    }

    async fn check_token(&self) -> Result<(), DriverError> {
        self.get(&format!("/projects/{}", self.project)).await.map(drop)
    }

    async fn runners(&self) -> Result<Vec<RemoteRunner>, DriverError> {
        let body = self
            .get(&format!("/projects/{}/runners", self.project))
            .await?;
        let summaries = decode_runner_summaries(&body)?;

        // The list endpoint omits tags; fetch each runner's detail.
        let mut runners = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let body = self.get(&format!("/runners/{}", summary.id)).await?;
            runners.push(decode_runner_detail(&body)?);
        }
        Ok(runners)
    }

    async fn runner_token(&self) -> Result<String, DriverError> {
        let body = self.get(&format!("/projects/{}", self.project)).await?;
        let project: WireProject =
            serde_json::from_str(&body).map_err(|e| DriverError::Decode(e.to_string()))?;
        project
            .runners_token
            .ok_or_else(|| DriverError::Auth("token cannot read the runners token".into()))
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), DriverError> {
        let runners = self.runners().await?;
        let Some(runner) = RemoteRunner::find_by_name(name, &runners) else {
            debug!(%name, "runner already absent on the provider side");
            return Ok(());
        };
        self.request(Method::DELETE, &format!("/runners/{}", runner.id))
            .await
            .map(drop)
    }

    async fn restart_job(&self, job_id: &str) -> Result<(), DriverError> {
        self.request(
            Method::POST,
            &format!("/projects/{}/jobs/{job_id}/retry", self.project),
        )
        .await
        .map(drop)
    }

    async fn poll_jobs(&self, jobs: &[JobRecord]) -> Result<Vec<PolledJob>, DriverError> {
        let mut polled = Vec::new();
        for record in jobs {
            let Some(id) = &record.id else { continue };
            let body = self
                .get(&format!("/projects/{}/jobs/{id}", self.project))
                .await?;
            polled.push(decode_job(&body)?);
        }
        Ok(polled)
    }
}

#[derive(Deserialize)]
struct WireRunnerSummary {
    id: u64,
}

#[derive(Deserialize)]
struct WireRunnerDetail {
    id: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    tag_list: Vec<String>,
}

#[derive(Deserialize)]
struct WireProject {
    runners_token: Option<String>,
}

#[derive(Deserialize)]
struct WireJob {
    id: u64,
    status: String,
}

fn decode_runner_summaries(body: &str) -> Result<Vec<WireRunnerSummary>, DriverError> {
    serde_json::from_str(body).map_err(|e| DriverError::Decode(e.to_string()))
}

fn decode_runner_detail(body: &str) -> Result<RemoteRunner, DriverError> {
    let detail: WireRunnerDetail =
        serde_json::from_str(body).map_err(|e| DriverError::Decode(e.to_string()))?;
    Ok(RemoteRunner {
        id: detail.id.to_string(),
        name: detail.description,
        labels: detail.tag_list,
        online: detail.online,
        busy: detail.status == "running",
    })
}

fn decode_job(body: &str) -> Result<PolledJob, DriverError> {
    let job: WireJob = serde_json::from_str(body).map_err(|e| DriverError::Decode(e.to_string()))?;
    let status = match job.status.as_str() {
        "success" | "failed" | "canceled" => JobStatus::Completed,
        "running" => JobStatus::Running,
        _ => JobStatus::Queued,
    };
    Ok(PolledJob {
        id: job.id.to_string(),
        status,
    })
}

/// Split a repository URL into its origin and URL-encoded project path.
fn split_repo(repo: &str) -> Result<(String, String), DriverError> {
    let trimmed = repo.trim_end_matches('/').trim_end_matches(".git");
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| DriverError::Repo(format!("not a gitlab repository url: {repo}")))?;
    let scheme = if trimmed.starts_with("https://") { "https" } else { "http" };

    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| DriverError::Repo(format!("repository url has no project path: {repo}")))?;
    if path.is_empty() || path.contains(char::is_whitespace) {
        return Err(DriverError::Repo(format!("repository url has no project path: {repo}")));
    }
    Ok((format!("{scheme}://{host}"), path.replace('/', "%2F")))
}
