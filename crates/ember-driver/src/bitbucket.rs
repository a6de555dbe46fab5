//! Bitbucket Cloud driver.
//!
//! Bitbucket's API exposes no self-hosted runner management, so only the
//! token check is functional; every runner operation reports itself as
//! unsupported and the controller fails fast before provisioning anything.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use ember_core::driver::{CiDriver, DriverError};
use ember_model::{DriverKind, JobRecord, PolledJob, RemoteRunner};

pub struct BitbucketDriver {
    client: Client,
    slug: String,
    username: String,
    password: String,
}

impl BitbucketDriver {
    /// `token` is `user:app_password`, as issued in the repository settings.
    pub fn new(repo: &str, token: &str) -> Result<Self, DriverError> {
        let slug = repo_slug(repo)?;
        let (username, password) = token.split_once(':').ok_or_else(|| {
            DriverError::Auth("bitbucket token must be user:app_password".into())
        })?;
        let client = Client::builder()
            .user_agent("ember-runner")
            .build()
            .map_err(|e| DriverError::Api(e.to_string()))?;
        Ok(Self {
            client,
            slug,
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    fn unsupported(&self, op: &'static str) -> DriverError {
        DriverError::Unsupported {
            driver: DriverKind::Bitbucket,
            op,
        }
    }
}

#[async_trait]
impl CiDriver for BitbucketDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Bitbucket
    }

    async fn check_token(&self) -> Result<(), DriverError> {
        let response = self
            .client
            .get(format!(
                "https://api.bitbucket.org/2.0/repositories/{}",
                self.slug
            ))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| DriverError::Api(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DriverError::Auth(response.status().to_string()))
            }
            status => Err(DriverError::Api(status.to_string())),
        }
    }

    async fn runners(&self) -> Result<Vec<RemoteRunner>, DriverError> {
        Err(self.unsupported("runners"))
    }

    async fn runner_token(&self) -> Result<String, DriverError> {
        Err(self.unsupported("runner_token"))
    }

    async fn unregister_runner(&self, _name: &str) -> Result<(), DriverError> {
        Err(self.unsupported("unregister_runner"))
    }

    async fn restart_job(&self, _job_id: &str) -> Result<(), DriverError> {
        Err(self.unsupported("restart_job"))
    }

    async fn poll_jobs(&self, _jobs: &[JobRecord]) -> Result<Vec<PolledJob>, DriverError> {
        Err(self.unsupported("poll_jobs"))
    }
}

fn repo_slug(repo: &str) -> Result<String, DriverError> {
    let trimmed = repo.trim_end_matches('/').trim_end_matches(".git");
    let path = match trimmed.split_once("bitbucket.org/") {
        Some((_, path)) => path,
        None if !trimmed.contains("://") && trimmed.matches('/').count() == 1 => trimmed,
        None => {
            return Err(DriverError::Repo(format!(
                "not a bitbucket repository: {repo}"
            )));
        }
    };
    if path.is_empty() || path.contains(char::is_whitespace) || path.matches('/').count() != 1 {
        return Err(DriverError::Repo(format!(
            "not a bitbucket repository: {repo}"
        )));
    }
    Ok(path.to_owned())
}

#[cfg(test)]
mod tests {
    use ember_core::driver::{CiDriver, DriverError};
    use ember_model::DriverKind;

    use super::{BitbucketDriver, repo_slug};

    #[test]
    fn slug_from_url() {
        assert_eq!(
            repo_slug("https://bitbucket.org/workspace/repo").unwrap(),
            "workspace/repo"
        );
        assert!(repo_slug("https://github.com/org/repo").is_err());
    }

    #[test]
    fn token_must_carry_username_and_password() {
        assert!(BitbucketDriver::new("https://bitbucket.org/w/r", "user:pass").is_ok());
        assert!(BitbucketDriver::new("https://bitbucket.org/w/r", "bare-token").is_err());
    }

    #[tokio::test]
    async fn runner_operations_are_unsupported() {
        let driver = BitbucketDriver::new("https://bitbucket.org/w/r", "user:pass").unwrap();

        for result in [
            driver.runners().await.map(drop),
            driver.runner_token().await.map(drop),
            driver.unregister_runner("x").await,
            driver.restart_job("1").await,
            driver.poll_jobs(&[]).await.map(drop),
        ] {
            assert!(matches!(
                result,
                Err(DriverError::Unsupported {
                    driver: DriverKind::Bitbucket,
                    ..
                })
            ));
        }
    }
}
