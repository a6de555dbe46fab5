//! CI provider abstraction consumed by the controller.
//!
//! One implementation per provider lives in `ember-driver`; the controller
//! treats every call as fatal during startup checks and as log-only during
//! shutdown.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use ember_model::{DriverKind, JobRecord, PolledJob, RemoteRunner};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid repository: {0}")]
    Repo(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("api request failed: {0}")]
    Api(String),

    #[error("unexpected api response: {0}")]
    Decode(String),

    #[error("operation not supported by {driver}: {op}")]
    Unsupported {
        driver: DriverKind,
        op: &'static str,
    },
}

/// Provider-specific behavior behind one interface.
///
/// Selected once at construction time from configuration.
#[async_trait]
pub trait CiDriver: Send + Sync {
    /// Which provider this driver talks to.
    fn kind(&self) -> DriverKind;

    /// Verify the configured token can reach the repository.
    async fn check_token(&self) -> Result<(), DriverError>;

    /// List runners registered on the repository.
    async fn runners(&self) -> Result<Vec<RemoteRunner>, DriverError>;

    /// Issue a short-lived registration token for a new runner agent.
    async fn runner_token(&self) -> Result<String, DriverError>;

    /// Remove the runner identity from the repository.
    async fn unregister_runner(&self, name: &str) -> Result<(), DriverError>;

    /// Ask the provider to restart a pipeline job.
    async fn restart_job(&self, job_id: &str) -> Result<(), DriverError>;

    /// Report the provider-side status of the given in-flight jobs.
    async fn poll_jobs(&self, jobs: &[JobRecord]) -> Result<Vec<PolledJob>, DriverError>;

    /// Hard execution ceiling the platform imposes on jobs, if any.
    fn job_ceiling(&self) -> Option<Duration> {
        None
    }
}
