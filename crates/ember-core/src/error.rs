use thiserror::Error;

use crate::{driver::DriverError, infra::InfraError, supervise::SuperviseError};

/// Fatal controller errors.
///
/// Everything here is fatal-at-startup: surfaced before any resource is
/// created. Failures after the first side effect go through the shutdown
/// protocol instead and never become a `CoreError`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(
        "runner name {0} is already in use; change the name or terminate the other runner"
    )]
    NameConflict(String),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("provisioner error: {0}")]
    Infra(#[from] InfraError),

    #[error("supervisor error: {0}")]
    Supervise(#[from] SuperviseError),

    #[error("invalid provisioned-resource handle: {0}")]
    BadResourceHandle(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
