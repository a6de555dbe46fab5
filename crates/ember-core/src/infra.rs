//! Infrastructure-provisioning abstraction consumed by the controller.
//!
//! `ember-infra` implements this over the terraform CLI. The controller
//! renders a template through it, applies, and destroys on shutdown; it
//! never interprets the infrastructure language itself.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use ember_model::{CloudSpec, DriverKind, InfraState, Labels};

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("provisioner version {found} is below the required minimum {required}")]
    VersionBelowMinimum { found: String, required: String },

    #[error("provisioner invocation failed: {0}")]
    Invocation(String),

    #[error("state file error: {0}")]
    State(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the runner template needs, resolved from config plus the
/// repository token. Carries the token; never logged wholesale.
#[derive(Debug, Clone)]
pub struct TemplateParams {
    pub driver: DriverKind,
    pub repo: String,
    pub token: String,
    pub labels: Labels,
    pub idle_timeout: i64,
    pub name: String,
    pub single: bool,
    pub cloud: CloudSpec,
}

/// Infrastructure tool invocation boundary.
#[async_trait]
pub trait Provision: Send + Sync {
    /// Fail when the underlying tool is older than the supported minimum.
    async fn check_min_version(&self) -> Result<(), InfraError>;

    /// Bare provider block, used when adopting an existing resource.
    fn provider_template(&self) -> String;

    /// Full runner-resource plan parameterized by the resolved config.
    fn runner_template(&self, params: &TemplateParams) -> String;

    async fn init(&self, dir: &Path) -> Result<(), InfraError>;

    async fn apply(&self, dir: &Path) -> Result<(), InfraError>;

    async fn destroy(&self, dir: &Path, target: Option<&str>) -> Result<(), InfraError>;

    async fn load_state(&self, path: &Path) -> Result<InfraState, InfraError>;

    async fn save_state(&self, state: &InfraState, path: &Path) -> Result<(), InfraError>;
}
