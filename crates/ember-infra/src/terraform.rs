use std::path::Path;

use async_trait::async_trait;
use tokio::{fs, process::Command};
use tracing::{debug, trace};

use ember_core::infra::{InfraError, Provision, TemplateParams};
use ember_model::InfraState;

use crate::template;

/// Oldest terraform release the runner provider works with.
const MIN_VERSION: (u64, u64, u64) = (0, 14, 0);

/// Provisioner backed by the terraform CLI.
pub struct TerraformCli {
    binary: String,
}

impl TerraformCli {
    pub fn new() -> Self {
        Self {
            binary: "terraform".to_owned(),
        }
    }

    /// Use a non-default binary (tests, vendored installs).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Installed terraform version, from `terraform version -json`.
    pub async fn version(&self) -> Result<String, InfraError> {
        let stdout = self.run(&["version", "-json"]).await?;
        let parsed: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| InfraError::Invocation(format!("unparseable version output: {e}")))?;
        parsed
            .get("terraform_version")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| InfraError::Invocation("version output missing terraform_version".into()))
    }

    async fn run(&self, args: &[&str]) -> Result<String, InfraError> {
        trace!(binary = %self.binary, ?args, "running provisioner");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| InfraError::Invocation(format!("{} failed to start: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InfraError::Invocation(format!(
                "{} {} exited with code {:?}: {}",
                self.binary,
                args.first().unwrap_or(&""),
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String, InfraError> {
        let chdir = format!("-chdir={}", dir.display());
        let mut full: Vec<&str> = vec![&chdir];
        full.extend_from_slice(args);
        self.run(&full).await
    }
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provision for TerraformCli {
    async fn check_min_version(&self) -> Result<(), InfraError> {
        let found = self.version().await?;
        if parse_version(&found) < MIN_VERSION {
            return Err(InfraError::VersionBelowMinimum {
                found,
                required: format!(
                    "{}.{}.{}",
                    MIN_VERSION.0, MIN_VERSION.1, MIN_VERSION.2
                ),
            });
        }
        Ok(())
    }

    fn provider_template(&self) -> String {
        template::provider()
    }

    fn runner_template(&self, params: &TemplateParams) -> String {
        template::runner(params)
    }

    async fn init(&self, dir: &Path) -> Result<(), InfraError> {
        let out = self.run_in(dir, &["init"]).await?;
        debug!("{}", out.trim_end());
        Ok(())
    }

    async fn apply(&self, dir: &Path) -> Result<(), InfraError> {
        let out = self.run_in(dir, &["apply", "-auto-approve"]).await?;
        debug!("{}", out.trim_end());
        Ok(())
    }

    async fn destroy(&self, dir: &Path, target: Option<&str>) -> Result<(), InfraError> {
        let out = match target {
            Some(target) => {
                let target_arg = format!("-target={target}");
                self.run_in(dir, &["destroy", "-auto-approve", &target_arg])
                    .await?
            }
            None => self.run_in(dir, &["destroy", "-auto-approve"]).await?,
        };
        debug!("{}", out.trim_end());
        Ok(())
    }

    async fn load_state(&self, path: &Path) -> Result<InfraState, InfraError> {
        let raw = fs::read_to_string(path).await?;
        serde_json::from_str(&raw).map_err(|e| InfraError::State(e.to_string()))
    }

    async fn save_state(&self, state: &InfraState, path: &Path) -> Result<(), InfraError> {
        let rendered =
            serde_json::to_string_pretty(state).map_err(|e| InfraError::State(e.to_string()))?;
        fs::write(path, rendered).await?;
        Ok(())
    }
}

/// Lenient `major.minor.patch` parse; missing or junk segments become 0 so
/// comparisons still order sensibly.
fn parse_version(version: &str) -> (u64, u64, u64) {
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let mut parts = core.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}
