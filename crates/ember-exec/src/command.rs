//! Agent command construction per provider.
//!
//! The agent binaries themselves are expected on the host (or baked into
//! the provisioned image); this module only assembles their invocations.

use tokio::process::Command;

use ember_core::supervise::{AgentSpec, SuperviseError};
use ember_model::DriverKind;

/// One-shot configuration step to run before the long-lived agent, if the
/// provider's agent needs one.
pub(crate) fn configure_command(spec: &AgentSpec) -> Option<Command> {
    match spec.driver {
        DriverKind::Github => {
            // The GitHub agent registers itself through its config script.
            let mut cmd = Command::new(spec.workdir.join(".runner").join("config.sh"));
            cmd.current_dir(&spec.workdir)
                .arg("--unattended")
                .args(["--url", &spec.repo])
                .args(["--token", &spec.registration_token])
                .args(["--name", &spec.name])
                .args(["--labels", &spec.labels.to_string()]);
            if spec.single {
                cmd.arg("--ephemeral");
            }
            Some(cmd)
        }
        DriverKind::Gitlab | DriverKind::Bitbucket => None,
    }
}

/// The long-lived agent process whose output carries lifecycle events.
pub(crate) fn run_command(spec: &AgentSpec) -> Result<Command, SuperviseError> {
    match spec.driver {
        DriverKind::Github => {
            let mut cmd = Command::new(spec.workdir.join(".runner").join("run.sh"));
            cmd.current_dir(&spec.workdir);
            Ok(cmd)
        }
        DriverKind::Gitlab => {
            let mut cmd = Command::new("gitlab-runner");
            cmd.current_dir(&spec.workdir)
                .args(["--log-format", "json"])
                .arg("run-single")
                .args(["--url", &spec.repo])
                .args(["--token", &spec.registration_token])
                .args(["--executor", "shell"])
                .args(["--name", &spec.name]);
            if spec.idle_timeout > 0 {
                cmd.args(["--wait-timeout", &spec.idle_timeout.to_string()]);
            }
            if spec.single {
                cmd.args(["--max-builds", "1"]);
            }
            Ok(cmd)
        }
        DriverKind::Bitbucket => Err(SuperviseError::Setup(
            "bitbucket does not support launching a self-hosted agent".into(),
        )),
    }
}
