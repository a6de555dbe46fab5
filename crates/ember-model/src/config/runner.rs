use std::fmt;
use std::path::PathBuf;

use crate::{CloudSpec, DriverKind, Labels};

/// Immutable controller input, resolved once at startup from CLI and
/// environment and never mutated afterwards.
#[derive(Clone)]
pub struct RunnerConfig {
    /// Name displayed in the repository once registered.
    pub name: String,
    pub labels: Labels,
    /// Exit after running a single job.
    pub single: bool,
    /// Do not launch when an existing runner already matches name or labels.
    pub reuse: bool,
    /// Do not restart jobs interrupted by disposal or platform timeout.
    pub no_retry: bool,
    /// Seconds without in-flight jobs before self-termination; `<= 0`
    /// disables the timer entirely.
    pub idle_timeout: i64,
    /// Grace period in seconds before shutdown side effects run.
    pub destroy_delay: u64,
    /// Runner working directory.
    pub workdir: PathBuf,
    pub driver: DriverKind,
    /// Repository the runner registers against.
    pub repo: String,
    /// Personal access token; redacted from `Debug` output.
    pub token: String,
    /// Present only in cloud mode.
    pub cloud: Option<CloudSpec>,
    /// Base64-encoded provisioned-resource handle to adopt and destroy on
    /// shutdown. Set on the instance-side controller by the launcher.
    pub tf_resource: Option<String>,
    /// Legacy docker-machine environment to tear down on shutdown.
    pub docker_machine: Option<String>,
}

impl RunnerConfig {
    /// Returns `true` when this process provisions cloud compute instead of
    /// supervising a local agent.
    pub fn is_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    /// Returns `true` when the idle timer is armed.
    pub fn idle_timer_enabled(&self) -> bool {
        self.idle_timeout > 0
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("name", &self.name)
            .field("labels", &self.labels.to_string())
            .field("single", &self.single)
            .field("reuse", &self.reuse)
            .field("no_retry", &self.no_retry)
            .field("idle_timeout", &self.idle_timeout)
            .field("destroy_delay", &self.destroy_delay)
            .field("workdir", &self.workdir)
            .field("driver", &self.driver)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("cloud", &self.cloud)
            .field("tf_resource", &self.tf_resource.as_deref().map(|_| "<set>"))
            .field("docker_machine", &self.docker_machine)
            .finish()
    }
}
