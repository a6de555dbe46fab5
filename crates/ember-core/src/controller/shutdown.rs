//! Shutdown protocol.
//!
//! Single entry point, idempotent via [`ShutdownGuard`]. Steps, in order:
//! 1. log the reason (error-level when a failure triggered it)
//! 2. wait the configured destroy delay
//! 3. cloud mode: destroy what this process applied, and stop
//! 4. local mode: unregister the runner, restart in-flight jobs (fanned
//!    out, joined), tear down any legacy docker-machine
//! 5. destroy an adopted provisioned-resource handle, if present
//! 6. hand the reason-dictated exit code back to the caller
//!
//! Every cleanup action is best-effort: a failing step is logged and never
//! blocks the remaining steps or changes the exit code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::{task::JoinSet, time};
use tracing::{debug, error, info, warn};

use ember_model::{Phase, ShutdownReason};

use super::core::Controller;

/// Checked-and-set atomically before any shutdown side effect runs; at most
/// one shutdown sequence executes per process lifetime.
#[derive(Clone)]
pub(crate) struct ShutdownGuard(Arc<AtomicBool>);

impl ShutdownGuard {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Returns `true` for exactly one caller.
    pub(crate) fn begin(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_engaged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Controller {
    /// Run the shutdown protocol and return the exit code for `reason`.
    ///
    /// Safe to invoke any number of times; only the first invocation
    /// performs side effects.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> i32 {
        let code = reason.exit_code();
        if !self.state.guard.begin() {
            return code;
        }

        if reason.is_error() {
            error!(reason = %reason, status = "terminated", "runner shutting down");
        } else {
            info!(reason = %reason, status = "terminated", "runner shutting down");
        }
        self.state.phase = Phase::ShuttingDown;

        info!(delay = self.cfg.destroy_delay, "waiting before cleanup");
        time::sleep(Duration::from_secs(self.cfg.destroy_delay)).await;

        if self.cfg.is_cloud() {
            if self.state.provisioned {
                self.destroy_infra().await;
            }
        } else {
            self.unregister_runner().await;
            self.restart_inflight_jobs().await;
            self.destroy_docker_machine().await;
            if self.cfg.tf_resource.is_some() {
                self.destroy_infra().await;
            }
        }

        if let Some(agent) = self.state.agent.take() {
            agent.release();
        }
        self.state.phase = Phase::Terminated;
        code
    }

    /// Interrupt the agent so it deregisters its listener, then remove the
    /// identity on the provider side.
    async fn unregister_runner(&self) {
        let Some(agent) = &self.state.agent else {
            return;
        };

        info!(name = %self.cfg.name, "unregistering runner");
        agent.interrupt();
        match self.driver.unregister_runner(&self.cfg.name).await {
            Ok(()) => info!("runner unregistered"),
            Err(err) => error!(%err, "failed to unregister runner"),
        }
    }

    /// Restart every in-flight job through the CI driver. Independent
    /// remote calls: fanned out concurrently and joined before proceeding.
    async fn restart_inflight_jobs(&self) {
        if self.cfg.no_retry || self.state.jobs.is_empty() {
            return;
        }

        let mut set = JoinSet::new();
        for record in self.state.jobs.records() {
            let Some(id) = record.id.clone() else {
                warn!("in-flight job carries no identifier; cannot request restart");
                continue;
            };
            let driver = Arc::clone(&self.driver);
            set.spawn(async move {
                let result = driver.restart_job(&id).await;
                (id, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(()))) => info!(job = %id, "requested job restart"),
                Ok((id, Err(err))) => error!(job = %id, %err, "failed to restart job"),
                Err(err) => error!(%err, "job-restart task failed"),
            }
        }
    }

    /// Legacy local virtualization teardown; absence of the tool is a
    /// degraded capability, not an error.
    async fn destroy_docker_machine(&self) {
        let Some(machine) = &self.cfg.docker_machine else {
            return;
        };

        warn!("docker-machine is deprecated and will be removed; deploy through the provisioner instead");
        info!(%machine, "destroying docker-machine");
        let output = tokio::process::Command::new("docker-machine")
            .args(["rm", "--force", machine])
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => info!("docker-machine destroyed"),
            Ok(out) => error!(code = ?out.status.code(), "failed to destroy docker-machine"),
            Err(err) => warn!(%err, "docker-machine unavailable"),
        }
    }

    async fn destroy_infra(&self) {
        match self.infra.destroy(&self.cfg.workdir, None).await {
            Ok(()) => debug!("provisioned infrastructure destroyed"),
            Err(err) => error!(%err, "failed to destroy provisioned infrastructure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::JoinSet;

    use super::ShutdownGuard;

    #[test]
    fn guard_admits_exactly_one_caller() {
        let guard = ShutdownGuard::new();
        assert!(!guard.is_engaged());

        assert!(guard.begin());
        assert!(guard.is_engaged());
        assert!(!guard.begin());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn guard_admits_exactly_one_caller_under_contention() {
        let guard = ShutdownGuard::new();

        let mut set = JoinSet::new();
        for _ in 0..64 {
            let guard = guard.clone();
            set.spawn(async move { guard.begin() });
        }

        let mut admitted = 0;
        while let Some(won) = set.join_next().await {
            if won.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
