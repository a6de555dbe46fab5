//! Controller state machine and run loop.
//!
//! ```text
//! Init → Preparing → CloudProvisioning ──────────────┐
//!                  └→ LocalLaunching → Running ──────┤
//!                                                    ▼
//!                                   ShuttingDown → Terminated
//! ```
//!
//! Single-threaded, event-driven: state transitions happen on one logical
//! task. Suspension points are collaborator calls and timer ticks; the only
//! fan-out is the independent job-restart calls during shutdown.
//!
//! ## Termination triggers
//! - OS signal (SIGINT/SIGTERM/SIGQUIT)
//! - agent process exit or output disconnect
//! - idle timeout (1 s cadence, armed while the job set is empty)
//! - platform job ceiling (60 s cadence, providers with a hard limit only)
//! - pre-emption notice from the cloud platform
//!
//! Whatever fires first wins; the shutdown guard turns the rest into no-ops.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tokio::{
    fs,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use ember_model::{
    AgentEvent, InfraResource, JobRecord, JobStatus, LifecycleEvent, LifecycleStatus, Phase,
    RemoteRunner, RunnerConfig, ShutdownReason,
};

use crate::{
    driver::CiDriver,
    error::CoreError,
    infra::{Provision, TemplateParams},
    preempt::PreemptNotify,
    supervise::{AgentSpec, Supervise, SuperviseError},
};

use super::{
    jobs::{JobSet, ReconcileState},
    shutdown::ShutdownGuard,
    signals,
};

/// Idle-timer cadence.
const IDLE_TICK: Duration = Duration::from_secs(1);
/// Platform-ceiling cadence.
const CEILING_TICK: Duration = Duration::from_secs(60);
/// Reconciliation cadence while a no-id completion is outstanding.
const RECONCILE_TICK: Duration = Duration::from_secs(5);
/// Give up reconciling after this many polls (5 minutes at the cadence).
const MAX_RECONCILE_POLLS: u32 = 60;

/// Injected collaborators.
pub struct Deps {
    pub driver: Arc<dyn CiDriver>,
    pub infra: Arc<dyn Provision>,
    pub supervisor: Arc<dyn Supervise>,
    pub preempt: Option<Arc<dyn PreemptNotify>>,
}

/// Mutable controller state. Owned by the run loop; never shared across
/// concurrent mutators.
pub(super) struct RunnerState {
    pub(super) phase: Phase,
    pub(super) idle_secs: u64,
    pub(super) jobs: JobSet,
    pub(super) reconcile: ReconcileState,
    pub(super) agent: Option<crate::supervise::AgentHandle>,
    /// Set once an apply has been attempted; gates cloud-mode destroy.
    pub(super) provisioned: bool,
    pub(super) guard: ShutdownGuard,
}

/// The runner lifecycle controller.
pub struct Controller {
    pub(super) cfg: RunnerConfig,
    pub(super) driver: Arc<dyn CiDriver>,
    pub(super) infra: Arc<dyn Provision>,
    pub(super) supervisor: Arc<dyn Supervise>,
    pub(super) preempt: Option<Arc<dyn PreemptNotify>>,
    pub(super) state: RunnerState,
}

enum StartupOutcome {
    Proceed,
    ReuseExisting,
}

impl Controller {
    pub fn new(cfg: RunnerConfig, deps: Deps) -> Self {
        Self {
            cfg,
            driver: deps.driver,
            infra: deps.infra,
            supervisor: deps.supervisor,
            preempt: deps.preempt,
            state: RunnerState {
                phase: Phase::Init,
                idle_secs: 0,
                jobs: JobSet::default(),
                reconcile: ReconcileState::default(),
                agent: None,
                provisioned: false,
                guard: ShutdownGuard::new(),
            },
        }
    }

    /// Drive the full lifecycle and return the process exit code.
    ///
    /// Errors are returned only for fatal-at-startup conditions, before any
    /// resource is created; later failures run the shutdown protocol and
    /// surface through the exit code instead.
    pub async fn run(mut self) -> Result<i32, CoreError> {
        let (trigger_tx, trigger_rx) = mpsc::channel::<ShutdownReason>(4);
        signals::subscribe(trigger_tx.clone())?;

        if let StartupOutcome::ReuseExisting = self.startup().await? {
            return Ok(0);
        }

        self.prepare_workdir().await;

        if let Err(err) = self.adopt_resource().await {
            return Ok(self
                .shutdown(ShutdownReason::Failure(err.to_string()))
                .await);
        }

        if self.cfg.is_cloud() {
            match self.provision().await {
                Ok(()) => {
                    // The launcher's responsibility ends at a successful
                    // apply; the instance's own controller takes over.
                    self.state.phase = Phase::Terminated;
                    Ok(0)
                }
                Err(err) => Ok(self
                    .shutdown(ShutdownReason::Failure(err.to_string()))
                    .await),
            }
        } else {
            match self.launch(&trigger_tx).await {
                Ok(events) => {
                    let reason = self.supervise_loop(events, trigger_rx).await;
                    Ok(self.shutdown(reason).await)
                }
                Err(err) => Ok(self
                    .shutdown(ShutdownReason::Failure(err.to_string()))
                    .await),
            }
        }
    }

    /// Startup checks. No side effects: everything failing here is
    /// fatal-at-startup and must leave nothing behind.
    async fn startup(&mut self) -> Result<StartupOutcome, CoreError> {
        self.state.phase = Phase::Preparing;

        if self.cfg.is_cloud() || self.cfg.tf_resource.is_some() {
            self.infra.check_min_version().await?;
        }

        self.driver.check_token().await?;

        let runners = self.driver.runners().await?;
        if let Some(existing) = RemoteRunner::find_by_name(&self.cfg.name, &runners) {
            if !self.cfg.reuse {
                return Err(CoreError::NameConflict(existing.name.clone()));
            }
            info!(name = %existing.name, "reusing existing runner");
            self.state.phase = Phase::Terminated;
            return Ok(StartupOutcome::ReuseExisting);
        }

        if self.cfg.reuse
            && RemoteRunner::find_by_labels(&self.cfg.labels, &runners)
                .iter()
                .any(|r| r.online)
        {
            info!(labels = %self.cfg.labels, "reusing existing online runner with matching labels");
            self.state.phase = Phase::Terminated;
            return Ok(StartupOutcome::ReuseExisting);
        }

        Ok(StartupOutcome::Proceed)
    }

    async fn prepare_workdir(&self) {
        info!(workdir = %self.cfg.workdir.display(), "preparing workdir");
        if let Err(err) = fs::create_dir_all(&self.cfg.workdir).await {
            warn!(%err, "failed to create workdir");
        }
    }

    /// Adopt a provisioned resource handed over by the launcher: apply the
    /// bare provider plan, then splice the decoded resource into the state
    /// so that shutdown destroys it.
    async fn adopt_resource(&mut self) -> Result<(), CoreError> {
        let Some(encoded) = self.cfg.tf_resource.clone() else {
            return Ok(());
        };

        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| CoreError::BadResourceHandle(e.to_string()))?;
        let resource: InfraResource = serde_json::from_slice(&raw)
            .map_err(|e| CoreError::BadResourceHandle(e.to_string()))?;

        let dir = &self.cfg.workdir;
        fs::write(dir.join("main.tf"), self.infra.provider_template()).await?;
        self.infra.init(dir).await?;
        self.infra.apply(dir).await?;

        let path = dir.join("terraform.tfstate");
        let mut state = self.infra.load_state(&path).await?;
        state.resources = vec![resource];
        self.infra.save_state(&state, &path).await?;

        debug!("adopted provisioned resource into local state");
        Ok(())
    }

    /// Cloud path: render, apply, echo the non-sensitive attributes, stop.
    async fn provision(&mut self) -> Result<(), CoreError> {
        let Some(mut cloud) = self.cfg.cloud.clone() else {
            return Ok(());
        };
        self.state.phase = Phase::CloudProvisioning;
        info!(cloud = %cloud.kind, "deploying cloud runner plan");

        if let Some(gpu) = cloud.gpu {
            let (gpu, deprecated) = gpu.normalize();
            if deprecated {
                warn!("gpu type \"tesla\" is deprecated; use \"v100\" instead");
            }
            cloud.gpu = Some(gpu);
        }

        let params = TemplateParams {
            driver: self.cfg.driver,
            repo: self.cfg.repo.clone(),
            token: self.cfg.token.clone(),
            labels: self.cfg.labels.clone(),
            idle_timeout: self.cfg.idle_timeout,
            name: self.cfg.name.clone(),
            single: self.cfg.single,
            cloud,
        };

        let dir = &self.cfg.workdir;
        fs::write(dir.join("main.tf"), self.infra.runner_template(&params)).await?;
        self.infra.init(dir).await?;

        // From here on, shutdown destroys whatever the apply managed to
        // create, even if it fails halfway.
        self.state.provisioned = true;
        self.infra.apply(dir).await?;

        let state = self.infra.load_state(&dir.join("terraform.tfstate")).await?;
        for resource in state.provisioned() {
            if let Ok(rendered) = serde_json::to_string(&resource.attributes) {
                info!(kind = %resource.kind, attributes = %rendered, "provisioned");
            }
        }
        Ok(())
    }

    /// Local path: register and spawn the agent, attach the pre-emption
    /// watcher, hand the event stream back to the run loop.
    async fn launch(
        &mut self,
        trigger: &mpsc::Sender<ShutdownReason>,
    ) -> Result<mpsc::Receiver<AgentEvent>, CoreError> {
        self.state.phase = Phase::LocalLaunching;
        info!(driver = %self.cfg.driver, "launching runner agent");

        let registration_token = self.driver.runner_token().await?;
        let spec = AgentSpec {
            workdir: self.cfg.workdir.clone(),
            name: self.cfg.name.clone(),
            labels: self.cfg.labels.clone(),
            single: self.cfg.single,
            idle_timeout: self.cfg.idle_timeout,
            driver: self.cfg.driver,
            repo: self.cfg.repo.clone(),
            registration_token,
        };

        let mut handle = self.supervisor.spawn(&spec).await?;
        let events = handle.take_events().ok_or(CoreError::Supervise(
            SuperviseError::Setup("agent event stream already consumed".into()),
        ))?;
        self.state.agent = Some(handle);

        self.attach_preemption(trigger).await;

        self.state.phase = Phase::Running;
        Ok(events)
    }

    /// Best-effort pre-emption subscription; unavailability only disables
    /// the trigger.
    async fn attach_preemption(&self, trigger: &mpsc::Sender<ShutdownReason>) {
        if self.cfg.no_retry {
            return;
        }
        let Some(watcher) = &self.preempt else {
            return;
        };

        let notice = CancellationToken::new();
        match watcher.watch(notice.clone()).await {
            Ok(()) => {
                let tx = trigger.clone();
                tokio::spawn(async move {
                    notice.cancelled().await;
                    let _ = tx.send(ShutdownReason::Preemption).await;
                });
            }
            Err(err) => warn!(%err, "pre-emption watcher unavailable"),
        }
    }

    /// The run loop: waits for the first termination trigger while keeping
    /// the job set and timers current.
    async fn supervise_loop(
        &mut self,
        mut events: mpsc::Receiver<AgentEvent>,
        mut trigger_rx: mpsc::Receiver<ShutdownReason>,
    ) -> ShutdownReason {
        let mut idle = time::interval(IDLE_TICK);
        let mut ceiling = time::interval(CEILING_TICK);
        let mut reconcile = time::interval(RECONCILE_TICK);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ceiling.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(reason) = trigger_rx.recv() => break reason,

                ev = events.recv() => match ev {
                    Some(AgentEvent::Lifecycle(event)) => self.on_lifecycle(event),
                    Some(AgentEvent::Line(line)) => trace!(target: "agent", "{line}"),
                    Some(AgentEvent::Exited { code }) => break ShutdownReason::ProcessExit { code },
                    None => break ShutdownReason::ProcessDisconnect,
                },

                _ = idle.tick(), if self.cfg.idle_timer_enabled() => {
                    if let Some(reason) = self.on_idle_tick() {
                        break reason;
                    }
                },

                _ = ceiling.tick(), if self.ceiling_armed() => {
                    if let Some(reason) = self.on_ceiling_tick() {
                        break reason;
                    }
                },

                _ = reconcile.tick(), if self.state.reconcile.pending => {
                    self.reconcile_jobs().await;
                },
            }
        }
    }

    fn on_lifecycle(&mut self, event: LifecycleEvent) {
        info!(
            status = %event.status,
            job = event.job.as_deref().unwrap_or("-"),
            "runner status"
        );
        match event.status {
            LifecycleStatus::JobStarted => {
                self.state.jobs.push(JobRecord::new(event.job));
                self.state.idle_secs = 0;
            }
            LifecycleStatus::JobEnded => match event.job {
                Some(id) => {
                    self.state.jobs.remove_by_id(&id);
                }
                // Without an id there is nothing to match; a single tracked
                // job is unambiguous, otherwise the CI driver resolves it.
                None if self.state.jobs.len() <= 1 => self.state.jobs.clear(),
                None => {
                    self.state.reconcile.pending = true;
                    self.state.reconcile.attempts = 0;
                }
            },
        }
    }

    /// The accumulator increments only while the job set is empty and must
    /// exceed the configured timeout to fire.
    fn on_idle_tick(&mut self) -> Option<ShutdownReason> {
        let timeout = self.cfg.idle_timeout as u64;
        if self.state.idle_secs > timeout {
            return Some(ShutdownReason::IdleTimeout { secs: timeout });
        }
        if self.state.jobs.is_empty() {
            self.state.idle_secs += 1;
        }
        None
    }

    fn ceiling_armed(&self) -> bool {
        !self.cfg.no_retry && self.driver.job_ceiling().is_some()
    }

    /// Per-job timestamps checked independently against the platform limit.
    fn on_ceiling_tick(&self) -> Option<ShutdownReason> {
        let ceiling = self.driver.job_ceiling()?;
        self.state
            .jobs
            .records()
            .iter()
            .any(|job| job.age() > ceiling)
            .then_some(ShutdownReason::PlatformMaxDuration)
    }

    /// Ask the CI driver which in-flight jobs completed and drop exactly
    /// those. One bounded poller, regardless of how many no-id completions
    /// queued up behind it.
    async fn reconcile_jobs(&mut self) {
        self.state.reconcile.attempts += 1;

        let polled = match self.driver.poll_jobs(self.state.jobs.records()).await {
            Ok(polled) => polled,
            Err(err) => {
                warn!(%err, "job reconciliation poll failed");
                self.maybe_abandon_reconcile();
                return;
            }
        };

        let completed: Vec<String> = polled
            .into_iter()
            .filter(|p| p.status == JobStatus::Completed)
            .map(|p| p.id)
            .collect();

        if completed.is_empty() {
            self.maybe_abandon_reconcile();
            return;
        }

        let removed = self.state.jobs.remove_many(&completed);
        debug!(removed, remaining = self.state.jobs.len(), "reconciled completed jobs");
        self.state.reconcile = ReconcileState::default();
    }

    fn maybe_abandon_reconcile(&mut self) {
        if self.state.reconcile.attempts >= MAX_RECONCILE_POLLS {
            warn!(
                polls = self.state.reconcile.attempts,
                "job completion never reported; abandoning reconciliation"
            );
            self.state.reconcile = ReconcileState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use ember_model::{
        CloudKind, CloudSpec, DriverKind, InfraState, Labels, PolledJob, RemoteRunner,
    };

    use crate::infra::InfraError;
    use crate::preempt::{PreemptError, PreemptNotify};
    use crate::supervise::AgentHandle;

    use super::*;

    #[derive(Default)]
    struct MockDriver {
        runners: Vec<RemoteRunner>,
        ceiling: Option<Duration>,
        unregister_calls: AtomicUsize,
        poll_calls: AtomicUsize,
        restart_calls: Mutex<Vec<String>>,
        poll_answer: Mutex<Vec<PolledJob>>,
    }

    #[async_trait]
    impl CiDriver for MockDriver {
        fn kind(&self) -> DriverKind {
            DriverKind::Github
        }

        async fn check_token(&self) -> Result<(), crate::driver::DriverError> {
            Ok(())
        }

        async fn runners(&self) -> Result<Vec<RemoteRunner>, crate::driver::DriverError> {
            Ok(self.runners.clone())
        }

        async fn runner_token(&self) -> Result<String, crate::driver::DriverError> {
            Ok("registration-token".to_owned())
        }

        async fn unregister_runner(&self, _name: &str) -> Result<(), crate::driver::DriverError> {
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn restart_job(&self, job_id: &str) -> Result<(), crate::driver::DriverError> {
            self.restart_calls.lock().unwrap().push(job_id.to_owned());
            Ok(())
        }

        async fn poll_jobs(
            &self,
            _jobs: &[JobRecord],
        ) -> Result<Vec<PolledJob>, crate::driver::DriverError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.poll_answer.lock().unwrap().clone())
        }

        fn job_ceiling(&self) -> Option<Duration> {
            self.ceiling
        }
    }

    #[derive(Default)]
    struct MockInfra {
        init_calls: AtomicUsize,
        apply_calls: AtomicUsize,
        destroy_calls: AtomicUsize,
        fail_apply: bool,
    }

    #[async_trait]
    impl Provision for MockInfra {
        async fn check_min_version(&self) -> Result<(), InfraError> {
            Ok(())
        }

        fn provider_template(&self) -> String {
            "provider \"iterative\" {}\n".to_owned()
        }

        fn runner_template(&self, _params: &TemplateParams) -> String {
            "resource \"iterative_runner\" \"runner\" {}\n".to_owned()
        }

        async fn init(&self, _dir: &Path) -> Result<(), InfraError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn apply(&self, _dir: &Path) -> Result<(), InfraError> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_apply {
                return Err(InfraError::Invocation("apply exploded".into()));
            }
            Ok(())
        }

        async fn destroy(&self, _dir: &Path, _target: Option<&str>) -> Result<(), InfraError> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn load_state(&self, _path: &Path) -> Result<InfraState, InfraError> {
            serde_json::from_str("{}").map_err(|e| InfraError::State(e.to_string()))
        }

        async fn save_state(&self, _state: &InfraState, _path: &Path) -> Result<(), InfraError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockSupervisor {
        spawn_calls: AtomicUsize,
        events: Mutex<Option<mpsc::Receiver<AgentEvent>>>,
    }

    #[async_trait]
    impl Supervise for MockSupervisor {
        async fn spawn(&self, _spec: &AgentSpec) -> Result<AgentHandle, SuperviseError> {
            self.spawn_calls.fetch_add(1, Ordering::SeqCst);
            let events = self
                .events
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| SuperviseError::Spawn("no scripted event stream".into()))?;
            // No real process behind the handle; pid stays unset so the
            // shutdown path cannot signal anything.
            Ok(AgentHandle::new(events, None, CancellationToken::new()))
        }
    }

    /// Cancels the notice after a fixed (test-clock) delay.
    struct MockPreempt {
        after: Duration,
    }

    #[async_trait]
    impl PreemptNotify for MockPreempt {
        async fn watch(&self, notice: CancellationToken) -> Result<(), PreemptError> {
            let after = self.after;
            tokio::spawn(async move {
                time::sleep(after).await;
                notice.cancel();
            });
            Ok(())
        }
    }

    struct Harness {
        driver: Arc<MockDriver>,
        infra: Arc<MockInfra>,
        supervisor: Arc<MockSupervisor>,
    }

    impl Harness {
        fn new(driver: MockDriver, infra: MockInfra) -> Self {
            Self {
                driver: Arc::new(driver),
                infra: Arc::new(infra),
                supervisor: Arc::new(MockSupervisor::default()),
            }
        }

        fn deps(&self) -> Deps {
            Deps {
                driver: self.driver.clone(),
                infra: self.infra.clone(),
                supervisor: self.supervisor.clone(),
                preempt: None,
            }
        }

    }

    fn config(test: &str) -> RunnerConfig {
        RunnerConfig {
            name: "ember-test".to_owned(),
            labels: Labels::default(),
            single: false,
            reuse: false,
            no_retry: false,
            idle_timeout: 300,
            destroy_delay: 0,
            workdir: std::env::temp_dir().join(format!("ember-core-{test}")),
            driver: DriverKind::Github,
            repo: "https://github.com/org/repo".to_owned(),
            token: "token".to_owned(),
            cloud: None,
            tf_resource: None,
            docker_machine: None,
        }
    }

    fn online_runner(name: &str, labels: &[&str]) -> RemoteRunner {
        RemoteRunner {
            id: "1".to_owned(),
            name: name.to_owned(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            online: true,
            busy: false,
        }
    }

    fn scripted_events(harness: &Harness) -> mpsc::Sender<AgentEvent> {
        let (tx, rx) = mpsc::channel(16);
        *harness.supervisor.events.lock().unwrap() = Some(rx);
        tx
    }

    #[tokio::test]
    async fn reuse_with_matching_labels_is_a_clean_noop() {
        let harness = Harness::new(
            MockDriver {
                runners: vec![online_runner("other", &["ember"])],
                ..Default::default()
            },
            MockInfra::default(),
        );
        let mut cfg = config("reuse-labels");
        cfg.reuse = true;

        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(harness.supervisor.spawn_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.infra.init_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reuse_with_same_name_is_a_clean_noop() {
        let harness = Harness::new(
            MockDriver {
                runners: vec![online_runner("ember-test", &[])],
                ..Default::default()
            },
            MockInfra::default(),
        );
        let mut cfg = config("reuse-name");
        cfg.reuse = true;

        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(harness.supervisor.spawn_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn name_conflict_without_reuse_fails_before_provisioning() {
        let harness = Harness::new(
            MockDriver {
                runners: vec![online_runner("ember-test", &[])],
                ..Default::default()
            },
            MockInfra::default(),
        );

        let err = Controller::new(config("name-conflict"), harness.deps())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NameConflict(ref name) if name == "ember-test"));
        assert_eq!(harness.infra.init_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.supervisor.spawn_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fires_and_unregisters_once() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);
        let mut cfg = config("idle-timeout");
        cfg.idle_timeout = 5;

        let started = time::Instant::now();
        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(harness.driver.unregister_calls.load(Ordering::SeqCst), 1);
        assert!(harness.driver.restart_calls.lock().unwrap().is_empty());
        drop(events);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_idle_timer_waits_for_an_explicit_trigger() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);
        let mut cfg = config("idle-disabled");
        cfg.idle_timeout = 0;

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(3600)).await;
            let _ = events.send(AgentEvent::Exited { code: None }).await;
        });

        let started = time::Instant::now();
        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert!(started.elapsed() >= Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn job_started_resets_the_idle_accumulator() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);
        let mut cfg = config("idle-reset");
        cfg.idle_timeout = 5;

        tokio::spawn(async move {
            // Just before the timer would fire, a job arrives and later ends
            // with a matching id; the accumulator restarts from zero.
            time::sleep(Duration::from_secs(4)).await;
            let _ = events
                .send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("1".into()))))
                .await;
            time::sleep(Duration::from_secs(60)).await;
            let _ = events
                .send(AgentEvent::Lifecycle(LifecycleEvent::ended(Some("1".into()))))
                .await;
            // Keep the channel open past the second countdown.
            time::sleep(Duration::from_secs(3600)).await;
        });

        let started = time::Instant::now();
        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        // 4s + 60s busy + a fresh >5s countdown.
        assert!(started.elapsed() >= Duration::from_secs(69));
    }

    #[tokio::test(start_paused = true)]
    async fn matched_job_end_leaves_nothing_to_restart() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);

        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::ended(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Exited { code: Some(0) })
            .unwrap();

        let code = Controller::new(config("job-matched"), harness.deps())
            .run()
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert!(harness.driver.restart_calls.lock().unwrap().is_empty());
        assert_eq!(harness.driver.unregister_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn process_exit_with_inflight_job_restarts_it_once() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);

        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Exited { code: Some(1) })
            .unwrap();

        let code = Controller::new(config("job-retry"), harness.deps())
            .run()
            .await
            .unwrap();

        // Agent death is not an error-bearing reason.
        assert_eq!(code, 0);
        assert_eq!(
            *harness.driver.restart_calls.lock().unwrap(),
            vec!["job-1".to_owned()]
        );
        assert_eq!(harness.driver.unregister_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_skips_job_restart() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);
        let mut cfg = config("no-retry");
        cfg.no_retry = true;

        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Exited { code: Some(0) })
            .unwrap();

        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert!(harness.driver.restart_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_id_completion_reconciles_through_the_driver() {
        let driver = MockDriver::default();
        *driver.poll_answer.lock().unwrap() = vec![PolledJob {
            id: "job-2".to_owned(),
            status: JobStatus::Completed,
        }];
        let harness = Harness::new(driver, MockInfra::default());
        let events = scripted_events(&harness);

        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-2".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::ended(None)))
            .unwrap();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(30)).await;
            let _ = events.send(AgentEvent::Exited { code: Some(0) }).await;
        });

        let code = Controller::new(config("reconcile"), harness.deps())
            .run()
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert!(harness.driver.poll_calls.load(Ordering::SeqCst) >= 1);
        // Only the still-in-flight job is restarted.
        assert_eq!(
            *harness.driver.restart_calls.lock().unwrap(),
            vec!["job-1".to_owned()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_id_completion_with_single_job_clears_directly() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);

        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::started(Some("job-1".into()))))
            .unwrap();
        events
            .try_send(AgentEvent::Lifecycle(LifecycleEvent::ended(None)))
            .unwrap();
        events
            .try_send(AgentEvent::Exited { code: Some(0) })
            .unwrap();

        let code = Controller::new(config("single-clear"), harness.deps())
            .run()
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(harness.driver.poll_calls.load(Ordering::SeqCst), 0);
        assert!(harness.driver.restart_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn preemption_notice_triggers_shutdown() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let events = scripted_events(&harness);
        let mut cfg = config("preempt");
        cfg.idle_timeout = 0;

        let mut deps = harness.deps();
        deps.preempt = Some(Arc::new(MockPreempt {
            after: Duration::from_secs(10),
        }));

        let started = time::Instant::now();
        let code = Controller::new(cfg, deps).run().await.unwrap();

        assert_eq!(code, 0);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(harness.driver.unregister_calls.load(Ordering::SeqCst), 1);
        drop(events);
    }

    #[tokio::test]
    async fn cloud_apply_success_never_starts_a_supervisor() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let mut cfg = config("cloud-ok");
        cfg.cloud = Some(CloudSpec::new(CloudKind::Aws));

        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(harness.supervisor.spawn_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.infra.apply_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.infra.destroy_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cloud_apply_failure_destroys_what_was_applied() {
        let harness = Harness::new(
            MockDriver::default(),
            MockInfra {
                fail_apply: true,
                ..Default::default()
            },
        );
        let mut cfg = config("cloud-fail");
        cfg.cloud = Some(CloudSpec::new(CloudKind::Aws));

        let code = Controller::new(cfg, harness.deps()).run().await.unwrap();

        assert_eq!(code, 1);
        assert_eq!(harness.infra.destroy_calls.load(Ordering::SeqCst), 1);
        // Local cleanup belongs to the instance's own controller.
        assert_eq!(harness.driver.unregister_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ceiling_fires_only_for_overaged_jobs() {
        use std::time::SystemTime;

        let harness = Harness::new(
            MockDriver {
                ceiling: Some(Duration::from_secs(100)),
                ..Default::default()
            },
            MockInfra::default(),
        );
        let mut controller = Controller::new(config("ceiling"), harness.deps());

        assert!(controller.ceiling_armed());
        assert!(controller.on_ceiling_tick().is_none());

        controller.state.jobs.push(JobRecord {
            id: Some("fresh".into()),
            started_at: SystemTime::now(),
        });
        assert!(controller.on_ceiling_tick().is_none());

        controller.state.jobs.push(JobRecord {
            id: Some("stale".into()),
            started_at: SystemTime::now() - Duration::from_secs(200),
        });
        assert_eq!(
            controller.on_ceiling_tick(),
            Some(ShutdownReason::PlatformMaxDuration)
        );

        controller.cfg.no_retry = true;
        assert!(!controller.ceiling_armed());
    }

    #[tokio::test]
    async fn repeated_shutdown_performs_cleanup_once() {
        let harness = Harness::new(MockDriver::default(), MockInfra::default());
        let mut cfg = config("double-shutdown");
        cfg.cloud = Some(CloudSpec::new(CloudKind::Aws));

        let mut controller = Controller::new(cfg, harness.deps());
        controller.state.provisioned = true;

        assert_eq!(controller.shutdown(ShutdownReason::Preemption).await, 0);
        assert_eq!(controller.shutdown(ShutdownReason::Preemption).await, 0);
        assert_eq!(harness.infra.destroy_calls.load(Ordering::SeqCst), 1);
    }
}
