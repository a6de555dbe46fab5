//! Process-supervision boundary between the controller and the runner agent.
//!
//! `ember-exec` implements [`Supervise`]; the controller only ever sees the
//! returned [`AgentHandle`]: a lazy event stream plus exclusive ownership of
//! the process for the controller's lifetime.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ember_model::{AgentEvent, DriverKind, Labels};

#[derive(Debug, Error)]
pub enum SuperviseError {
    #[error("failed to spawn runner agent: {0}")]
    Spawn(String),

    #[error("agent configuration failed: {0}")]
    Setup(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the supervisor needs to start and register the agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub workdir: PathBuf,
    pub name: String,
    pub labels: Labels,
    pub single: bool,
    pub idle_timeout: i64,
    pub driver: DriverKind,
    pub repo: String,
    /// Registration token issued by the CI driver, not the repo token.
    pub registration_token: String,
}

/// Exclusive handle over the supervised agent process.
///
/// The event channel closing without a prior `Exited` event is the
/// disconnect notification. Dropping the handle (or calling
/// [`AgentHandle::release`]) cancels the kill token; the supervisor side
/// kills the child in response.
pub struct AgentHandle {
    events: Option<mpsc::Receiver<AgentEvent>>,
    pid: Option<u32>,
    kill: CancellationToken,
}

impl AgentHandle {
    pub fn new(events: mpsc::Receiver<AgentEvent>, pid: Option<u32>, kill: CancellationToken) -> Self {
        Self {
            events: Some(events),
            pid,
            kill,
        }
    }

    /// OS pid of the agent, when it spawned successfully.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the event stream. The controller owns it for the run loop;
    /// subsequent calls return `None`.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AgentEvent>> {
        self.events.take()
    }

    /// Send SIGINT so the agent deregisters its own listener before we
    /// unregister it remotely.
    #[cfg(unix)]
    pub fn interrupt(&self) {
        if let Some(pid) = self.pid {
            // SAFETY: plain kill(2) with a valid signal number.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
    }

    #[cfg(not(unix))]
    pub fn interrupt(&self) {}

    /// Release the process: the supervisor kills the child exactly once.
    pub fn release(&self) {
        self.kill.cancel();
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

/// Spawns the runner agent and exposes its lifecycle as events.
#[async_trait]
pub trait Supervise: Send + Sync {
    async fn spawn(&self, spec: &AgentSpec) -> Result<AgentHandle, SuperviseError>;
}
