use std::fmt;

use serde::{Deserialize, Serialize};

/// Job lifecycle transition reported by the supervised agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    JobStarted,
    JobEnded,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStatus::JobStarted => f.write_str("job_started"),
            LifecycleStatus::JobEnded => f.write_str("job_ended"),
        }
    }
}

/// Parsed lifecycle event from the agent's combined output.
///
/// `job` is `None` for providers whose agent log does not carry a job
/// identifier (GitHub); completion is then recovered via reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub status: LifecycleStatus,
    pub job: Option<String>,
}

impl LifecycleEvent {
    pub fn started(job: Option<String>) -> Self {
        Self {
            status: LifecycleStatus::JobStarted,
            job,
        }
    }

    pub fn ended(job: Option<String>) -> Self {
        Self {
            status: LifecycleStatus::JobEnded,
            job,
        }
    }
}

/// Event emitted by the process supervisor to the controller.
///
/// Closure of the event channel without a prior `Exited` is the
/// disconnect notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A parsed job lifecycle transition.
    Lifecycle(LifecycleEvent),
    /// Raw output line that matched no lifecycle pattern.
    Line(String),
    /// The agent process exited.
    Exited { code: Option<i32> },
}

#[cfg(test)]
mod tests {
    use super::{LifecycleEvent, LifecycleStatus};

    #[test]
    fn status_renders_snake_case() {
        assert_eq!(LifecycleStatus::JobStarted.to_string(), "job_started");
        assert_eq!(LifecycleStatus::JobEnded.to_string(), "job_ended");
    }

    #[test]
    fn constructors_set_status() {
        assert_eq!(
            LifecycleEvent::started(Some("42".into())).status,
            LifecycleStatus::JobStarted
        );
        assert_eq!(LifecycleEvent::ended(None).status, LifecycleStatus::JobEnded);
    }
}
