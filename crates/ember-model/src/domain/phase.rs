use std::fmt;

/// Lifecycle phase of a runner controller.
///
/// ```text
/// Init → Preparing → CloudProvisioning ─────────────┐
///                  └→ LocalLaunching → Running ─────┤
///                                                   ▼
///                                  ShuttingDown → Terminated
/// ```
///
/// Job activity inside `Running` is tracked by the job set, not by extra
/// phases: job start/end does not change the supervision strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Preparing,
    CloudProvisioning,
    LocalLaunching,
    Running,
    ShuttingDown,
    Terminated,
}

impl Phase {
    /// Returns `true` once the controller has entered shutdown.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::ShuttingDown | Phase::Terminated)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Preparing => "preparing",
            Phase::CloudProvisioning => "cloud-provisioning",
            Phase::LocalLaunching => "local-launching",
            Phase::Running => "running",
            Phase::ShuttingDown => "shutting-down",
            Phase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::Phase;

    #[test]
    fn terminal_phases() {
        assert!(!Phase::Running.is_terminal());
        assert!(Phase::ShuttingDown.is_terminal());
        assert!(Phase::Terminated.is_terminal());
    }
}
