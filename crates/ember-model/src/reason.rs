use std::fmt;

/// Termination signal that triggered a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sig {
    Term,
    Int,
    Quit,
}

impl fmt::Display for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sig::Term => f.write_str("SIGTERM"),
            Sig::Int => f.write_str("SIGINT"),
            Sig::Quit => f.write_str("SIGQUIT"),
        }
    }
}

/// Why the controller is shutting down.
///
/// Attached to every shutdown invocation; logged, and mapped onto the
/// process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal arrived.
    Signal(Sig),
    /// The supervised agent process exited.
    ProcessExit { code: Option<i32> },
    /// The agent's output stream closed while the process was still tracked.
    ProcessDisconnect,
    /// No in-flight jobs for longer than the configured idle timeout.
    IdleTimeout { secs: u64 },
    /// An in-flight job outlived the platform's hard execution ceiling.
    PlatformMaxDuration,
    /// The cloud platform announced instance termination.
    Preemption,
    /// A fatal error after resources were already created.
    Failure(String),
}

impl ShutdownReason {
    /// Error-bearing reasons exit non-zero and log at error level.
    pub fn is_error(&self) -> bool {
        matches!(self, ShutdownReason::Failure(_))
    }

    /// Process exit code dictated by this reason.
    pub fn exit_code(&self) -> i32 {
        if self.is_error() { 1 } else { 0 }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(sig) => write!(f, "{sig}"),
            ShutdownReason::ProcessExit { code: Some(code) } => {
                write!(f, "process exit (code {code})")
            }
            ShutdownReason::ProcessExit { code: None } => f.write_str("process exit"),
            ShutdownReason::ProcessDisconnect => f.write_str("process disconnect"),
            ShutdownReason::IdleTimeout { secs } => write!(f, "idle timeout ({secs}s)"),
            ShutdownReason::PlatformMaxDuration => f.write_str("platform max duration"),
            ShutdownReason::Preemption => f.write_str("instance pre-emption"),
            ShutdownReason::Failure(msg) => write!(f, "failure: {msg}"),
        }
    }
}
