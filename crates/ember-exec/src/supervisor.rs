use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use ember_core::supervise::{AgentHandle, AgentSpec, Supervise, SuperviseError};
use ember_model::{AgentEvent, DriverKind};

use crate::{command, parser::parse_agent_line};

/// Output-line handling.
#[derive(Debug, Clone, Copy)]
pub struct LineConfig {
    /// Max line length before truncation.
    pub max_line_length: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
        }
    }
}

/// Spawns the provider's agent and exposes its combined output as a lazy
/// sequence of lifecycle events.
///
/// At most one live agent process per controller: the returned handle owns
/// the child exclusively, and releasing it kills the process.
pub struct AgentSupervisor {
    lines: LineConfig,
}

impl AgentSupervisor {
    pub fn new() -> Self {
        Self {
            lines: LineConfig::default(),
        }
    }

    pub fn with_line_config(lines: LineConfig) -> Self {
        Self { lines }
    }
}

impl Default for AgentSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Supervise for AgentSupervisor {
    async fn spawn(&self, spec: &AgentSpec) -> Result<AgentHandle, SuperviseError> {
        if let Some(mut configure) = command::configure_command(spec) {
            debug!(driver = %spec.driver, "configuring agent");
            let output = configure
                .output()
                .await
                .map_err(|e| SuperviseError::Setup(format!("agent configure failed to run: {e}")))?;
            if !output.status.success() {
                return Err(SuperviseError::Setup(format!(
                    "agent configure exited with code {:?}",
                    output.status.code()
                )));
            }
        }

        let mut cmd = command::run_command(spec)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SuperviseError::Spawn(e.to_string()))?;
        let pid = child.id();
        debug!(?pid, driver = %spec.driver, "agent spawned");

        let (tx, rx) = mpsc::channel::<AgentEvent>(64);
        let kill = CancellationToken::new();

        let max = self.lines.max_line_length;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, spec.driver, max, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, spec.driver, max, tx.clone()));
        }

        let released = kill.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    debug!(?code, "agent exited");
                    let _ = tx.send(AgentEvent::Exited { code }).await;
                }
                _ = released.cancelled() => {
                    debug!("agent handle released; killing agent");
                    if let Err(err) = child.kill().await {
                        warn!(%err, "failed to kill agent");
                    }
                }
            }
        });

        Ok(AgentHandle::new(rx, pid, kill))
    }
}

/// Read lines until EOF, parsing each into a lifecycle event where a
/// pattern matches and forwarding it raw otherwise.
async fn pump_lines<R>(reader: R, driver: DriverKind, max_len: usize, tx: mpsc::Sender<AgentEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = truncate_line(line, max_len);
        let event = match parse_agent_line(driver, &line) {
            Some(lifecycle) => AgentEvent::Lifecycle(lifecycle),
            None => AgentEvent::Line(line),
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    trace!("agent output stream closed");
}

fn truncate_line(line: String, max_len: usize) -> String {
    if line.len() <= max_len {
        return line;
    }
    let mut end = max_len;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    let mut line = line;
    line.truncate(end);
    line
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    use ember_model::{AgentEvent, DriverKind, LifecycleStatus};

    use super::{pump_lines, truncate_line};

    #[tokio::test]
    async fn pump_parses_events_and_forwards_raw_lines() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(8);
        let pump = tokio::spawn(pump_lines(reader, DriverKind::Github, 4096, tx));

        writer
            .write_all(b"Listening for Jobs\n2026-02-11 09:14:02Z: Running job: build\n")
            .await
            .unwrap();
        drop(writer);
        pump.await.unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::Line(line) => assert_eq!(line, "Listening for Jobs"),
            other => panic!("expected raw line, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            AgentEvent::Lifecycle(ev) => assert_eq!(ev.status, LifecycleStatus::JobStarted),
            other => panic!("expected lifecycle event, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_line("short".into(), 10), "short");
        assert_eq!(truncate_line("0123456789abc".into(), 10), "0123456789");

        // 'é' is two bytes; cutting mid-char backs off to the boundary.
        let truncated = truncate_line("ééééé".into(), 5);
        assert_eq!(truncated, "éé");
    }
}
