//! Lifecycle-event extraction from agent output.
//!
//! Each provider's agent logs job transitions differently:
//! - GitHub's agent prints human-readable lines without a job identifier;
//!   completion is later reconciled through the CI driver.
//! - GitLab's agent emits JSON records carrying a numeric `job` field.
//! - Bitbucket runners are not launched by this supervisor.
//!
//! Lines that match no pattern are forwarded raw.

use serde_json::Value;

use ember_model::{DriverKind, LifecycleEvent};

/// Parse one output line from the agent into a lifecycle event.
pub fn parse_agent_line(driver: DriverKind, line: &str) -> Option<LifecycleEvent> {
    match driver {
        DriverKind::Github => parse_github(line),
        DriverKind::Gitlab => parse_gitlab(line),
        DriverKind::Bitbucket => None,
    }
}

fn parse_github(line: &str) -> Option<LifecycleEvent> {
    if line.contains("Running job") {
        return Some(LifecycleEvent::started(None));
    }
    if line.contains("completed with result") {
        return Some(LifecycleEvent::ended(None));
    }
    None
}

fn parse_gitlab(line: &str) -> Option<LifecycleEvent> {
    let record: Value = serde_json::from_str(line.trim()).ok()?;
    let msg = record.get("msg")?.as_str()?;
    let job = record.get("job").map(job_id_string);

    if msg.contains("Checking for jobs") && msg.contains("received") {
        return Some(LifecycleEvent::started(job.flatten()));
    }
    if msg.starts_with("Job succeeded") || msg.starts_with("Job failed") {
        return Some(LifecycleEvent::ended(job.flatten()));
    }
    None
}

/// `job` is numeric in practice, but tolerate strings.
fn job_id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
