use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// An in-flight pipeline job tracked by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Provider job identifier; absent when the agent log carries none.
    pub id: Option<String>,
    /// When the agent reported the job as started.
    pub started_at: SystemTime,
}

impl JobRecord {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            started_at: SystemTime::now(),
        }
    }

    /// Wall-clock time since the job started; zero if the clock went back.
    pub fn age(&self) -> Duration {
        self.started_at.elapsed().unwrap_or(Duration::ZERO)
    }
}

/// Job status as reported by the CI provider during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
}

/// Reconciliation answer for a single tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledJob {
    pub id: String,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::{JobRecord, JobStatus};

    #[test]
    fn new_record_has_near_zero_age() {
        let rec = JobRecord::new(Some("7".into()));
        assert!(rec.age() < Duration::from_secs(1));
    }

    #[test]
    fn age_of_an_old_record() {
        let rec = JobRecord {
            id: None,
            started_at: SystemTime::now() - Duration::from_secs(3600),
        };
        assert!(rec.age() >= Duration::from_secs(3599));
    }

    #[test]
    fn status_serde_is_snake_case() {
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
