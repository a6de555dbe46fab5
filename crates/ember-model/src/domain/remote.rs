use serde::{Deserialize, Serialize};

use crate::Labels;

/// Runner identity as reported by the CI provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRunner {
    /// Provider-side identifier.
    pub id: String,
    /// Registered name.
    pub name: String,
    /// Labels attached at registration time.
    pub labels: Vec<String>,
    /// Whether the provider currently sees the runner as connected.
    pub online: bool,
    /// Whether the runner is executing a job right now.
    pub busy: bool,
}

impl RemoteRunner {
    /// Find a runner by exact name.
    pub fn find_by_name<'a>(name: &str, runners: &'a [RemoteRunner]) -> Option<&'a RemoteRunner> {
        runners.iter().find(|r| r.name == name)
    }

    /// Find runners carrying every requested label.
    pub fn find_by_labels<'a>(labels: &Labels, runners: &'a [RemoteRunner]) -> Vec<&'a RemoteRunner> {
        runners
            .iter()
            .filter(|r| labels.subset_of(r.labels.iter().map(String::as_str)))
            .collect()
    }
}
