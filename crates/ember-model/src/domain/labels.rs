use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered set of runner labels.
///
/// Parsed from a comma-delimited string (`"ember,gpu"`); rendered back the
/// same way when registering the runner or filling the infra template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(Vec<String>);

impl Labels {
    /// Parse a comma-delimited label list, dropping empty segments.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Returns `true` if no labels are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate through labels as `&str`.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns `true` if every label in `self` is present in `other`.
    ///
    /// Used for the reuse check: an existing runner satisfies a request when
    /// it carries all requested labels.
    pub fn subset_of<'a, I>(&self, other: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let theirs: Vec<&str> = other.into_iter().collect();
        self.iter().all(|l| theirs.contains(&l))
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self(vec!["ember".to_owned()])
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}
