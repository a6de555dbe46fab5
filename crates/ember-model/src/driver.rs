use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// CI provider selecting driver-specific behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Github,
    Gitlab,
    Bitbucket,
}

impl DriverKind {
    /// Returns the kind as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Github => "github",
            DriverKind::Gitlab => "gitlab",
            DriverKind::Bitbucket => "bitbucket",
        }
    }

    /// Infer the driver from a repository URL host.
    pub fn infer_from_repo(repo: &str) -> Option<DriverKind> {
        if repo.contains("github.com") {
            Some(DriverKind::Github)
        } else if repo.contains("gitlab") {
            Some(DriverKind::Gitlab)
        } else if repo.contains("bitbucket.org") {
            Some(DriverKind::Bitbucket)
        } else {
            None
        }
    }
}

impl FromStr for DriverKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(DriverKind::Github),
            "gitlab" => Ok(DriverKind::Gitlab),
            "bitbucket" => Ok(DriverKind::Bitbucket),
            other => Err(ModelError::UnknownDriver(other.to_owned())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::DriverKind;

    #[test]
    fn parse_and_display_roundtrip() {
        for s in ["github", "gitlab", "bitbucket"] {
            let kind: DriverKind = s.parse().unwrap();
            assert_eq!(kind.to_string(), s);
        }
    }

    #[test]
    fn unknown_driver_is_an_error() {
        assert!("jenkins".parse::<DriverKind>().is_err());
    }

    #[test]
    fn infer_from_repo_url() {
        assert_eq!(
            DriverKind::infer_from_repo("https://github.com/org/repo"),
            Some(DriverKind::Github)
        );
        assert_eq!(
            DriverKind::infer_from_repo("https://gitlab.example.com/org/repo"),
            Some(DriverKind::Gitlab)
        );
        assert_eq!(DriverKind::infer_from_repo("https://example.com/r"), None);
    }
}
