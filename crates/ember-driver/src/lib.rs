//! CI provider clients.
//!
//! One [`CiDriver`] implementation per provider, selected once at
//! construction time from configuration.

use std::sync::Arc;

use ember_core::driver::{CiDriver, DriverError};
use ember_model::DriverKind;

mod bitbucket;
pub use bitbucket::BitbucketDriver;

mod github;
pub use github::GithubDriver;

mod gitlab;
pub use gitlab::GitlabDriver;

/// Build the driver for the configured provider.
pub fn from_config(
    kind: DriverKind,
    repo: &str,
    token: &str,
) -> Result<Arc<dyn CiDriver>, DriverError> {
    Ok(match kind {
        DriverKind::Github => Arc::new(GithubDriver::new(repo, token)?),
        DriverKind::Gitlab => Arc::new(GitlabDriver::new(repo, token)?),
        DriverKind::Bitbucket => Arc::new(BitbucketDriver::new(repo, token)?),
    })
}
