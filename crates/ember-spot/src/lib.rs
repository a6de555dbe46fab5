//! EC2 spot-termination watcher.
//!
//! Subscribes to the instance metadata service (IMDSv2): a session token is
//! fetched first, then `spot/instance-action` is polled until it exists,
//! which is AWS's two-minute termination notice. Off EC2 the token request
//! fails fast and the watcher reports itself unavailable; the controller
//! treats that as a disabled trigger, not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ember_core::preempt::{PreemptError, PreemptNotify};

const IMDS_BASE: &str = "http://169.254.169.254/latest";
const TOKEN_TTL_SECS: &str = "21600";
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct Ec2SpotWatcher {
    client: Client,
    base: String,
    poll_interval: Duration,
}

impl Ec2SpotWatcher {
    pub fn new() -> Result<Self, PreemptError> {
        Self::with_base(IMDS_BASE)
    }

    /// Point at a non-default metadata endpoint (tests, proxies).
    pub fn with_base(base: impl Into<String>) -> Result<Self, PreemptError> {
        // The metadata service is link-local; anything slower than this
        // means we are not on EC2.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(1))
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| PreemptError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base: base.into(),
            poll_interval: POLL_INTERVAL,
        })
    }

    async fn session_token(&self) -> Result<String, PreemptError> {
        let response = self
            .client
            .put(format!("{}/api/token", self.base))
            .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECS)
            .send()
            .await
            .map_err(|e| PreemptError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PreemptError::Unavailable(format!(
                "imds token request returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| PreemptError::Unavailable(e.to_string()))
    }

    async fn metadata(&self, token: &str, path: &str) -> Result<Option<String>, PreemptError> {
        let response = self
            .client
            .get(format!("{}/meta-data/{path}", self.base))
            .header("X-aws-ec2-metadata-token", token)
            .send()
            .await
            .map_err(|e| PreemptError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response.text().await.ok()),
            status => Err(PreemptError::Unavailable(format!(
                "imds returned {status} for {path}"
            ))),
        }
    }
}

#[async_trait]
impl PreemptNotify for Ec2SpotWatcher {
    async fn watch(&self, notice: CancellationToken) -> Result<(), PreemptError> {
        let mut token = self.session_token().await?;

        if let Some(instance_id) = self.metadata(&token, "instance-id").await? {
            info!(%instance_id, "watching for spot termination notice");
        }

        let client = self.client.clone();
        let base = self.base.clone();
        let poll_interval = self.poll_interval;
        let watcher = Self {
            client,
            base,
            poll_interval,
        };

        tokio::spawn(async move {
            let mut poll = tokio::time::interval(watcher.poll_interval);
            loop {
                poll.tick().await;
                match watcher.metadata(&token, "spot/instance-action").await {
                    Ok(Some(action)) => {
                        info!(%action, "spot termination notice received");
                        notice.cancel();
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Token expiry shows up as an error; refresh and
                        // keep polling.
                        debug!(%err, "metadata poll failed; refreshing session token");
                        match watcher.session_token().await {
                            Ok(fresh) => token = fresh,
                            Err(err) => {
                                warn!(%err, "lost the metadata service; disabling watcher");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use ember_core::preempt::{PreemptError, PreemptNotify};

    use super::Ec2SpotWatcher;

    #[tokio::test]
    async fn off_ec2_subscription_reports_unavailable() {
        // Nothing listens here; the connect must fail fast.
        let watcher = Ec2SpotWatcher::with_base("http://127.0.0.1:9").unwrap();
        let notice = CancellationToken::new();

        let result = watcher.watch(notice.clone()).await;

        assert!(matches!(result, Err(PreemptError::Unavailable(_))));
        assert!(!notice.is_cancelled());
    }
}
