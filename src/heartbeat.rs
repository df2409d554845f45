//! Heartbeat client - polls one sidecar's health endpoint
//!
//! Issues `GET {control_address}/health` and decodes the sidecar's stats
//! reply. Transient failures are retried in-call with exponential backoff
//! (4 attempts, 500 ms initial delay); the caller only ever sees the final
//! classification: `Unreachable` for transport failures, `Protocol` for a
//! non-200 status or a malformed body.

use std::time::Duration;

use crate::model::HeartbeatReply;

/// Path appended to a registrant's control address.
pub const HEALTH_PATH: &str = "/health";

/// In-call retry attempts before giving up on a poll.
const POLL_ATTEMPTS: u32 = 4;

/// Initial backoff delay; doubles per attempt.
const POLL_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    /// Every attempt failed at the transport level.
    #[error("sidecar unreachable: {0}")]
    Unreachable(String),
    /// The sidecar answered, but not with a valid health reply.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Build the shared HTTP client with the connection defaults all pollers
/// use: 30 s connect timeout, 5 min total request deadline, keep-alives on.
pub fn default_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(300))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(Duration::from_secs(300))
        .build()
}

/// Backoff delay before retry `attempt` (0-indexed): `base * 2^attempt`.
fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

pub struct HeartbeatClient {
    http: reqwest::Client,
    control_address: String,
    attempts: u32,
    base_delay: Duration,
}

impl HeartbeatClient {
    /// The client is shared across checkers (cheap clone); only the control
    /// address is per-registrant.
    pub fn new(http: reqwest::Client, control_address: &str) -> Self {
        Self {
            http,
            control_address: control_address.to_string(),
            attempts: POLL_ATTEMPTS,
            base_delay: POLL_BASE_DELAY,
        }
    }

    /// Override the in-call retry policy. Tests shrink this to keep failure
    /// paths fast.
    pub fn with_retry_policy(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Poll the sidecar once, retrying internally. The error class of the
    /// final attempt wins.
    pub async fn heartbeat(&self) -> Result<HeartbeatReply, HeartbeatError> {
        let url = format!("{}{}", self.control_address, HEALTH_PATH);

        let mut last_err = HeartbeatError::Unreachable("no attempts made".to_string());
        for attempt in 0..self.attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt - 1, self.base_delay)).await;
            }
            match self.attempt(&url).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    tracing::debug!(
                        "Heartbeat attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        self.attempts,
                        url,
                        err
                    );
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    async fn attempt(&self, url: &str) -> Result<HeartbeatReply, HeartbeatError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HeartbeatError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeartbeatError::Protocol(format!(
                "unexpected http status {status}"
            )));
        }

        response
            .json::<HeartbeatReply>()
            .await
            .map_err(|e| HeartbeatError::Protocol(format!("failed to decode reply: {e}")))
    }
}
