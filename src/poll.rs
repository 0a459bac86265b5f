/// Remote poll login: hosted connect page plus session status polling
use crate::browser::{print_sign_in_instructions, BrowserLauncher};
use crate::client::{PollStatus, TokenClient};
use crate::error::{AuthError, Result};
use crate::token::TokenRecord;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Login transport that needs no local listener
///
/// The remote service hands back a long-lived API key once the user
/// approves the session in their browser.
#[derive(Debug, Clone)]
pub struct RemotePollFlow {
    client: TokenClient,
    launcher: BrowserLauncher,
}

impl RemotePollFlow {
    pub fn new(client: TokenClient, launcher: BrowserLauncher) -> Self {
        Self { client, launcher }
    }

    /// URL of the hosted connect page for a session
    pub fn connect_url(&self, session_id: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.client.config().connect_url,
            &[("session_id", session_id)],
        )
        .map_err(|e| AuthError::Config(format!("invalid connect_url: {e}")))?;
        Ok(url.into())
    }

    /// Run the flow to a terminal state
    pub async fn run(&self) -> Result<TokenRecord> {
        let session_id = self.client.request_session().await?;
        info!(session_id = %session_id, "remote session created");

        let url = self.connect_url(&session_id)?;
        print_sign_in_instructions(&url);
        self.launcher.launch_detached(&url);

        self.wait_for_completion(&session_id).await
    }

    /// Poll until the session completes, expires or the deadline passes
    pub async fn wait_for_completion(&self, session_id: &str) -> Result<TokenRecord> {
        let config = self.client.config();
        let deadline = Instant::now() + config.poll_timeout;

        loop {
            if Instant::now() >= deadline {
                warn!(session_id, "remote session not completed before deadline");
                return Err(AuthError::Timeout { step: "poll" });
            }

            match self.client.poll_session(session_id).await {
                Ok(Ok(PollStatus::Pending)) => debug!(session_id, "session pending"),
                Ok(Ok(PollStatus::Completed { api_key, user })) => {
                    info!(session_id, "remote session completed");
                    return Ok(TokenRecord::api_key(api_key, user));
                }
                Ok(Ok(PollStatus::Expired)) => {
                    warn!(session_id, "remote session expired");
                    return Err(AuthError::Timeout { step: "poll" });
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => warn!(session_id, error = %e, "poll request failed, retrying"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(config.poll_interval.min(remaining)).await;
        }
    }
}
