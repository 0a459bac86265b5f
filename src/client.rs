/// HTTP calls against the remote token and session endpoints
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::token::{TokenRecord, TokenResponse, UserInfo};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard OAuth error body
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    session_id: String,
}

/// Status reported by the remote poll endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Completed { api_key: String, user: Option<UserInfo> },
    Expired,
}

#[derive(Debug, Deserialize)]
struct PollBody {
    status: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    tier: Option<String>,
}

/// Thin async client for the remote service's auth endpoints
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl TokenClient {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("latchkey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchange an authorization code for a token record
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenRecord> {
        let body = json!({
            "grant_type": "authorization_code",
            "code": code,
            "client_id": self.config.client_id,
            "redirect_uri": redirect_uri,
            "code_verifier": code_verifier,
        });

        let response = self
            .post_json("exchange", &self.config.token_endpoint, &body)
            .await?;
        Ok(TokenRecord::from_response(response, Utc::now()))
    }

    /// Trade a refresh token for a new record (the refresh token rotates)
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        let body = json!({ "refresh_token": refresh_token });

        let response = self
            .post_json("refresh", &self.config.refresh_endpoint, &body)
            .await?;
        Ok(TokenRecord::from_response(response, Utc::now()))
    }

    /// Ask the remote service for a new poll session
    pub async fn request_session(&self) -> Result<String> {
        let response = self
            .http
            .post(&self.config.session_endpoint)
            .json(&json!({ "client_id": self.config.client_id }))
            .send()
            .await
            .map_err(|e| AuthError::exchange("poll", e.to_string()))?;

        let response = check_status("poll", response).await?;
        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| AuthError::exchange("poll", format!("invalid session response: {e}")))?;
        Ok(created.session_id)
    }

    /// Fetch the current status of a poll session
    ///
    /// Transport failures come back as `Err(reqwest::Error)` so the caller can
    /// retry them; protocol failures are already mapped to [`AuthError`].
    pub async fn poll_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<Result<PollStatus>, reqwest::Error> {
        let url = format!(
            "{}/{}",
            self.config.session_endpoint.trim_end_matches('/'),
            session_id
        );
        let response = self.http.get(&url).send().await?;

        let response = match check_status("poll", response).await {
            Ok(response) => response,
            Err(e) => return Ok(Err(e)),
        };

        let body: PollBody = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return Ok(Err(AuthError::exchange(
                    "poll",
                    format!("invalid status response: {e}"),
                )))
            }
        };

        Ok(parse_poll_body(body))
    }

    async fn post_json(
        &self,
        step: &'static str,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<TokenResponse> {
        debug!(step, endpoint, "calling token endpoint");

        let response = self
            .http
            .post(endpoint)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::exchange(step, e.to_string()))?;

        let response = check_status(step, response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::exchange(step, e.to_string()))?;

        // Some servers report OAuth errors with a 200 status.
        if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(&text) {
            return Err(AuthError::Provider {
                error: err.error,
                description: err.error_description,
            });
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::exchange(step, format!("invalid token response: {e}")))?;
        if token.access_token.trim().is_empty() {
            return Err(AuthError::exchange(step, "response did not include access_token"));
        }
        Ok(token)
    }
}

async fn check_status(step: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(&text) {
        if step == "exchange" {
            return Err(AuthError::Provider {
                error: err.error,
                description: err.error_description,
            });
        }
        let detail = err.error_description.unwrap_or(err.error);
        return Err(AuthError::exchange(step, format!("HTTP {status}: {detail}")));
    }

    Err(AuthError::exchange(step, format!("HTTP {status}: {text}")))
}

fn parse_poll_body(body: PollBody) -> Result<PollStatus> {
    match body.status.as_str() {
        "pending" => Ok(PollStatus::Pending),
        "expired" => Ok(PollStatus::Expired),
        "completed" => {
            let api_key = body
                .api_key
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| AuthError::exchange("poll", "completed session without api_key"))?;
            Ok(PollStatus::Completed {
                api_key,
                user: UserInfo::from_parts(body.email, body.tier),
            })
        }
        other => Err(AuthError::exchange(
            "poll",
            format!("unknown session status '{other}'"),
        )),
    }
}
