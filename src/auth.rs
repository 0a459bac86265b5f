//! Login, refresh and logout orchestration
//!
//! [`Authenticator`] ties the PKCE generator, callback listener, browser
//! launcher, remote poll flow and secret store into one state machine. It is
//! the only entry point the rest of the tool uses:
//!
//! - [`Authenticator::get_token`]: stored token, refreshed when close to expiry
//! - [`Authenticator::authenticate`]: interactive login, coalesced per instance
//! - [`Authenticator::logout`]: local-only credential removal

use crate::browser::{print_sign_in_instructions, BrowserLauncher};
use crate::callback::CallbackListener;
use crate::client::TokenClient;
use crate::config::{AuthConfig, Transport};
use crate::error::{AuthError, Result};
use crate::pkce::{generate_state, Pkce};
use crate::poll::RemotePollFlow;
use crate::store::{Backend, SecretStorage, SecretStore};
use crate::token::TokenRecord;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

type InFlight = Shared<BoxFuture<'static, Result<String>>>;

/// Phases of a single interactive login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    Initiating,
    AwaitingCallback,
    Exchanging,
    Authenticated,
    Failed,
}

impl std::fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initiating => "initiating",
            Self::AwaitingCallback => "awaiting-callback",
            Self::Exchanging => "exchanging",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-attempt authorization session
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    pub state: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Snapshot of the stored credential for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub email: Option<String>,
    pub tier: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub backend: Backend,
}

struct Inner<S: SecretStorage> {
    config: AuthConfig,
    client: TokenClient,
    storage: Arc<S>,
    launcher: BrowserLauncher,
    phase: Mutex<FlowPhase>,
    in_flight: Mutex<Option<InFlight>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Authentication orchestrator
///
/// Cheap to clone; clones share the in-flight login and refresh guard.
pub struct Authenticator<S: SecretStorage + 'static = SecretStore> {
    inner: Arc<Inner<S>>,
}

impl<S: SecretStorage + 'static> Clone for Authenticator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Authenticator<SecretStore> {
    /// Authenticator backed by the OS vault, or the encrypted file when the
    /// vault is unavailable
    ///
    /// The vault availability check runs on the blocking pool.
    pub async fn with_default_store(config: AuthConfig) -> Result<Self> {
        let store = match &config.credentials_path {
            Some(path) => SecretStore::new(&config.app_name, path.clone()).await,
            None => SecretStore::open(&config.app_name).await?,
        };
        Self::new(config, Arc::new(store))
    }
}

impl<S: SecretStorage + 'static> Authenticator<S> {
    pub fn new(config: AuthConfig, storage: Arc<S>) -> Result<Self> {
        config.validate()?;
        let client = TokenClient::new(config.clone())?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                storage,
                launcher: BrowserLauncher::platform_default(),
                phase: Mutex::new(FlowPhase::Idle),
                in_flight: Mutex::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Replace the browser launcher (tests, headless embedding)
    ///
    /// Must be called before the authenticator is cloned or shared.
    pub fn with_launcher(mut self, launcher: BrowserLauncher) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.launcher = launcher,
            None => warn!("authenticator already shared, launcher not replaced"),
        }
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Phase of the current (or last) interactive attempt
    pub fn phase(&self) -> FlowPhase {
        *self.inner.phase.lock()
    }

    /// True while an interactive login is running
    pub fn login_in_progress(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Return a usable access token, refreshing it when close to expiry
    ///
    /// Refresh failures are logged and reported as `None` without touching
    /// the stored record. Without a stored record the configured static API
    /// key is returned, if any.
    pub async fn get_token(&self) -> Option<String> {
        let Some(record) = self.inner.load_record().await else {
            return self.inner.config.static_api_key.clone();
        };

        if !record.expires_within(self.inner.config.expiry_buffer) {
            return Some(record.access_token);
        }

        match self.refresh_if_stale().await {
            Ok(access_token) => access_token,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                None
            }
        }
    }

    /// Like [`get_token`], but a missing credential is an error
    ///
    /// [`get_token`]: Authenticator::get_token
    pub async fn require_token(&self) -> Result<String> {
        self.get_token().await.ok_or(AuthError::NoCredential)
    }

    /// Run the interactive login, or join the one already running
    ///
    /// Every concurrent caller receives the same token or the same error.
    /// Once the attempt ends, the next call starts fresh with new PKCE and
    /// state values.
    pub async fn authenticate(&self) -> Result<String> {
        let flow = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(flow) => {
                    debug!("joining in-flight login");
                    flow.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let handle = tokio::spawn(async move {
                        let result = inner.run_flow().await;
                        inner.in_flight.lock().take();
                        result
                    });

                    let flow: InFlight = async move {
                        handle.await.unwrap_or_else(|e| {
                            error!(error = %e, "login task failed");
                            Err(AuthError::Listener(format!("login task failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();

                    *slot = Some(flow.clone());
                    flow
                }
            }
        };

        flow.await
    }

    /// Exchange a refresh token and replace the stored record
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRecord> {
        let previous = self.inner.load_record().await;
        let mut record = self.inner.client.refresh(refresh_token).await?;

        if record.user.is_none() {
            record.user = previous.and_then(|p| p.user);
        }
        if record.refresh_token.is_none() {
            debug!("refresh response did not rotate the refresh token");
        }

        self.inner.save_record(&record).await?;
        info!("access token refreshed");
        Ok(record)
    }

    /// Remove the stored credential; does not contact the remote service
    pub async fn logout(&self) -> Result<()> {
        self.inner.storage.delete(&self.inner.config.account).await?;
        info!("stored credential removed");
        Ok(())
    }

    /// Describe the stored credential without refreshing it
    pub async fn status(&self) -> AuthStatus {
        let record = self.inner.load_record().await;
        let user = record.as_ref().and_then(|r| r.user.clone()).unwrap_or_default();

        AuthStatus {
            authenticated: record.as_ref().is_some_and(|r| !r.is_expired() || r.refresh_token.is_some()),
            email: user.email,
            tier: user.tier,
            expires_at: record.and_then(|r| r.expires_at),
            backend: self.inner.storage.backend(),
        }
    }

    /// Refresh under the per-instance guard so concurrent callers share one
    /// refresh call.
    async fn refresh_if_stale(&self) -> Result<Option<String>> {
        let _guard = self.inner.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let Some(record) = self.inner.load_record().await else {
            return Ok(None);
        };
        if !record.expires_within(self.inner.config.expiry_buffer) {
            return Ok(Some(record.access_token));
        }

        let Some(refresh_token) = record.refresh_token else {
            debug!("token near expiry and no refresh token stored");
            return Ok(None);
        };

        let refreshed = self.refresh_token(&refresh_token).await?;
        Ok(Some(refreshed.access_token))
    }
}

impl<S: SecretStorage + 'static> Inner<S> {
    fn set_phase(&self, phase: FlowPhase) {
        *self.phase.lock() = phase;
        debug!(phase = %phase, "login phase");
    }

    async fn load_record(&self) -> Option<TokenRecord> {
        let raw = self.storage.get(&self.config.account).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "stored token record is unreadable");
                None
            }
        }
    }

    async fn save_record(&self, record: &TokenRecord) -> Result<()> {
        let raw = serde_json::to_string(record)
            .map_err(|e| AuthError::Storage(format!("failed to serialize token record: {e}")))?;
        self.storage.set(&self.config.account, &raw).await
    }

    async fn run_flow(&self) -> Result<String> {
        self.set_phase(FlowPhase::Initiating);

        let result = match self.config.transport {
            Transport::LocalCallback => self.run_callback_flow().await,
            Transport::RemotePoll => self.run_poll_flow().await,
        };

        match &result {
            Ok(_) => {
                self.set_phase(FlowPhase::Authenticated);
                info!("login completed");
            }
            Err(e) => {
                self.set_phase(FlowPhase::Failed);
                if e.is_security_event() {
                    error!(error = %e, "login rejected");
                } else {
                    warn!(error = %e, "login failed");
                }
            }
        }

        result
    }

    async fn run_callback_flow(&self) -> Result<String> {
        let pkce = Pkce::generate();
        let state = generate_state();

        let listener =
            CallbackListener::start(self.config.callback_port, &state, self.config.callback_timeout)
                .await?;

        let created_at = Utc::now();
        let session = AuthorizationSession {
            state,
            redirect_uri: listener.redirect_uri(),
            created_at,
            deadline: chrono::Duration::from_std(self.config.callback_timeout)
                .ok()
                .and_then(|timeout| created_at.checked_add_signed(timeout))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let url = build_authorization_url(&self.config, &session, &pkce)?;

        self.set_phase(FlowPhase::AwaitingCallback);
        print_sign_in_instructions(&url);
        self.launcher.launch_detached(&url);

        let code = listener.result().await?;

        self.set_phase(FlowPhase::Exchanging);
        let record = self
            .client
            .exchange_code(&code, pkce.code_verifier(), &session.redirect_uri)
            .await?;

        self.save_record(&record).await?;
        Ok(record.access_token)
    }

    async fn run_poll_flow(&self) -> Result<String> {
        self.set_phase(FlowPhase::AwaitingCallback);
        let record = RemotePollFlow::new(self.client.clone(), self.launcher.clone())
            .run()
            .await?;

        self.save_record(&record).await?;
        Ok(record.access_token)
    }
}

/// Build the browser-facing authorization URL for one attempt
pub fn build_authorization_url(
    config: &AuthConfig,
    session: &AuthorizationSession,
    pkce: &Pkce,
) -> Result<String> {
    let mut params = vec![
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", session.redirect_uri.as_str()),
        ("response_type", "code"),
        ("state", session.state.as_str()),
        ("code_challenge", pkce.code_challenge()),
        ("code_challenge_method", Pkce::code_challenge_method()),
    ];
    if let Some(scope) = &config.scope {
        params.push(("scope", scope.as_str()));
    }

    let url = Url::parse_with_params(&config.authorization_endpoint, &params)
        .map_err(|e| AuthError::Config(format!("invalid authorization_endpoint: {e}")))?;
    Ok(url.into())
}
