/// Authentication configuration
use crate::error::{AuthError, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Port the callback listener binds when nothing else is configured.
///
/// The redirect URI registered with the remote service must match
/// `http://localhost:8765/callback`.
pub const DEFAULT_CALLBACK_PORT: u16 = 8765;

/// Wall-clock limit for the interactive callback flow.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Tokens expiring within this window are refreshed before use.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

const ENV_PREFIX: &str = "LATCHKEY";

/// How the interactive login receives its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Authorization code + PKCE delivered to a local callback listener.
    #[default]
    LocalCallback,
    /// Hosted connect page plus status polling; no local listener.
    RemotePoll,
}

impl std::str::FromStr for Transport {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "callback" | "local" | "local-callback" => Ok(Self::LocalCallback),
            "poll" | "remote" | "remote-poll" => Ok(Self::RemotePoll),
            other => Err(AuthError::Config(format!("unknown transport '{other}'"))),
        }
    }
}

/// Configuration for the authenticator and its collaborators
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub refresh_endpoint: String,
    /// `POST` here creates a poll session; `GET {endpoint}/{id}` polls it.
    pub session_endpoint: String,
    pub connect_url: String,
    pub scope: Option<String>,
    pub callback_port: u16,
    pub callback_timeout: Duration,
    pub expiry_buffer: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub transport: Transport,
    /// Keyring service name and fallback-file directory name.
    pub app_name: String,
    /// Fixed account identifier the token record is stored under.
    pub account: String,
    /// Non-interactive credential used when nothing is stored.
    pub static_api_key: Option<String>,
    /// Overrides the default location of the encrypted fallback file.
    pub credentials_path: Option<PathBuf>,
}

impl AuthConfig {
    /// Configuration for a service whose endpoints hang off one base URL
    ///
    /// # Example
    ///
    /// ```
    /// use latchkey::config::AuthConfig;
    ///
    /// let config = AuthConfig::for_service("https://api.example.com", "demo");
    /// assert_eq!(config.token_endpoint, "https://api.example.com/oauth/token");
    /// assert_eq!(config.redirect_uri(), "http://localhost:8765/callback");
    /// ```
    pub fn for_service(base_url: &str, client_id: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client_id: client_id.to_string(),
            authorization_endpoint: format!("{base}/oauth/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            refresh_endpoint: format!("{base}/oauth/refresh"),
            session_endpoint: format!("{base}/api/cli/session"),
            connect_url: format!("{base}/cli/connect"),
            scope: None,
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            transport: Transport::default(),
            app_name: "latchkey".to_string(),
            account: "token-record".to_string(),
            static_api_key: None,
            credentials_path: None,
        }
    }

    /// Build configuration from `LATCHKEY_*` environment variables
    ///
    /// `LATCHKEY_BASE_URL` and `LATCHKEY_CLIENT_ID` are required. Optional:
    /// `LATCHKEY_CALLBACK_PORT`, `LATCHKEY_SCOPE`, `LATCHKEY_TRANSPORT`,
    /// `LATCHKEY_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}_{suffix}")).filter(|value| !value.trim().is_empty())
        };

        let base_url = var("BASE_URL")
            .ok_or_else(|| AuthError::Config(format!("{ENV_PREFIX}_BASE_URL is not set")))?;
        let client_id = var("CLIENT_ID")
            .ok_or_else(|| AuthError::Config(format!("{ENV_PREFIX}_CLIENT_ID is not set")))?;

        let mut config = Self::for_service(&base_url, &client_id);
        if let Some(port) = var("CALLBACK_PORT") {
            config.callback_port = port.trim().parse().map_err(|_| {
                AuthError::Config(format!("{ENV_PREFIX}_CALLBACK_PORT is not a port: {port}"))
            })?;
        }
        if let Some(transport) = var("TRANSPORT") {
            config.transport = transport.parse()?;
        }
        config.scope = var("SCOPE");
        config.static_api_key = var("API_KEY");

        config.validate()?;
        Ok(config)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_poll_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn with_static_api_key(mut self, key: impl Into<String>) -> Self {
        self.static_api_key = Some(key.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Redirect URI for the configured callback port
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.callback_port)
    }

    /// Check that every endpoint parses as an absolute URL
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client_id must not be empty".into()));
        }

        for (name, endpoint) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("refresh_endpoint", &self.refresh_endpoint),
            ("session_endpoint", &self.session_endpoint),
            ("connect_url", &self.connect_url),
        ] {
            Url::parse(endpoint)
                .map_err(|e| AuthError::Config(format!("{name} '{endpoint}' is invalid: {e}")))?;
        }

        Ok(())
    }
}

pub(crate) fn redirect_uri_for(port: u16) -> String {
    format!("http://localhost:{port}/callback")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_for_service_derives_endpoints() {
        let config = AuthConfig::for_service("https://api.example.com/", "demo");

        assert_eq!(
            config.authorization_endpoint,
            "https://api.example.com/oauth/authorize"
        );
        assert_eq!(config.refresh_endpoint, "https://api.example.com/oauth/refresh");
        assert_eq!(config.session_endpoint, "https://api.example.com/api/cli/session");
        assert_eq!(config.connect_url, "https://api.example.com/cli/connect");
        assert_eq!(config.callback_timeout, Duration::from_secs(300));
        assert_eq!(config.transport, Transport::LocalCallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_reads_overrides() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("LATCHKEY_BASE_URL", "https://svc.test"),
            ("LATCHKEY_CLIENT_ID", "cli"),
            ("LATCHKEY_CALLBACK_PORT", "9911"),
            ("LATCHKEY_TRANSPORT", "poll"),
            ("LATCHKEY_API_KEY", "sk-static"),
        ]))
        .unwrap();

        assert_eq!(config.client_id, "cli");
        assert_eq!(config.redirect_uri(), "http://localhost:9911/callback");
        assert_eq!(config.transport, Transport::RemotePoll);
        assert_eq!(config.static_api_key.as_deref(), Some("sk-static"));
    }

    #[test]
    fn test_from_env_requires_base_url() {
        let err = AuthConfig::from_lookup(lookup(&[("LATCHKEY_CLIENT_ID", "cli")])).unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("BASE_URL")));
    }

    #[test]
    fn test_from_env_rejects_bad_port() {
        let err = AuthConfig::from_lookup(lookup(&[
            ("LATCHKEY_BASE_URL", "https://svc.test"),
            ("LATCHKEY_CLIENT_ID", "cli"),
            ("LATCHKEY_CALLBACK_PORT", "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_relative_endpoint() {
        let mut config = AuthConfig::for_service("https://svc.test", "cli");
        config.token_endpoint = "/oauth/token".into();
        assert!(config.validate().is_err());
    }
}
