/// Error types for latchkey authentication operations
use thiserror::Error;

/// Errors surfaced by the login, refresh and storage paths.
///
/// The enum is `Clone` so a single in-flight login can hand the same
/// failure to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization failed: {error}{}", suffix(.description))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("Authorization rejected: state parameter mismatch (possible CSRF)")]
    CsrfMismatch,

    #[error("Timed out during {step}")]
    Timeout { step: &'static str },

    #[error("Token {step} failed: {message}")]
    Exchange { step: &'static str, message: String },

    #[error("Credential storage failed: {0}")]
    Storage(String),

    #[error("No credential available; run the login flow or set LATCHKEY_API_KEY")]
    NoCredential,

    #[error("Callback listener failed: {0}")]
    Listener(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AuthError {
    pub(crate) fn exchange(step: &'static str, message: impl Into<String>) -> Self {
        Self::Exchange {
            step,
            message: message.into(),
        }
    }

    /// True for failures that indicate tampering rather than a broken flow.
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::CsrfMismatch)
    }

    /// True when retrying with a fresh interactive login may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Exchange { .. } | Self::Listener(_)
        )
    }
}

fn suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_step() {
        let timeout = AuthError::Timeout {
            step: "authorization",
        };
        assert_eq!(timeout.to_string(), "Timed out during authorization");

        let refresh = AuthError::exchange("refresh", "HTTP 401");
        assert_eq!(refresh.to_string(), "Token refresh failed: HTTP 401");

        let provider = AuthError::Provider {
            error: "access_denied".into(),
            description: Some("user cancelled".into()),
        };
        assert_eq!(
            provider.to_string(),
            "Authorization failed: access_denied (user cancelled)"
        );
    }

    #[test]
    fn test_csrf_is_security_event_and_not_retryable() {
        assert!(AuthError::CsrfMismatch.is_security_event());
        assert!(!AuthError::CsrfMismatch.is_retryable());
        assert!(AuthError::Timeout { step: "poll" }.is_retryable());
    }
}
