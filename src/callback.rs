/// Local HTTP listener for OAuth callbacks
use crate::config::redirect_uri_for;
use crate::error::{AuthError, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a callback listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Resolved,
    Rejected,
    Stopped,
}

type Outcome = Result<String>;

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

struct Shared {
    expected_state: String,
    state: Mutex<ListenerState>,
    outcome_tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Shared {
    /// Deliver the terminal outcome; false if one was already delivered.
    fn settle(&self, outcome: Outcome) -> bool {
        let Some(tx) = self.outcome_tx.lock().take() else {
            return false;
        };

        *self.state.lock() = if outcome.is_ok() {
            ListenerState::Resolved
        } else {
            ListenerState::Rejected
        };
        // The receiver is gone only if the listener was dropped mid-flight.
        let _ = tx.send(outcome);
        true
    }
}

/// Ephemeral loopback endpoint that receives a single authorization redirect
///
/// Serves `GET /callback` until the first terminal request (success, provider
/// error or state mismatch) or until the deadline passes. [`result`] always
/// stops the server and releases the port before returning.
///
/// [`result`]: CallbackListener::result
pub struct CallbackListener {
    port: u16,
    deadline: Instant,
    shared: Arc<Shared>,
    outcome_rx: Option<oneshot::Receiver<Outcome>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:port` and start accepting callbacks
    ///
    /// Port 0 picks an ephemeral port; read it back with [`port`]. The
    /// deadline starts counting here, not when [`result`] is awaited.
    ///
    /// [`result`]: CallbackListener::result
    /// [`port`]: CallbackListener::port
    pub async fn start(port: u16, expected_state: &str, timeout: Duration) -> Result<Self> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AuthError::Listener(format!("could not bind port {port}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Listener(format!("could not read bound port: {e}")))?
            .port();

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            expected_state: expected_state.to_string(),
            state: Mutex::new(ListenerState::Listening),
            outcome_tx: Mutex::new(Some(outcome_tx)),
        });

        let app = Router::new()
            .route("/callback", get(handle_callback))
            .with_state(shared.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %e, "callback server error");
            }
        });

        info!(port, "callback listener started");

        Ok(Self {
            port,
            deadline,
            shared,
            outcome_rx: Some(outcome_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register in the authorization request
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.port)
    }

    pub fn state(&self) -> ListenerState {
        *self.shared.state.lock()
    }

    /// Wait for the authorization code, then stop listening
    ///
    /// Rejects with [`AuthError::Provider`], [`AuthError::CsrfMismatch`] or
    /// [`AuthError::Timeout`]. The port is free again once this returns.
    pub async fn result(mut self) -> Result<String> {
        let outcome = match self.outcome_rx.take() {
            Some(rx) => match tokio::time::timeout_at(self.deadline, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(AuthError::Listener("callback channel closed".into())),
                Err(_) => {
                    warn!(port = self.port, "no callback before deadline");
                    self.shared.settle(Err(AuthError::Timeout {
                        step: "authorization",
                    }));
                    Err(AuthError::Timeout {
                        step: "authorization",
                    })
                }
            },
            None => Err(AuthError::Listener("result already taken".into())),
        };

        self.shutdown().await;
        outcome
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("callback server panicked");
                }
            }
        }

        *self.shared.state.lock() = ListenerState::Stopped;
        debug!(port = self.port, "callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    State(shared): State<Arc<Shared>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if shared.outcome_tx.lock().is_none() {
        debug!("ignoring callback after terminal event");
        return page(
            StatusCode::GONE,
            "Already Handled",
            "This sign-in request has already been handled. You can close this window.",
            false,
        );
    }

    if let Some(error) = params.get("error") {
        let description = params.get("error_description").cloned();
        warn!(error = %error, "authorization server returned an error");
        let message = match &description {
            Some(d) => format!("Authorization failed: {error} ({d})"),
            None => format!("Authorization failed: {error}"),
        };
        return settle_with_page(
            &shared,
            Err(AuthError::Provider {
                error: error.clone(),
                description,
            }),
            page(StatusCode::BAD_REQUEST, "Authorization Failed", &message, false),
        );
    }

    // State must match before the code is trusted.
    if params.get("state") != Some(&shared.expected_state) {
        warn!("callback state mismatch, rejecting as possible CSRF");
        return settle_with_page(
            &shared,
            Err(AuthError::CsrfMismatch),
            page(
                StatusCode::FORBIDDEN,
                "Security Check Failed",
                "The sign-in response did not match the request this application made. \
                 Nothing was saved. Please start the sign-in again from your terminal.",
                false,
            ),
        );
    }

    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return settle_with_page(
            &shared,
            Err(AuthError::Provider {
                error: "invalid_request".into(),
                description: Some("callback did not include an authorization code".into()),
            }),
            page(
                StatusCode::BAD_REQUEST,
                "Authorization Failed",
                "The callback did not include an authorization code.",
                false,
            ),
        );
    };

    info!("authorization code received");
    settle_with_page(
        &shared,
        Ok(code.clone()),
        page(
            StatusCode::OK,
            "Authorization Successful!",
            "You have successfully signed in. You can close this window and return to your terminal.",
            true,
        ),
    )
}

fn settle_with_page(shared: &Shared, outcome: Outcome, response: Response) -> Response {
    if shared.settle(outcome) {
        response
    } else {
        page(
            StatusCode::GONE,
            "Already Handled",
            "This sign-in request has already been handled. You can close this window.",
            false,
        )
    }
}

fn page(status: StatusCode, title: &str, message: &str, success: bool) -> Response {
    let (icon, gradient, color) = if success {
        ("✓", "#667eea 0%, #764ba2 100%", "#48bb78")
    } else {
        ("✗", "#f093fb 0%, #f5576c 100%", "#f56565")
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, {gradient});
        }}
        .container {{
            background: white;
            padding: 3rem;
            border-radius: 1rem;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            text-align: center;
            max-width: 400px;
        }}
        h1 {{ color: #2d3748; margin-bottom: 1rem; font-size: 1.875rem; }}
        p {{ color: #4a5568; line-height: 1.6; }}
        .icon {{ font-size: 4rem; color: {color}; margin-bottom: 1rem; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="icon">{icon}</div>
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>"#,
        title = escape_html(title),
        message = escape_html(message),
    );

    (status, Html(html)).into_response()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    async fn get(listener: &CallbackListener, query: &str) -> reqwest::Response {
        reqwest::get(format!(
            "http://127.0.0.1:{}/callback?{}",
            listener.port(),
            query
        ))
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_listener_creation() {
        let listener = CallbackListener::start(0, "s", TIMEOUT).await.unwrap();
        assert!(listener.port() > 0);
        assert!(listener.redirect_uri().starts_with("http://localhost:"));
        assert!(listener.redirect_uri().ends_with("/callback"));
        assert_eq!(listener.state(), ListenerState::Listening);
    }

    #[tokio::test]
    async fn test_valid_callback_resolves_code() {
        let listener = CallbackListener::start(0, "abc123", TIMEOUT).await.unwrap();

        let response = get(&listener, "code=xyz&state=abc123").await;
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Authorization Successful"));
        assert_eq!(listener.state(), ListenerState::Resolved);

        assert_eq!(listener.result().await.unwrap(), "xyz");
    }

    #[tokio::test]
    async fn test_state_mismatch_rejects_even_with_code() {
        let listener = CallbackListener::start(0, "abc123", TIMEOUT).await.unwrap();

        let response = get(&listener, "code=well-formed-code&state=wrong").await;
        assert_eq!(response.status(), 403);

        assert_eq!(listener.result().await, Err(AuthError::CsrfMismatch));
    }

    #[tokio::test]
    async fn test_missing_state_is_csrf_mismatch() {
        let listener = CallbackListener::start(0, "abc123", TIMEOUT).await.unwrap();
        get(&listener, "code=xyz").await;
        assert_eq!(listener.result().await, Err(AuthError::CsrfMismatch));
    }

    #[tokio::test]
    async fn test_provider_error_rejects() {
        let listener = CallbackListener::start(0, "abc123", TIMEOUT).await.unwrap();

        let response = get(
            &listener,
            "error=access_denied&error_description=User%20denied&state=abc123",
        )
        .await;
        assert_eq!(response.status(), 400);
        assert!(response.text().await.unwrap().contains("User denied"));

        assert_eq!(
            listener.result().await,
            Err(AuthError::Provider {
                error: "access_denied".into(),
                description: Some("User denied".into()),
            })
        );
    }

    #[tokio::test]
    async fn test_only_first_terminal_event_counts() {
        let listener = CallbackListener::start(0, "abc123", TIMEOUT).await.unwrap();

        get(&listener, "code=first&state=abc123").await;
        let late = get(&listener, "code=second&state=wrong").await;
        assert_eq!(late.status(), 410);

        assert_eq!(listener.result().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let listener = CallbackListener::start(0, "abc123", Duration::from_millis(100))
            .await
            .unwrap();
        let port = listener.port();

        assert_eq!(
            listener.result().await,
            Err(AuthError::Timeout {
                step: "authorization"
            })
        );

        let rebound = TcpListener::bind(("127.0.0.1", port)).await;
        assert!(rebound.is_ok(), "port {port} still held after timeout");
    }

    #[tokio::test]
    async fn test_deadline_counts_from_start() {
        let listener = CallbackListener::start(0, "abc123", Duration::from_millis(200))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let waited = std::time::Instant::now();
        assert_eq!(
            listener.result().await,
            Err(AuthError::Timeout {
                step: "authorization"
            })
        );
        assert!(waited.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_port_released_after_success() {
        let listener = CallbackListener::start(0, "s", TIMEOUT).await.unwrap();
        let port = listener.port();
        get(&listener, "code=c&state=s").await;
        listener.result().await.unwrap();

        let again = CallbackListener::start(port, "s2", TIMEOUT).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_listener_error() {
        let first = CallbackListener::start(0, "s", TIMEOUT).await.unwrap();
        let second = CallbackListener::start(first.port(), "s", TIMEOUT).await;
        assert!(matches!(second, Err(AuthError::Listener(_))));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>\"x\" & 'y'</script>"),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }
}
