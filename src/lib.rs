//! Latchkey - local OAuth 2.0 login and credential lifecycle
//!
//! This library lets a desktop client or CLI act on behalf of a user against
//! a remote service without ever handling the user's password.
//!
//! # Features
//!
//! - OAuth 2.0 authorization code flow with PKCE (RFC 7636) and CSRF state
//! - Ephemeral loopback callback listener with a hard deadline
//! - Browser launching with platform fallbacks and manual instructions
//! - Remote poll login for environments where a local listener is unwanted
//! - Token refresh ahead of expiry
//! - OS credential vault storage with an encrypted-file fallback
//!
//! # Example
//!
//! ```no_run
//! use latchkey::prelude::*;
//!
//! # async fn run() -> latchkey::Result<()> {
//! let config = AuthConfig::for_service("https://api.example.com", "your-client-id");
//! let auth = Authenticator::with_default_store(config).await?;
//!
//! let token = match auth.get_token().await {
//!     Some(token) => token,
//!     None => auth.authenticate().await?,
//! };
//! println!("Bearer {token}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod browser;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod pkce;
pub mod poll;
pub mod store;
pub mod token;

pub use error::{AuthError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{AuthStatus, Authenticator, FlowPhase};
    pub use crate::browser::{BrowserLauncher, LaunchOutcome, LaunchStrategy};
    pub use crate::callback::CallbackListener;
    pub use crate::config::{AuthConfig, Transport};
    pub use crate::error::{AuthError, Result};
    pub use crate::pkce::Pkce;
    pub use crate::store::{
        Backend, EncryptedFileStorage, KeyringStorage, MemoryStorage, SecretStorage, SecretStore,
    };
    pub use crate::token::{TokenRecord, UserInfo};
}
