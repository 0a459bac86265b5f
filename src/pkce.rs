/// PKCE (Proof Key for Code Exchange) implementation
/// RFC 7636: https://tools.ietf.org/html/rfc7636
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE challenge pair containing code verifier and code challenge
///
/// Generated fresh for every authorization attempt and never persisted.
#[derive(Clone)]
pub struct Pkce {
    code_verifier: String,
    code_challenge: String,
}

impl Pkce {
    /// Generate a new PKCE challenge pair
    ///
    /// The verifier carries 256 bits from the thread-local CSPRNG; the
    /// challenge is its SHA-256 digest, both base64url encoded without padding.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey::pkce::Pkce;
    ///
    /// let pkce = Pkce::generate();
    /// assert_eq!(pkce.code_verifier().len(), 43);
    /// assert_eq!(Pkce::code_challenge_method(), "S256");
    /// ```
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        let code_verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let code_challenge = challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// Get the code verifier
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// Get the code challenge
    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    /// Get the code challenge method (always S256)
    pub fn code_challenge_method() -> &'static str {
        "S256"
    }
}

impl std::fmt::Debug for Pkce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkce")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Derive the S256 code challenge for a verifier.
pub fn challenge_for(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random CSRF state nonce (128 bits, base64url).
pub fn generate_state() -> String {
    let state_bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(state_bytes)
}
