/// Example: Browser login with PKCE and a local callback listener
///
/// Reads its configuration from the environment:
///
///   LATCHKEY_BASE_URL   remote service, e.g. https://api.example.com
///   LATCHKEY_CLIENT_ID  registered client id
///
/// The stored token is reused on later runs and refreshed when it is
/// within five minutes of expiry.
///
/// Run:
/// RUST_LOG=latchkey=debug cargo run --example login
use latchkey::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("=== Latchkey Login Example ===\n");

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("Set LATCHKEY_BASE_URL and LATCHKEY_CLIENT_ID.");
            std::process::exit(2);
        }
    };

    let auth = Authenticator::with_default_store(config)
        .await
        .expect("Failed to open credential store");

    let status = auth.status().await;
    println!("Credential store: {}", status.backend);

    if let Some(token) = auth.get_token().await {
        println!("Already signed in{}", describe(&status));
        println!("Token: {}...", preview(&token));
        return;
    }

    println!("Signing in via browser...\n");
    match auth.authenticate().await {
        Ok(token) => {
            println!("\n✓ Signed in{}", describe(&auth.status().await));
            println!("Token: {}...", preview(&token));
        }
        Err(e) => {
            eprintln!("\n✗ Login failed: {e}");
            std::process::exit(1);
        }
    }
}

fn describe(status: &AuthStatus) -> String {
    match (&status.email, &status.expires_at) {
        (Some(email), Some(at)) => format!(" as {email} (expires {at})"),
        (Some(email), None) => format!(" as {email}"),
        (None, Some(at)) => format!(" (expires {at})"),
        (None, None) => String::new(),
    }
}

fn preview(token: &str) -> String {
    token.chars().take(12).collect()
}
