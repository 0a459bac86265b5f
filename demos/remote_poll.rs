/// Example: Login through the hosted connect page, no local listener
///
/// The remote service issues a session id, the user approves it in the
/// browser, and this process polls until an API key is handed back.
///
///   LATCHKEY_BASE_URL   remote service, e.g. https://api.example.com
///   LATCHKEY_CLIENT_ID  registered client id
///
/// Run:
/// cargo run --example remote_poll
use latchkey::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "latchkey=info".into()))
        .with_writer(std::io::stderr)
        .init();

    println!("=== Latchkey Remote Poll Example ===\n");

    let config = AuthConfig::from_env()
        .expect("LATCHKEY_BASE_URL and LATCHKEY_CLIENT_ID must be set")
        .with_transport(Transport::RemotePoll)
        .with_poll_timing(Duration::from_secs(2), Duration::from_secs(300));

    let auth = Authenticator::with_default_store(config)
        .await
        .expect("Failed to open credential store");

    match auth.authenticate().await {
        Ok(_) => {
            let status = auth.status().await;
            println!("\n✓ Connected");
            if let Some(email) = status.email {
                println!("Account: {email}");
            }
            if let Some(tier) = status.tier {
                println!("Tier: {tier}");
            }
            println!("Stored in: {}", status.backend);
        }
        Err(AuthError::Timeout { .. }) => {
            eprintln!("\n✗ The session was not approved in time. Run the example again.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("\n✗ Login failed: {e}");
            std::process::exit(1);
        }
    }
}
