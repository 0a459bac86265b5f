/// Example: Credential storage with the OS vault and encrypted-file fallback
///
/// Platform vaults:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// When no vault is reachable (headless Linux, containers) the store falls
/// back to an AES-256-GCM encrypted file under the user's data directory.
///
/// Run:
/// cargo run --example secure_storage
use latchkey::prelude::*;
use latchkey::store::default_credentials_path;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("latchkey=debug")
        .with_writer(std::io::stderr)
        .init();

    println!("=== Secure Storage Example ===\n");

    let app_name = "latchkey-storage-example";
    let store = SecretStore::open(app_name)
        .await
        .expect("Failed to open credential store");

    println!("Selected backend: {}", store.backend());
    match default_credentials_path(app_name) {
        Ok(path) => println!("Fallback file: {}\n", path.display()),
        Err(e) => println!("Fallback file unavailable: {e}\n"),
    }

    let record = TokenRecord::api_key(
        "sk-example-0123456789".to_string(),
        Some(UserInfo {
            email: Some("user@example.com".to_string()),
            tier: Some("free".to_string()),
        }),
    );
    let raw = serde_json::to_string(&record).expect("Failed to serialize record");

    store.set("token-record", &raw).await.expect("Failed to store record");
    println!("✓ Record stored");

    let loaded = store
        .get("token-record")
        .await
        .expect("Stored record not found");
    let loaded: TokenRecord = serde_json::from_str(&loaded).expect("Stored record unreadable");
    println!("✓ Record read back: {loaded:?}");

    store.delete("token-record").await.expect("Failed to delete record");
    store.delete("token-record").await.expect("Second delete should be a no-op");
    println!("✓ Record deleted");

    assert!(store.get("token-record").await.is_none());
    println!("\nDone.");
}
