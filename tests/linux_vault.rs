//! Vault selection on Linux. Kept in its own test binary because it points
//! the process at a D-Bus session bus that does not exist.
#![cfg(target_os = "linux")]

use latchkey::prelude::*;

#[tokio::test]
async fn test_without_session_bus_store_uses_encrypted_file() {
    std::env::set_var("DBUS_SESSION_BUS_ADDRESS", "unix:path=/nonexistent/latchkey-bus");

    let vault = KeyringStorage::new("latchkey-linux-test");
    assert!(!vault.probe().await, "vault must need a reachable session bus");

    let dir = tempfile::tempdir().unwrap();
    let store = SecretStore::new("latchkey-linux-test", dir.path().join("credentials.enc")).await;
    assert_eq!(store.backend(), Backend::EncryptedFile);

    store.set("token-record", "v").await.unwrap();
    assert!(dir.path().join("credentials.enc").exists());
    assert_eq!(store.get("token-record").await.as_deref(), Some("v"));
}
