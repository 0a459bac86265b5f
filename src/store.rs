/// Durable secret storage with OS vault and encrypted-file backends
use crate::error::{AuthError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::Entry;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROBE_ACCOUNT: &str = "__latchkey_probe__";
const FILE_FORMAT_VERSION: u32 = 1;
const FILE_KEY_CONTEXT: &[u8] = b"latchkey/credential-file/v1";

/// Key/value storage for secrets
///
/// All operations are idempotent. `get` reports a missing or unreadable
/// value as `None`; only `set` and `delete` surface failures.
#[async_trait]
pub trait SecretStorage: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Which backend is serving requests, for status display
    fn backend(&self) -> Backend;

    /// Whether the backend can serve requests at all
    async fn probe(&self) -> bool {
        true
    }
}

/// Storage backend chosen at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vault,
    EncryptedFile,
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vault => f.write_str("os-vault"),
            Self::EncryptedFile => f.write_str("encrypted-file"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// In-memory storage implementation
///
/// Suitable for testing and for embedding where persistence is handled
/// elsewhere.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    fn backend(&self) -> Backend {
        Backend::Memory
    }
}

/// OS credential manager storage
///
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service over D-Bus (GNOME Keyring, KWallet)
///
/// `keyring` calls block, so each one runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// A vault that answers "no such entry" is working; anything else
    /// (missing daemon, locked session, unsupported platform) is not.
    fn probe_blocking(&self) -> bool {
        let entry = match Entry::new(&self.service, PROBE_ACCOUNT) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "keyring entry could not be created");
                return false;
            }
        };

        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => true,
            Err(e) => {
                debug!(error = %e, "keyring availability check failed");
                false
            }
        }
    }

    async fn run<T, F>(&self, key: &str, op: F) -> std::result::Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(|e| e.to_string())?;
            op(entry).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("keyring task failed: {e}"))?
    }
}

#[async_trait]
impl SecretStorage for KeyringStorage {
    async fn get(&self, key: &str) -> Option<String> {
        let result = self
            .run(key, |entry| match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await;

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "keyring read failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.run(key, move |entry| entry.set_password(&value))
            .await
            .map_err(|e| AuthError::Storage(format!("keyring write failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.run(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| AuthError::Storage(format!("keyring delete failed: {e}")))
    }

    fn backend(&self) -> Backend {
        Backend::Vault
    }

    async fn probe(&self) -> bool {
        let vault = self.clone();
        tokio::task::spawn_blocking(move || vault.probe_blocking())
            .await
            .unwrap_or(false)
    }
}

/// On-disk envelope of the encrypted credential file
#[derive(Debug, Serialize, Deserialize)]
struct EncryptedEnvelope {
    version: u32,
    nonce: String,
    ciphertext: String,
}

/// Encrypted key/value file
///
/// The whole map is sealed with AES-256-GCM under a key derived from a
/// static application secret and machine-local identity. This keeps
/// credentials out of plaintext; it is not a boundary against a local
/// attacker running as the same user.
pub struct EncryptedFileStorage {
    path: PathBuf,
    cipher: Aes256Gcm,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for EncryptedFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStorage")
            .field("path", &self.path)
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

impl EncryptedFileStorage {
    /// Create storage at an explicit path, keyed for this machine
    pub fn with_path(path: PathBuf, app_name: &str) -> Self {
        Self::with_key(path, machine_key(app_name))
    }

    /// Create storage at `<data_dir>/<app_name>/credentials.enc`
    ///
    /// Respects `$XDG_DATA_HOME`, then falls back to the platform data
    /// directory.
    pub fn new(app_name: &str) -> Result<Self> {
        Ok(Self::with_path(default_credentials_path(app_name)?, app_name))
    }

    pub(crate) fn with_key(path: PathBuf, key: [u8; 32]) -> Self {
        Self {
            path,
            cipher: Aes256Gcm::new(&key.into()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> std::result::Result<HashMap<String, String>, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(format!("failed to read {}: {e}", self.path.display())),
        };

        let envelope: EncryptedEnvelope = serde_json::from_str(&content)
            .map_err(|e| format!("credential file is malformed: {e}"))?;
        if envelope.version != FILE_FORMAT_VERSION {
            return Err(format!(
                "unsupported credential file version {}",
                envelope.version
            ));
        }

        let nonce = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| format!("bad nonce encoding: {e}"))?;
        if nonce.len() != 12 {
            return Err("bad nonce length".to_string());
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| format!("bad ciphertext encoding: {e}"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| "credential file could not be decrypted".to_string())?;

        serde_json::from_slice(&plaintext).map_err(|e| format!("credential map is malformed: {e}"))
    }

    async fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        let plaintext = serde_json::to_vec(values)
            .map_err(|e| AuthError::Storage(format!("failed to serialize credentials: {e}")))?;

        let nonce_bytes: [u8; 12] = rand::thread_rng().gen();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
            .map_err(|e| AuthError::Storage(format!("encryption failed: {e}")))?;

        let envelope = EncryptedEnvelope {
            version: FILE_FORMAT_VERSION,
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        };
        let content = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| AuthError::Storage(format!("failed to serialize envelope: {e}")))?;

        write_private(&self.path, &content)
            .await
            .map_err(|e| AuthError::Storage(format!("failed to write {}: {e}", self.path.display())))
    }

    /// Load for mutation: an unreadable file is replaced rather than
    /// blocking every future write.
    async fn load_for_update(&self) -> HashMap<String, String> {
        self.load().await.unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "discarding unreadable credential file");
            HashMap::new()
        })
    }
}

#[async_trait]
impl SecretStorage for EncryptedFileStorage {
    async fn get(&self, key: &str) -> Option<String> {
        match self.load().await {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file unreadable");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load_for_update().await;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        let mut values = self.load_for_update().await;
        if values.remove(key).is_none() {
            return Ok(());
        }
        self.save(&values).await
    }

    fn backend(&self) -> Backend {
        Backend::EncryptedFile
    }
}

/// Secret store that prefers the OS vault and falls back to an encrypted file
///
/// The vault is checked once, when the store is built; the chosen
/// [`Backend`] never changes for the life of the value.
pub struct SecretStore {
    backend: Backend,
    vault: Option<Box<dyn SecretStorage>>,
    file: EncryptedFileStorage,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("backend", &self.backend)
            .field("file", &self.file)
            .finish()
    }
}

impl SecretStore {
    /// Check the OS vault for `service` and open the fallback file at `fallback_path`
    pub async fn new(service: &str, fallback_path: PathBuf) -> Self {
        let file = EncryptedFileStorage::with_path(fallback_path, service);
        Self::detect(KeyringStorage::new(service), file).await
    }

    /// Open the store at the default fallback location for `app_name`
    pub async fn open(app_name: &str) -> Result<Self> {
        Ok(Self::new(app_name, default_credentials_path(app_name)?).await)
    }

    /// Check `vault` once; keep it in front of `file` only if it answers
    pub async fn detect<V: SecretStorage + 'static>(vault: V, file: EncryptedFileStorage) -> Self {
        if vault.probe().await {
            info!(backend = %Backend::Vault, "secret store ready");
            Self {
                backend: Backend::Vault,
                vault: Some(Box::new(vault)),
                file,
            }
        } else {
            info!(
                backend = %Backend::EncryptedFile,
                path = %file.path().display(),
                "OS credential vault unavailable, using encrypted file"
            );
            Self::file_only(file)
        }
    }

    /// Store that skips the vault entirely
    pub fn file_only(file: EncryptedFileStorage) -> Self {
        Self {
            backend: Backend::EncryptedFile,
            vault: None,
            file,
        }
    }
}

#[async_trait]
impl SecretStorage for SecretStore {
    async fn get(&self, key: &str) -> Option<String> {
        if let Some(vault) = &self.vault {
            if let Some(value) = vault.get(key).await {
                return Some(value);
            }
        }
        self.file.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(vault) = &self.vault {
            match vault.set(key, value).await {
                Ok(()) => {
                    // Drop any stale copy written while the vault was failing.
                    if let Err(e) = self.file.delete(key).await {
                        debug!(error = %e, "could not clear fallback copy");
                    }
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "vault write failed, writing encrypted file"),
            }
        }

        self.file.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let vault_result = match &self.vault {
            Some(vault) => vault.delete(key).await,
            None => Ok(()),
        };
        let file_result = self.file.delete(key).await;
        vault_result.and(file_result)
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

/// Default location of the encrypted credential file
pub fn default_credentials_path(app_name: &str) -> Result<PathBuf> {
    credentials_path_from(|name| std::env::var(name).ok(), app_name)
}

pub(crate) fn credentials_path_from(
    lookup: impl Fn(&str) -> Option<String>,
    app_name: &str,
) -> Result<PathBuf> {
    let base_dir = match lookup("XDG_DATA_HOME").filter(|dir| !dir.is_empty()) {
        Some(xdg_data) => PathBuf::from(xdg_data),
        None => dirs::data_dir()
            .ok_or_else(|| AuthError::Storage("could not determine data directory".into()))?,
    };

    Ok(base_dir.join(app_name).join("credentials.enc"))
}

/// Derive the file key from the application secret and local identity.
fn machine_key(app_name: &str) -> [u8; 32] {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let home = dirs::home_dir().unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(FILE_KEY_CONTEXT);
    hasher.update(app_name.as_bytes());
    hasher.update([0]);
    hasher.update(user.as_bytes());
    hasher.update([0]);
    hasher.update(home.to_string_lossy().as_bytes());
    hasher.finalize().into()
}

async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // The mode only applies on creation, so a leftover temp file is removed first.
    let tmp = path.with_extension("enc.tmp");
    match tokio::fs::remove_file(&tmp).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&tmp).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn temp_file_storage() -> (tempfile::TempDir, EncryptedFileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = EncryptedFileStorage::with_path(dir.path().join("credentials.enc"), "test");
        (dir, storage)
    }

    #[tokio::test]
    async fn test_memory_storage_operations() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.get("k").await, None);
        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.get("k").await.as_deref(), Some("v"));

        storage.delete("k").await.unwrap();
        storage.delete("k").await.unwrap();
        assert_eq!(storage.get("k").await, None);
    }

    #[tokio::test]
    async fn test_encrypted_file_round_trip() {
        let (_dir, storage) = temp_file_storage();

        storage.set("token", "secret-value").await.unwrap();
        storage.set("other", "x").await.unwrap();

        assert_eq!(storage.get("token").await.as_deref(), Some("secret-value"));
        assert_eq!(storage.get("other").await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_encrypted_file_is_not_plaintext() {
        let (_dir, storage) = temp_file_storage();
        storage.set("token", "very-secret-value").await.unwrap();

        let raw = std::fs::read_to_string(storage.path()).unwrap();
        assert!(!raw.contains("very-secret-value"));
        assert!(raw.contains("\"version\": 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encrypted_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, storage) = temp_file_storage();
        storage.set("token", "v").await.unwrap();

        let mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_wrong_key_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.enc");

        EncryptedFileStorage::with_key(path.clone(), [1; 32])
            .set("token", "v")
            .await
            .unwrap();

        let other = EncryptedFileStorage::with_key(path, [2; 32]);
        assert_eq!(other.get("token").await, None);

        // A write with the new key replaces the unreadable file
        other.set("token", "w").await.unwrap();
        assert_eq!(other.get("token").await.as_deref(), Some("w"));
    }

    #[tokio::test]
    async fn test_tampered_file_reads_as_absent() {
        let (_dir, storage) = temp_file_storage();
        storage.set("token", "v").await.unwrap();

        std::fs::write(storage.path(), b"{not json").unwrap();
        assert_eq!(storage.get("token").await, None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_without_file() {
        let (_dir, storage) = temp_file_storage();
        storage.delete("token").await.unwrap();
        storage.delete("token").await.unwrap();
        assert!(!storage.path().exists());
    }

    #[tokio::test]
    async fn test_set_fails_when_directory_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let storage = EncryptedFileStorage::with_path(blocker.join("credentials.enc"), "test");
        let err = storage.set("token", "v").await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert_eq!(storage.get("token").await, None);
    }

    #[tokio::test]
    async fn test_file_only_store_reports_backend() {
        let (_dir, file) = temp_file_storage();
        let store = SecretStore::file_only(file);

        assert_eq!(store.backend(), Backend::EncryptedFile);
        store.set("token", "v").await.unwrap();
        assert_eq!(store.get("token").await.as_deref(), Some("v"));
        store.delete("token").await.unwrap();
        assert_eq!(store.get("token").await, None);
    }

    #[test]
    fn test_machine_key_depends_on_app() {
        assert_ne!(machine_key("a"), machine_key("b"));
        assert_eq!(machine_key("a"), machine_key("a"));
    }

    #[test]
    fn test_xdg_data_home_respected() {
        let path = credentials_path_from(
            |name| (name == "XDG_DATA_HOME").then(|| "/tmp/xdg-data".to_string()),
            "test-app",
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/tmp/xdg-data").join("test-app").join("credentials.enc")
        );
    }

    #[test]
    fn test_empty_xdg_data_home_is_ignored() {
        let path = credentials_path_from(|_| Some(String::new()), "test-app");
        match dirs::data_dir() {
            Some(data) => assert_eq!(
                path.unwrap(),
                data.join("test-app").join("credentials.enc")
            ),
            None => assert!(matches!(path, Err(AuthError::Storage(_)))),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_leftover_temp_file_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, storage) = temp_file_storage();
        let tmp = storage.path().with_extension("enc.tmp");
        std::fs::write(&tmp, b"stale").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        storage.set("token", "v").await.unwrap();

        assert!(!tmp.exists());
        let mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(storage.get("token").await.as_deref(), Some("v"));
    }

    /// Vault double whose writes can be made to fail
    #[derive(Clone, Default)]
    struct FakeVault {
        values: MemoryStorage,
        unavailable: bool,
        fail_writes: Arc<AtomicBool>,
        checks: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SecretStorage for FakeVault {
        async fn get(&self, key: &str) -> Option<String> {
            self.values.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AuthError::Storage("vault locked".into()));
            }
            self.values.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.delete(key).await
        }

        fn backend(&self) -> Backend {
            Backend::Vault
        }

        async fn probe(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            !self.unavailable
        }
    }

    /// Store plus a second handle on the same fallback file
    async fn store_with(
        vault: FakeVault,
    ) -> (tempfile::TempDir, SecretStore, EncryptedFileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.enc");
        let file = EncryptedFileStorage::with_key(path.clone(), [7; 32]);
        let store = SecretStore::detect(vault, file).await;
        (dir, store, EncryptedFileStorage::with_key(path, [7; 32]))
    }

    #[tokio::test]
    async fn test_vault_write_failure_falls_back_to_file() {
        let vault = FakeVault::default();
        vault.fail_writes.store(true, Ordering::SeqCst);
        let (_dir, store, file) = store_with(vault.clone()).await;

        store.set("token", "v1").await.unwrap();

        assert_eq!(store.backend(), Backend::Vault);
        assert_eq!(vault.values.get("token").await, None);
        assert_eq!(file.get("token").await.as_deref(), Some("v1"));
        // A vault miss is answered from the file.
        assert_eq!(store.get("token").await.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_vault_write_clears_stale_file_copy() {
        let vault = FakeVault::default();
        vault.fail_writes.store(true, Ordering::SeqCst);
        let (_dir, store, file) = store_with(vault.clone()).await;
        store.set("token", "old").await.unwrap();

        vault.fail_writes.store(false, Ordering::SeqCst);
        store.set("token", "new").await.unwrap();

        assert_eq!(vault.values.get("token").await.as_deref(), Some("new"));
        assert_eq!(file.get("token").await, None);
        assert_eq!(store.get("token").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_vault_checked_once_per_store() {
        let vault = FakeVault::default();
        vault.fail_writes.store(true, Ordering::SeqCst);
        let (_dir, store, _file) = store_with(vault.clone()).await;

        for _ in 0..3 {
            store.set("token", "v").await.unwrap();
            store.get("token").await;
        }
        store.delete("token").await.unwrap();

        assert_eq!(vault.checks.load(Ordering::SeqCst), 1);
        assert_eq!(store.backend(), Backend::Vault);
    }

    #[tokio::test]
    async fn test_unavailable_vault_is_never_used() {
        let vault = FakeVault {
            unavailable: true,
            ..FakeVault::default()
        };
        let (_dir, store, file) = store_with(vault.clone()).await;

        store.set("token", "v").await.unwrap();

        assert_eq!(store.backend(), Backend::EncryptedFile);
        assert_eq!(vault.writes.load(Ordering::SeqCst), 0);
        assert_eq!(file.get("token").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_delete_clears_both_backends() {
        let vault = FakeVault::default();
        let (_dir, store, file) = store_with(vault.clone()).await;
        vault.values.set("token", "in-vault").await.unwrap();
        file.set("token", "in-file").await.unwrap();

        store.delete("token").await.unwrap();
        store.delete("token").await.unwrap();

        assert_eq!(vault.values.get("token").await, None);
        assert_eq!(file.get("token").await, None);
    }
}
