use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Logical key the session token is stored under
pub const TOKEN_KEY: &str = "token";

/// Keychain service name
const SERVICE_NAME: &str = "fetchgate";

/// Token file name in cache directory
const TOKEN_FILE: &str = "token.json";

/// Durable medium behind the credential store.
pub trait TokenBackend: Send {
    /// Read the persisted token, if any
    fn load(&self) -> Result<Option<String>>;

    /// Persist `token`, replacing any previous value
    fn save(&mut self, token: &str) -> Result<()>;

    /// Remove the persisted token. Removing an absent token succeeds.
    fn remove(&mut self) -> Result<()>;
}

// ============================================================================
// File backend
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenRecord {
    token: String,
    saved_at: DateTime<Utc>,
}

/// Stores the token as JSON in the cache directory.
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn token_path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }
}

impl TokenBackend for FileBackend {
    fn load(&self) -> Result<Option<String>> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read token file")?;
        match serde_json::from_str::<TokenRecord>(&contents) {
            Ok(record) => {
                debug!(saved_at = %record.saved_at, "Token loaded from file");
                Ok(Some(record.token))
            }
            Err(e) => {
                // Unreadable contents are no session; the next set/clear rewrites the file
                warn!(error = %e, path = %path.display(), "Ignoring corrupt token file");
                Ok(None)
            }
        }
    }

    fn save(&mut self, token: &str) -> Result<()> {
        let path = self.token_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let record = TokenRecord {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&record)?;
        std::fs::write(path, contents).context("Failed to write token file")?;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        let path = self.token_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

// ============================================================================
// Keychain backend
// ============================================================================

/// Stores the token in the OS keychain.
pub struct KeyringBackend {
    entry: Entry,
}

impl KeyringBackend {
    pub fn new() -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_KEY).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl TokenBackend for KeyringBackend {
    fn load(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn save(&mut self, token: &str) -> Result<()> {
        self.entry
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn remove(&mut self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Keeps the token in memory. Clones share the same slot, which stands in
/// for a medium that outlives any single store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned slot still holds a valid Option
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.lock().clone())
    }

    fn save(&mut self, token: &str) -> Result<()> {
        *self.lock() = Some(token.to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Credential store
// ============================================================================

/// The single session-token slot.
///
/// The persisted value is read once by [`init`](Self::init); afterwards
/// `get` answers from memory and only `set`/`clear` write through to the
/// backend.
pub struct CredentialStore {
    backend: Box<dyn TokenBackend>,
    token: Option<String>,
}

impl CredentialStore {
    /// Open the store, reading whatever token the backend has persisted
    pub fn init(backend: Box<dyn TokenBackend>) -> Result<Self> {
        let token = backend.load()?;
        debug!(present = token.is_some(), "Credential store initialized");
        Ok(Self { backend, token })
    }

    /// Persist `token`, overwriting any existing value
    pub fn set(&mut self, token: &str) -> Result<()> {
        self.backend.save(token)?;
        self.token = Some(token.to_string());
        info!("Session token stored");
        Ok(())
    }

    /// The current token. An empty string counts as absent.
    pub fn get(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    /// Remove the token. Clearing an absent token is a no-op.
    pub fn clear(&mut self) -> Result<()> {
        if self.token.is_none() {
            debug!("Session token already absent");
        }
        self.backend.remove()?;
        self.token = None;
        info!("Session token cleared");
        Ok(())
    }
}
