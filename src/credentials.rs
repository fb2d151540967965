use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};


/// Source of the Testpad API key. Injected into the transport so tests can
/// use a throwaway in-memory key.
pub trait CredentialProvider: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, key: &str);
    fn clear(&self);
}

#[derive(Serialize, Deserialize, Default)]
pub struct StoredCredentials {
    pub api_key: Option<String>,
}

pub fn load_credentials(path: &Path) -> StoredCredentials {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => StoredCredentials::default(),
    }
}

pub fn save_credentials(path: &Path, credentials: &StoredCredentials) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create credentials dir {:?}: {}", parent, e);
            return;
        }
    }
    match serde_json::to_string_pretty(credentials) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save credentials to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize credentials: {}", e);
        }
    }
}

/// API key with a session cache in front of an optional JSON file.
///
/// The file is read lazily on first `get` and rewritten on every `set` or
/// `clear`, so a restarted process picks up where the last one left off.
pub struct CredentialStore {
    path: Option<PathBuf>,
    cached: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn persistent(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            cached: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            cached: RwLock::new(None),
        }
    }

    pub fn with_key(key: &str) -> Self {
        let store = Self::in_memory();
        store.set(key);
        store
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_some()
    }
}

impl CredentialProvider for CredentialStore {
    fn get(&self) -> Option<String> {
        if let Ok(cached) = self.cached.read() {
            if cached.is_some() {
                return cached.clone();
            }
        }
        let path = self.path.as_ref()?;
        let key = load_credentials(path)
            .api_key
            .filter(|k| !k.trim().is_empty())?;
        debug!("Loaded API key from {:?}", path);
        if let Ok(mut cached) = self.cached.write() {
            *cached = Some(key.clone());
        }
        Some(key)
    }

    fn set(&self, key: &str) {
        let key = key.trim().to_string();
        if let Ok(mut cached) = self.cached.write() {
            *cached = Some(key.clone());
        }
        if let Some(path) = &self.path {
            save_credentials(path, &StoredCredentials { api_key: Some(key) });
        }
    }

    fn clear(&self) {
        if let Ok(mut cached) = self.cached.write() {
            *cached = None;
        }
        if let Some(path) = &self.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove credentials file {:?}: {}", path, e);
                }
            }
        }
    }
}
