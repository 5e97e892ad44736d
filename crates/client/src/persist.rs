//! Credential persistence.
//!
//! A single small key-value record (credential + last-known identity
//! snapshot) survives restarts so the client can attempt profile hydration at
//! startup. Saving and clearing are best-effort: a failing disk must never
//! break an in-memory session, so failures are logged and swallowed here.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::UserProfile;

/// The persisted record: just enough to survive a restart.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedAuth {
    /// Bearer credential as last seen. Revalidated via profile hydration
    /// before the identity is trusted.
    pub token: String,
    /// Last-known identity snapshot.
    pub user: UserProfile,
}

impl std::fmt::Debug for PersistedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedAuth")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Storage for the persisted auth record.
pub trait CredentialStore: Send + Sync + 'static {
    /// Read the record, if one was saved.
    fn load(&self) -> Option<PersistedAuth>;
    /// Save the record, replacing any previous one.
    fn save(&self, auth: &PersistedAuth);
    /// Remove the record.
    fn clear(&self);
}

/// JSON-file-backed store; the usual choice for a long-lived client.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<PersistedAuth> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(auth) => Some(auth),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable auth record");
                None
            }
        }
    }

    fn save(&self, auth: &PersistedAuth) {
        let result = serde_json::to_vec(auth)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&self.path, bytes));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to persist auth record");
        }
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove auth record");
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<PersistedAuth>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<PersistedAuth> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn save(&self, auth: &PersistedAuth) {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(auth.clone());
    }

    fn clear(&self) {
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}
