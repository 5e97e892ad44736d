//! Shared session state.
//!
//! One `AuthHandle` is created per client and injected explicitly into the
//! gateway, session store, cart, and checkout - there is no ambient global.
//! Collaborators observe either no session or a fully-populated one, never a
//! partial in-between: the slot holds a complete [`Session`] or nothing.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::debug;

use vendora_core::UserId;

use crate::persist::{CredentialStore, PersistedAuth};
use crate::types::UserProfile;

/// Bearer credential for the current session.
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    obtained_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            obtained_at: Utc::now(),
        }
    }

    /// The raw token, for attaching to a request or persisting.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// When this credential was obtained.
    #[must_use]
    pub const fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// A fully-populated session: identity plus credential, always together.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserProfile,
    pub credential: Credential,
}

/// Broadcast session-lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn(UserId),
}

struct AuthInner {
    session: RwLock<Option<Session>>,
    events: watch::Sender<SessionState>,
    store: Box<dyn CredentialStore>,
}

/// Handle to the shared session state.
#[derive(Clone)]
pub struct AuthHandle {
    inner: Arc<AuthInner>,
}

impl AuthHandle {
    /// Create an empty (signed-out) handle backed by `store`.
    #[must_use]
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        let (events, _) = watch::channel(SessionState::SignedOut);
        Self {
            inner: Arc::new(AuthInner {
                session: RwLock::new(None),
                events,
                store,
            }),
        }
    }

    /// Subscribe to session-lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.events.subscribe()
    }

    /// Identity of the signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    /// Current credential, if a session exists.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.read().as_ref().map(|s| s.credential.clone())
    }

    /// Whether a session exists.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Read the persisted record, if any. Called once at startup.
    #[must_use]
    pub fn load_persisted(&self) -> Option<PersistedAuth> {
        self.inner.store.load()
    }

    /// Install a complete session, persist it, and announce sign-in.
    pub fn install(&self, user: UserProfile, token: &str) {
        let session = Session {
            user: user.clone(),
            credential: Credential::new(token),
        };
        self.persist(&session);
        *self.write() = Some(session);
        self.inner
            .events
            .send_replace(SessionState::SignedIn(user.id));
    }

    /// Replace the identity snapshot, keeping the credential.
    ///
    /// No-op when signed out; a profile alone never forms a session.
    pub fn update_user(&self, user: UserProfile) {
        let mut guard = self.write();
        if let Some(session) = guard.as_mut() {
            session.user = user;
            let session = session.clone();
            drop(guard);
            self.persist(&session);
        }
    }

    /// Replace the credential, keeping the identity. Called by the gateway
    /// after a successful refresh, before the original request is replayed.
    pub fn rotate_credential(&self, token: &str) {
        let mut guard = self.write();
        if let Some(session) = guard.as_mut() {
            session.credential = Credential::new(token);
            let session = session.clone();
            drop(guard);
            self.persist(&session);
            debug!("session credential rotated");
        }
    }

    /// Tear the session down: clear memory and the persisted record, then
    /// announce sign-out. Never fails.
    pub fn clear(&self) {
        *self.write() = None;
        self.inner.store.clear();
        self.inner.events.send_replace(SessionState::SignedOut);
    }

    fn persist(&self, session: &Session) {
        self.inner.store.save(&PersistedAuth {
            token: session.credential.expose().to_string(),
            user: session.user.clone(),
        });
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
