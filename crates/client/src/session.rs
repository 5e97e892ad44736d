//! Session store: login, register, profile, logout.
//!
//! All network traffic goes through the injected [`Gateway`]; session state
//! lives in the shared [`AuthHandle`] so the gateway and the cart observe
//! the same lifecycle.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::auth::AuthHandle;
use crate::error::{ClientError, Result};
use crate::http::Gateway;
use crate::types::{AuthPayload, LoginRequest, ProfileUpdate, RegisterDetails, UserProfile};

/// Operations on the authenticated identity.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    gateway: Gateway,
    auth: AuthHandle,
}

impl SessionStore {
    #[must_use]
    pub fn new(gateway: Gateway, auth: AuthHandle) -> Self {
        Self {
            inner: Arc::new(SessionInner { gateway, auth }),
        }
    }

    /// Identity of the signed-in user, if any.
    #[must_use]
    pub fn current(&self) -> Option<UserProfile> {
        self.inner.auth.current_user()
    }

    /// Whether a session exists.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.is_authenticated()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidCredentials`] on rejection; network/server
    /// errors propagate unchanged.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let payload: AuthPayload = self
            .inner
            .gateway
            .post("/auth/login", &request)
            .await
            .map_err(reject_credentials)?;

        self.install(payload)
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::login`]; duplicate accounts surface as
    /// [`ClientError::BusinessRule`] with the backend message.
    #[instrument(skip(self, details), fields(email = %details.email))]
    pub async fn register(&self, details: &RegisterDetails) -> Result<UserProfile> {
        let payload: AuthPayload = self
            .inner
            .gateway
            .post("/auth/register", details)
            .await
            .map_err(reject_credentials)?;

        self.install(payload)
    }

    /// Re-fetch the identity with the current credential.
    ///
    /// Used at startup to validate a persisted credential and after
    /// profile-mutating operations so dependent views see fresh data.
    ///
    /// # Errors
    ///
    /// [`ClientError::SessionExpired`] if the credential is no longer valid;
    /// the store clears itself in that case.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<UserProfile> {
        if !self.inner.auth.is_authenticated() {
            return Err(ClientError::SessionExpired);
        }

        match self.inner.gateway.get::<UserProfile>("/auth/profile").await {
            Ok(user) => {
                self.inner.auth.update_user(user.clone());
                Ok(user)
            }
            Err(ClientError::AuthExpired | ClientError::Unauthorized(_)) => {
                self.inner.auth.clear();
                Err(ClientError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Update the profile, then store the returned identity.
    ///
    /// # Errors
    ///
    /// Same expiry contract as [`Self::refresh_profile`].
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        match self
            .inner
            .gateway
            .put::<UserProfile, _>("/auth/profile", update)
            .await
        {
            Ok(user) => {
                self.inner.auth.update_user(user.clone());
                Ok(user)
            }
            Err(ClientError::AuthExpired | ClientError::Unauthorized(_)) => {
                self.inner.auth.clear();
                Err(ClientError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Restore a session from the persisted record, if one exists.
    ///
    /// Installs the persisted credential and identity snapshot, then
    /// validates them via [`Self::refresh_profile`]. An expired record is
    /// cleared and reported as `Ok(None)` rather than an error - startup has
    /// no user-visible failure channel.
    ///
    /// # Errors
    ///
    /// Network and server failures during validation propagate; the
    /// persisted record is kept for the next attempt.
    pub async fn hydrate(&self) -> Result<Option<UserProfile>> {
        let Some(persisted) = self.inner.auth.load_persisted() else {
            return Ok(None);
        };

        self.inner.auth.install(persisted.user, &persisted.token);
        match self.refresh_profile().await {
            Ok(user) => Ok(Some(user)),
            Err(ClientError::SessionExpired | ClientError::AuthExpired) => {
                debug!("persisted credential no longer valid");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Sign out. The server is notified best-effort; local state is cleared
    /// unconditionally, even when that call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if self.inner.auth.is_authenticated()
            && let Err(e) = self.inner.gateway.post_unit("/auth/logout").await
        {
            debug!(error = %e, "server logout failed, clearing local session anyway");
        }
        self.inner.auth.clear();
    }

    fn install(&self, payload: AuthPayload) -> Result<UserProfile> {
        self.inner
            .auth
            .install(payload.user.clone(), &payload.token);
        Ok(payload.user)
    }
}

/// Login/register map an unauthorized response to `InvalidCredentials`.
fn reject_credentials(e: ClientError) -> ClientError {
    match e {
        ClientError::Unauthorized(_) => ClientError::InvalidCredentials,
        other => other,
    }
}
