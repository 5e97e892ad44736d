//! Vendora storefront client SDK.
//!
//! The client-side orchestration layer of the Vendora marketplace: it
//! mediates between an interactive UI and the remote commerce backend,
//! keeping "who is signed in", "what is in the cart", and "what happened
//! during checkout" consistent across asynchronous, possibly failing
//! network calls.
//!
//! # Architecture
//!
//! - [`http::Gateway`] - single HTTP entry point; attaches the bearer
//!   credential and recovers from credential expiry exactly once per
//!   request, with concurrent refreshes coalesced into one.
//! - [`session::SessionStore`] - identity lifecycle: login, register,
//!   profile refresh, logout, and startup hydration from the persisted
//!   record.
//! - [`cart::CartSynchronizer`] - mirror of the server-owned cart; every
//!   mutation returns the authoritative cart, which replaces local state
//!   ("replace, don't merge").
//! - [`checkout::CheckoutOrchestrator`] - order placement, cash/online
//!   payment branching, and idempotent payment verification on return.
//!
//! All components share one [`auth::AuthHandle`] injected explicitly - no
//! ambient globals - so session teardown is observed everywhere at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use vendora_client::{ClientConfig, Marketplace};
//!
//! let config = ClientConfig::from_env()?;
//! let marketplace = Marketplace::new(config)?;
//!
//! marketplace.hydrate().await?;
//! marketplace.session().login("ada@example.com", "secret").await?;
//! marketplace.cart().add("p-1".into(), 2, None).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod http;
pub mod persist;
pub mod session;
pub mod types;

pub use auth::{AuthHandle, SessionState};
pub use cart::CartSynchronizer;
pub use checkout::{
    CheckoutOrchestrator, CheckoutOutcome, CheckoutState, PaymentReturn, Totals,
    VerificationStatus, compute_totals, validate_shipping,
};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result, ValidationErrors};
pub use http::Gateway;
pub use persist::{CredentialStore, FileCredentialStore, MemoryCredentialStore, PersistedAuth};
pub use session::SessionStore;
pub use types::{
    Cart, CartItem, Order, ProfileUpdate, RegisterDetails, ShippingAddress, UserProfile,
};

/// The wired component graph: one of everything, sharing one auth handle.
pub struct Marketplace {
    auth: AuthHandle,
    session: SessionStore,
    cart: CartSynchronizer,
    checkout: CheckoutOrchestrator,
}

impl Marketplace {
    /// Wire up the full client for `config`.
    ///
    /// Persistence goes to `config.auth_file` when set, otherwise stays in
    /// memory. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let store: Box<dyn CredentialStore> = match &config.auth_file {
            Some(path) => Box::new(FileCredentialStore::new(path.clone())),
            None => Box::new(MemoryCredentialStore::default()),
        };
        Self::with_store(config, store)
    }

    /// Wire up the client with an explicit credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_store(config: ClientConfig, store: Box<dyn CredentialStore>) -> Result<Self> {
        let auth = AuthHandle::new(store);
        let gateway = Gateway::new(&config, auth.clone())?;
        let session = SessionStore::new(gateway.clone(), auth.clone());
        let cart = CartSynchronizer::new(gateway.clone(), auth.clone());
        let checkout = CheckoutOrchestrator::new(gateway, cart.clone(), &auth, config.delivery_fee);

        Ok(Self {
            auth,
            session,
            cart,
            checkout,
        })
    }

    /// Session operations.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Cart operations.
    #[must_use]
    pub const fn cart(&self) -> &CartSynchronizer {
        &self.cart
    }

    /// Checkout operations.
    #[must_use]
    pub const fn checkout(&self) -> &CheckoutOrchestrator {
        &self.checkout
    }

    /// The shared auth handle (for subscribing to session transitions).
    #[must_use]
    pub const fn auth(&self) -> &AuthHandle {
        &self.auth
    }

    /// Attempt startup hydration from the persisted credential record.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::hydrate`].
    pub async fn hydrate(&self) -> Result<Option<UserProfile>> {
        self.session.hydrate().await
    }
}
