//! Cart synchronizer: a local mirror of the server-owned cart.
//!
//! Consistency discipline: the server response is truth. Every mutating
//! operation is a single round trip whose returned cart replaces local state
//! atomically; there is no client-side merge and no destructive optimistic
//! update - a failed operation leaves the previous state untouched.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, instrument};

use vendora_core::{CartItemId, ProductId, VariantSelection};

use crate::auth::{AuthHandle, SessionState};
use crate::error::{ClientError, Result, ValidationErrors};
use crate::http::Gateway;
use crate::types::{AddToCartRequest, Cart, UpdateQuantityRequest};

/// Mirror of the server-owned cart for the current session.
#[derive(Clone)]
pub struct CartSynchronizer {
    inner: Arc<CartInner>,
}

struct CartInner {
    gateway: Gateway,
    auth: AuthHandle,
    cart: RwLock<Cart>,
}

impl CartSynchronizer {
    /// Create the synchronizer and subscribe it to session-lifecycle
    /// transitions: sign-out resets the mirror to empty without polling.
    ///
    /// Must be called within a Tokio runtime (the subscription is a task).
    #[must_use]
    pub fn new(gateway: Gateway, auth: AuthHandle) -> Self {
        let inner = Arc::new(CartInner {
            gateway,
            auth: auth.clone(),
            cart: RwLock::new(Cart::empty()),
        });

        let mut events = auth.subscribe();
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let state = events.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else { break };
                let stale = match &state {
                    SessionState::SignedOut => true,
                    // A sign-out immediately followed by a sign-in can
                    // coalesce into one observed transition; an owner
                    // mismatch still marks the mirror stale.
                    SessionState::SignedIn(user_id) => lock_read(&inner.cart)
                        .owner_id
                        .as_ref()
                        .is_some_and(|owner| owner != user_id),
                };
                if stale {
                    debug!("session changed, resetting cart mirror");
                    *lock_write(&inner.cart) = Cart::empty();
                }
            }
        });

        Self { inner }
    }

    /// The last-known cart. Empty whenever no session exists, or when the
    /// mirror still belongs to a previous session's user.
    #[must_use]
    pub fn current(&self) -> Cart {
        let Some(user) = self.inner.auth.current_user() else {
            return Cart::empty();
        };
        let cart = lock_read(&self.inner.cart).clone();
        match &cart.owner_id {
            Some(owner) if *owner != user.id => Cart::empty(),
            _ => cart,
        }
    }

    /// Item count of the last server response (never derived locally).
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.current().item_count
    }

    /// Retrieve the authoritative cart.
    ///
    /// Anonymous sessions get an empty cart with no network call issued.
    ///
    /// # Errors
    ///
    /// Gateway errors propagate; the local mirror is untouched on failure.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<Cart> {
        if !self.inner.auth.is_authenticated() {
            return Ok(Cart::empty());
        }
        let cart: Cart = self.inner.gateway.get("/cart").await?;
        Ok(self.replace(cart))
    }

    /// Add a product to the cart.
    ///
    /// # Errors
    ///
    /// Quantity `0` is rejected locally; see [`Self::fetch`] for the rest.
    #[instrument(skip(self, variant), fields(product = %product_id, quantity))]
    pub async fn add(
        &self,
        product_id: ProductId,
        quantity: u32,
        variant: Option<VariantSelection>,
    ) -> Result<Cart> {
        self.require_session()?;
        check_quantity(quantity)?;

        let request = AddToCartRequest {
            product_id,
            quantity,
            variant,
        };
        let cart: Cart = self.inner.gateway.post("/cart/add", &request).await?;
        Ok(self.replace(cart))
    }

    /// Set the quantity of an existing cart item.
    ///
    /// # Errors
    ///
    /// Quantity `0` is rejected locally - this layer never moves an item
    /// below one; removal is explicit.
    #[instrument(skip(self), fields(item = %item_id, quantity))]
    pub async fn update_quantity(&self, item_id: CartItemId, quantity: u32) -> Result<Cart> {
        self.require_session()?;
        check_quantity(quantity)?;

        let request = UpdateQuantityRequest { item_id, quantity };
        let cart: Cart = self.inner.gateway.put("/cart/update", &request).await?;
        Ok(self.replace(cart))
    }

    /// Remove an item from the cart.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch`].
    #[instrument(skip(self), fields(item = %item_id))]
    pub async fn remove(&self, item_id: &CartItemId) -> Result<Cart> {
        self.require_session()?;
        let cart: Cart = self
            .inner
            .gateway
            .delete(&format!("/cart/item/{item_id}"))
            .await?;
        Ok(self.replace(cart))
    }

    /// Empty the cart (used after a successful checkout).
    ///
    /// # Errors
    ///
    /// See [`Self::fetch`].
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<Cart> {
        self.require_session()?;
        let cart: Cart = self.inner.gateway.delete("/cart/clear").await?;
        Ok(self.replace(cart))
    }

    fn require_session(&self) -> Result<()> {
        if self.inner.auth.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::Unauthorized(
                "sign in to modify the cart".to_string(),
            ))
        }
    }

    /// Atomically replace the mirror with the server's cart.
    fn replace(&self, cart: Cart) -> Cart {
        *lock_write(&self.inner.cart) = cart.clone();
        cart
    }
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity >= 1 {
        Ok(())
    } else {
        let mut errors = ValidationErrors::default();
        errors.push("quantity", "quantity must be at least 1");
        errors.into_result()
    }
}

fn lock_read(lock: &RwLock<Cart>) -> std::sync::RwLockReadGuard<'_, Cart> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock_write(lock: &RwLock<Cart>) -> std::sync::RwLockWriteGuard<'_, Cart> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::persist::MemoryCredentialStore;
    use crate::types::{CartItem, UserProfile};
    use url::Url;
    use vendora_core::{Money, Role, UserId};

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Customer,
        }
    }

    fn mirror_for(owner: &str) -> Cart {
        Cart {
            owner_id: Some(UserId::new(owner)),
            items: vec![CartItem {
                id: CartItemId::new("ci-1"),
                product_id: ProductId::new("p-1"),
                name: "Wool scarf".to_string(),
                quantity: 1,
                unit_price: Money::from_major(50),
                discounted_unit_price: Money::from_major(45),
                variant: None,
            }],
            item_count: 1,
        }
    }

    fn synchronizer() -> (AuthHandle, CartSynchronizer) {
        let auth = AuthHandle::new(Box::new(MemoryCredentialStore::default()));
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").unwrap());
        let gateway = Gateway::new(&config, auth.clone()).unwrap();
        (auth.clone(), CartSynchronizer::new(gateway, auth))
    }

    #[tokio::test]
    async fn test_back_to_back_session_swap_hides_previous_mirror() {
        let (auth, cart) = synchronizer();
        auth.install(profile("u-a"), "tok-a");
        cart.replace(mirror_for("u-a"));
        assert_eq!(cart.item_count(), 1);

        // No await point between teardown and the next sign-in, so the
        // watch listener cannot have observed either transition yet.
        auth.clear();
        auth.install(profile("u-b"), "tok-b");
        assert!(cart.current().is_empty());
        assert_eq!(cart.item_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_out_empties_current_immediately() {
        let (auth, cart) = synchronizer();
        auth.install(profile("u-a"), "tok-a");
        cart.replace(mirror_for("u-a"));

        auth.clear();
        assert!(cart.current().is_empty());
    }

    #[test]
    fn test_zero_quantity_rejected_locally() {
        let err = check_quantity(0).unwrap_err();
        let ClientError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields()[0].field, "quantity");
    }

    #[test]
    fn test_positive_quantities_pass() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(99).is_ok());
    }
}
