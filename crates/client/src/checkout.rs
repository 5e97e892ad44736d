//! Checkout orchestrator: cart + shipping form in, order + payment outcome
//! out.
//!
//! The flow is a small state machine: `Idle → Validating → PlacingOrder`,
//! branching into an immediate cash confirmation or an external payment
//! redirect, with a separate re-entry path (`Returned → Verifying`) when the
//! hosted payment page sends the user back. Totals are computed by a pure
//! function and are exactly reproducible in decimal arithmetic.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use vendora_core::{Money, OrderId, PaymentMethod, PaymentSessionId};

use crate::auth::AuthHandle;
use crate::cart::CartSynchronizer;
use crate::error::{ClientError, Result, ValidationErrors};
use crate::http::Gateway;
use crate::types::{
    CartItem, CheckoutSessionRequest, Order, PaymentSessionInfo, PlaceOrderRequest,
    ShippingAddress, VerifyPayload, VerifySessionRequest,
};

/// Discount applied to a session's first-ever order: 20% of the discounted
/// subtotal.
fn first_order_rate() -> Decimal {
    Decimal::new(2, 1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Pure pieces: validation and totals
// ─────────────────────────────────────────────────────────────────────────────

/// Check the shipping form locally, before any network call.
///
/// # Errors
///
/// Field-level errors for every violated rule; an order is never placed
/// while any field fails.
pub fn validate_shipping(address: &ShippingAddress) -> std::result::Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if address.full_name.trim().chars().count() < 3 {
        errors.push("fullName", "enter the recipient's full name");
    }
    if address.street.trim().chars().count() < 5 {
        errors.push("street", "street address is too short");
    }
    if address.city.trim().is_empty() {
        errors.push("city", "city is required");
    }
    let digits = address.phone.chars().filter(char::is_ascii_digit).count();
    if digits < 10 {
        errors.push("phone", "phone number needs at least 10 digits");
    }
    let postal = address.postal_code.trim();
    if !(4..=6).contains(&postal.chars().count())
        || !postal.chars().all(|c| c.is_ascii_digit())
    {
        errors.push("postalCode", "postal code must be 4-6 digits");
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// The order's money breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Money,
    pub item_discount: Money,
    pub first_order_discount: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

/// Compute order totals. Pure and exact:
///
/// - `subtotal = Σ unit_price · qty`
/// - `item_discount = Σ (unit_price − discounted_unit_price) · qty`
/// - `first_order_discount = 20% of (subtotal − item_discount)` when this is
///   the session's first order, else zero
/// - `delivery_fee` applies to any non-empty order
/// - `total = subtotal − item_discount − first_order_discount + delivery_fee`
#[must_use]
pub fn compute_totals(items: &[CartItem], is_first_order: bool, delivery_fee: Money) -> Totals {
    let subtotal: Money = items.iter().map(|i| i.unit_price * i.quantity).sum();
    let item_discount: Money = items
        .iter()
        .map(|i| (i.unit_price - i.discounted_unit_price) * i.quantity)
        .sum();

    let first_order_discount = if is_first_order {
        (subtotal - item_discount).scaled_by(first_order_rate())
    } else {
        Money::ZERO
    };

    let delivery_fee = if subtotal.is_zero() {
        Money::ZERO
    } else {
        delivery_fee
    };

    Totals {
        subtotal,
        item_discount,
        first_order_discount,
        delivery_fee,
        total: subtotal - item_discount - first_order_discount + delivery_fee,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

/// Observable checkout state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    Validating,
    PlacingOrder,
    /// Cash-on-delivery order confirmed; terminal.
    CashConfirmed { order_id: OrderId },
    /// Order placed but no payment session yet (creation failed); the user
    /// retries payment later from order history.
    AwaitingExternalPayment { order_id: OrderId },
    /// Control is leaving the application for the hosted payment page.
    Redirecting { order_id: OrderId, url: String },
    Verifying { session_id: PaymentSessionId },
    Verified { order_id: OrderId },
    VerificationFailed { order_id: OrderId },
}

/// What a submitted checkout produced.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Order confirmed, payment due on delivery.
    CashConfirmed { order: Order },
    /// Order placed and payment session created; navigate to `url`.
    RedirectToPayment { order_id: OrderId, url: String },
    /// Order committed but the payment session could not be created. Not an
    /// error: the order exists and payment can be retried later.
    PaymentSessionFailed { order_id: OrderId, message: String },
}

/// Parsed return from the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentReturn {
    Completed {
        session_id: PaymentSessionId,
        order_id: OrderId,
    },
    Cancelled {
        order_id: Option<OrderId>,
    },
}

impl PaymentReturn {
    /// Interpret the checkout-success query parameters: an external session
    /// identifier plus the order id, or the cancellation sentinel.
    #[must_use]
    pub fn from_query(
        session_id: Option<&str>,
        order_id: Option<&str>,
        cancelled: bool,
    ) -> Option<Self> {
        if cancelled {
            return Some(Self::Cancelled {
                order_id: order_id.map(OrderId::from),
            });
        }
        match (session_id, order_id) {
            (Some(session), Some(order)) => Some(Self::Completed {
                session_id: PaymentSessionId::from(session),
                order_id: OrderId::from(order),
            }),
            _ => None,
        }
    }
}

/// Terminal status surfaced after a payment return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified { message: String },
    Failed { message: String },
    /// User cancelled on the payment page; the order stays pre-payment.
    Cancelled { message: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives a cart through order placement and payment.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<CheckoutInner>,
}

struct CheckoutInner {
    gateway: Gateway,
    cart: CartSynchronizer,
    delivery_fee: Money,
    state: RwLock<CheckoutState>,
    /// Per-checkout-session cache of "has this user ordered before".
    first_order: Mutex<Option<bool>>,
    /// Verification outcomes keyed by external session id; repeat returns
    /// replay the recorded status without another network call.
    verified: Mutex<HashMap<PaymentSessionId, VerificationStatus>>,
}

impl CheckoutOrchestrator {
    /// Create the orchestrator and subscribe it to session-lifecycle
    /// transitions: any sign-out or sign-in resets the per-session caches,
    /// so one user's first-order answer or checkout state never leaks into
    /// the next session.
    ///
    /// Must be called within a Tokio runtime (the subscription is a task).
    #[must_use]
    pub fn new(
        gateway: Gateway,
        cart: CartSynchronizer,
        auth: &AuthHandle,
        delivery_fee: Money,
    ) -> Self {
        let inner = Arc::new(CheckoutInner {
            gateway,
            cart,
            delivery_fee,
            state: RwLock::new(CheckoutState::Idle),
            first_order: Mutex::new(None),
            verified: Mutex::new(HashMap::new()),
        });

        let mut events = auth.subscribe();
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while events.changed().await.is_ok() {
                let _ = events.borrow_and_update();
                let Some(inner) = weak.upgrade() else { break };
                debug!("session changed, resetting checkout caches");
                *inner
                    .state
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = CheckoutState::Idle;
                inner.verified.lock().await.clear();
                *inner.first_order.lock().await = None;
            }
        });

        Self { inner }
    }

    /// Current state of the checkout machine.
    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a fresh checkout session: state back to `Idle`, first-order
    /// answer re-queried on next use.
    pub async fn begin(&self) {
        *self.inner.first_order.lock().await = None;
        self.set_state(CheckoutState::Idle);
    }

    /// Whether the user has never completed an order. Queried once per
    /// checkout session and cached; flips to `false` immediately after the
    /// first successful placement.
    ///
    /// # Errors
    ///
    /// Propagates the order-history query failure.
    pub async fn is_first_order(&self) -> Result<bool> {
        let mut cached = self.inner.first_order.lock().await;
        if let Some(answer) = *cached {
            return Ok(answer);
        }
        let history: Vec<Order> = self.inner.gateway.get("/orders").await?;
        let answer = history.is_empty();
        *cached = Some(answer);
        Ok(answer)
    }

    /// Totals the current cart would produce, for display before submission.
    ///
    /// # Errors
    ///
    /// Propagates the first-order query failure.
    pub async fn preview_totals(&self) -> Result<Totals> {
        let is_first = self.is_first_order().await?;
        let cart = self.inner.cart.current();
        Ok(compute_totals(&cart.items, is_first, self.inner.delivery_fee))
    }

    /// The user's order history, newest-first as served by the backend.
    ///
    /// # Errors
    ///
    /// Gateway errors propagate.
    pub async fn order_history(&self) -> Result<Vec<Order>> {
        self.inner.gateway.get("/orders").await
    }

    /// Fetch a single order by id.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotFound`] when the order does not exist.
    pub async fn order(&self, order_id: &OrderId) -> Result<Order> {
        self.inner.gateway.get(&format!("/orders/{order_id}")).await
    }

    /// Submit the checkout: validate, place the order, branch on payment
    /// method.
    ///
    /// The order-placement step is identical for both methods. Once placed,
    /// the order is committed: a payment-session failure afterwards does not
    /// roll it back, and the cart is cleared in every post-placement branch.
    ///
    /// # Errors
    ///
    /// [`ClientError::Validation`] before any network call; placement
    /// failures propagate with the machine reset to `Idle` (no order
    /// exists).
    #[instrument(skip(self, address), fields(method = ?method))]
    pub async fn submit(
        &self,
        address: ShippingAddress,
        method: PaymentMethod,
    ) -> Result<CheckoutOutcome> {
        self.set_state(CheckoutState::Validating);
        if let Err(errors) = validate_shipping(&address) {
            self.set_state(CheckoutState::Idle);
            return Err(ClientError::Validation(errors));
        }

        self.set_state(CheckoutState::PlacingOrder);
        let request = PlaceOrderRequest {
            shipping_address: address,
            payment_method: method,
        };
        let order: Order = match self.inner.gateway.post("/orders", &request).await {
            Ok(order) => order,
            Err(e) => {
                self.set_state(CheckoutState::Idle);
                return Err(e);
            }
        };

        // The historical count is now at least one.
        *self.inner.first_order.lock().await = Some(false);
        debug!(order = %order.id, "order placed");

        match method {
            PaymentMethod::CashOnDelivery => {
                self.clear_cart_best_effort().await;
                self.set_state(CheckoutState::CashConfirmed {
                    order_id: order.id.clone(),
                });
                Ok(CheckoutOutcome::CashConfirmed { order })
            }
            PaymentMethod::Online => self.start_online_payment(order.id).await,
        }
    }

    /// Handle re-entry from the hosted payment page.
    ///
    /// Verification is idempotent: each external session id is verified at
    /// most once, guarded by the recorded outcome and - because an in-memory
    /// guard does not survive a reload - by the order's server-side payment
    /// status.
    #[instrument(skip(self))]
    pub async fn confirm_return(&self, payment_return: PaymentReturn) -> VerificationStatus {
        let (session_id, order_id) = match payment_return {
            PaymentReturn::Cancelled { .. } => {
                return VerificationStatus::Cancelled {
                    message: "payment cancelled - your order is saved and can be paid later"
                        .to_string(),
                };
            }
            PaymentReturn::Completed {
                session_id,
                order_id,
            } => (session_id, order_id),
        };

        let mut verified = self.inner.verified.lock().await;
        if let Some(recorded) = verified.get(&session_id) {
            debug!(session = %session_id, "verification already performed, replaying outcome");
            return recorded.clone();
        }

        self.set_state(CheckoutState::Verifying {
            session_id: session_id.clone(),
        });

        // Durable idempotency check: a reload clears the in-memory guard,
        // but a paid order never needs a second verification call.
        if let Ok(order) = self.order(&order_id).await
            && order.payment_status.is_settled()
        {
            let status = VerificationStatus::Verified {
                message: "payment already confirmed".to_string(),
            };
            verified.insert(session_id, status.clone());
            self.set_state(CheckoutState::Verified { order_id });
            return status;
        }

        let request = VerifySessionRequest {
            session_id: session_id.clone(),
            order_id: order_id.clone(),
        };
        let status = match self
            .inner
            .gateway
            .post::<VerifyPayload, _>("/payments/verify-session", &request)
            .await
        {
            Ok(payload) if payload.payment_status.is_settled() => {
                self.set_state(CheckoutState::Verified {
                    order_id: order_id.clone(),
                });
                VerificationStatus::Verified {
                    message: "payment confirmed - thank you for your order".to_string(),
                }
            }
            Ok(_) => {
                self.set_state(CheckoutState::VerificationFailed {
                    order_id: order_id.clone(),
                });
                VerificationStatus::Failed {
                    message: "payment was not completed".to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, session = %session_id, "payment verification failed");
                self.set_state(CheckoutState::VerificationFailed {
                    order_id: order_id.clone(),
                });
                VerificationStatus::Failed {
                    message: format!("could not verify payment: {e}"),
                }
            }
        };

        verified.insert(session_id, status.clone());
        status
    }

    /// Request a fresh payment session for a committed order whose payment
    /// is still pending - the retry path offered from order history after an
    /// earlier session failed or was cancelled.
    ///
    /// # Errors
    ///
    /// - [`ClientError::BusinessRule`] when the order is not payable online
    ///   or is already paid
    /// - [`ClientError::PaymentSession`] when the session cannot be created;
    ///   the order is untouched and the retry path stays open
    #[instrument(skip(self), fields(order = %order_id))]
    pub async fn retry_payment(&self, order_id: &OrderId) -> Result<String> {
        let order = self.order(order_id).await?;
        if order.payment_method != PaymentMethod::Online {
            return Err(ClientError::BusinessRule(
                "order is payable on delivery".to_string(),
            ));
        }
        if order.payment_status.is_settled() {
            return Err(ClientError::BusinessRule(
                "order is already paid".to_string(),
            ));
        }

        let request = CheckoutSessionRequest {
            order_id: order_id.clone(),
        };
        let session = self
            .inner
            .gateway
            .post::<PaymentSessionInfo, _>("/payments/checkout-session", &request)
            .await
            .map_err(|e| ClientError::PaymentSession(e.to_string()))?;

        self.set_state(CheckoutState::Redirecting {
            order_id: order_id.clone(),
            url: session.url.clone(),
        });
        Ok(session.url)
    }

    async fn start_online_payment(&self, order_id: OrderId) -> Result<CheckoutOutcome> {
        let request = CheckoutSessionRequest {
            order_id: order_id.clone(),
        };
        let created = self
            .inner
            .gateway
            .post::<PaymentSessionInfo, _>("/payments/checkout-session", &request)
            .await;

        // The order is committed either way; the cart no longer reflects
        // pending intent.
        self.clear_cart_best_effort().await;

        match created {
            Ok(session) => {
                self.set_state(CheckoutState::Redirecting {
                    order_id: order_id.clone(),
                    url: session.url.clone(),
                });
                Ok(CheckoutOutcome::RedirectToPayment {
                    order_id,
                    url: session.url,
                })
            }
            Err(e) => {
                warn!(error = %e, order = %order_id, "payment session creation failed, order kept");
                self.set_state(CheckoutState::AwaitingExternalPayment {
                    order_id: order_id.clone(),
                });
                Ok(CheckoutOutcome::PaymentSessionFailed {
                    order_id,
                    message: "your order was placed but the payment page is unavailable - \
                              retry payment from your order history"
                        .to_string(),
                })
            }
        }
    }

    /// Cart clearing after a committed order must not fail the checkout; the
    /// next fetch resynchronizes the mirror.
    async fn clear_cart_best_effort(&self) {
        if let Err(e) = self.inner.cart.clear().await {
            warn!(error = %e, "failed to clear cart after checkout");
        }
    }

    fn set_state(&self, state: CheckoutState) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::persist::MemoryCredentialStore;
    use crate::types::UserProfile;
    use url::Url;
    use vendora_core::{CartItemId, ProductId, Role, UserId};

    fn item(unit: i64, discounted: i64, quantity: u32) -> CartItem {
        CartItem {
            id: CartItemId::new("ci-1"),
            product_id: ProductId::new("p-1"),
            name: "Item".to_string(),
            quantity,
            unit_price: Money::from_major(unit),
            discounted_unit_price: Money::from_major(discounted),
            variant: None,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            street: "12 Analytical Way".to_string(),
            city: "London".to_string(),
            postal_code: "10115".to_string(),
            phone: "+44 20 7946 0321".to_string(),
        }
    }

    fn user() -> UserProfile {
        UserProfile {
            id: UserId::new("u-1"),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::Customer,
        }
    }

    fn orchestrator() -> (AuthHandle, CheckoutOrchestrator) {
        let auth = AuthHandle::new(Box::new(MemoryCredentialStore::default()));
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").unwrap());
        let gateway = Gateway::new(&config, auth.clone()).unwrap();
        let cart = CartSynchronizer::new(gateway.clone(), auth.clone());
        let checkout = CheckoutOrchestrator::new(gateway, cart, &auth, Money::from_major(15));
        (auth, checkout)
    }

    #[tokio::test]
    async fn test_session_transition_resets_checkout_caches() {
        let (auth, checkout) = orchestrator();
        auth.install(user(), "tok-1");

        *checkout.inner.first_order.lock().await = Some(true);
        checkout.inner.verified.lock().await.insert(
            PaymentSessionId::new("ps-1"),
            VerificationStatus::Verified {
                message: "done".to_string(),
            },
        );
        checkout.set_state(CheckoutState::PlacingOrder);

        auth.clear();
        // Cache resets ride the watch listener; the first-order slot is the
        // last thing it clears.
        for _ in 0..50 {
            if checkout.inner.first_order.lock().await.is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(checkout.inner.first_order.lock().await.is_none());
        assert!(checkout.inner.verified.lock().await.is_empty());
        assert_eq!(checkout.state(), CheckoutState::Idle);
    }

    #[test]
    fn test_totals_reference_case() {
        // subtotal 100, item discount 10, first order, flat fee 15
        // => first-order discount 18.00, total 100 - 10 - 18 + 15 = 87
        let items = vec![item(50, 45, 2)];
        let totals = compute_totals(&items, true, Money::from_major(15));

        assert_eq!(totals.subtotal, Money::from_major(100));
        assert_eq!(totals.item_discount, Money::from_major(10));
        assert_eq!(totals.first_order_discount, Money::from_major(18));
        assert_eq!(totals.delivery_fee, Money::from_major(15));
        assert_eq!(totals.total, Money::from_major(87));
    }

    #[test]
    fn test_totals_without_first_order_discount() {
        let items = vec![item(50, 45, 2)];
        let totals = compute_totals(&items, false, Money::from_major(15));

        assert_eq!(totals.first_order_discount, Money::ZERO);
        assert_eq!(totals.total, Money::from_major(105));
    }

    #[test]
    fn test_empty_cart_has_no_delivery_fee() {
        let totals = compute_totals(&[], true, Money::from_major(15));
        assert_eq!(totals.subtotal, Money::ZERO);
        assert_eq!(totals.delivery_fee, Money::ZERO);
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn test_valid_address_passes() {
        assert!(validate_shipping(&address()).is_ok());
    }

    #[test]
    fn test_validation_collects_all_failures() {
        let bad = ShippingAddress {
            full_name: "A".to_string(),
            street: "x".to_string(),
            city: " ".to_string(),
            postal_code: "12ab".to_string(),
            phone: "123".to_string(),
        };
        let errors = validate_shipping(&bad).unwrap_err();
        let fields: Vec<_> = errors.fields().iter().map(|f| f.field).collect();
        assert_eq!(
            fields,
            vec!["fullName", "street", "city", "phone", "postalCode"]
        );
    }

    #[test]
    fn test_postal_code_bounds() {
        let mut addr = address();
        addr.postal_code = "123".to_string();
        assert!(validate_shipping(&addr).is_err());

        addr.postal_code = "1234".to_string();
        assert!(validate_shipping(&addr).is_ok());

        addr.postal_code = "123456".to_string();
        assert!(validate_shipping(&addr).is_ok());

        addr.postal_code = "1234567".to_string();
        assert!(validate_shipping(&addr).is_err());
    }

    #[test]
    fn test_phone_counts_digits_only() {
        let mut addr = address();
        addr.phone = "(020) 7946-0321".to_string();
        assert!(validate_shipping(&addr).is_ok());

        addr.phone = "not a phone".to_string();
        assert!(validate_shipping(&addr).is_err());
    }

    #[test]
    fn test_payment_return_from_query() {
        assert_eq!(
            PaymentReturn::from_query(Some("ps-1"), Some("ord-1"), false),
            Some(PaymentReturn::Completed {
                session_id: PaymentSessionId::new("ps-1"),
                order_id: OrderId::new("ord-1"),
            })
        );
        assert_eq!(
            PaymentReturn::from_query(None, Some("ord-1"), true),
            Some(PaymentReturn::Cancelled {
                order_id: Some(OrderId::new("ord-1")),
            })
        );
        assert_eq!(PaymentReturn::from_query(None, None, false), None);
    }
}
