//! In-process stub of the marketplace backend.
//!
//! Serves the same REST contract the SDK consumes (`{ message, data }`
//! envelopes, bearer credentials, refresh via credential exchange) with
//! in-memory state, per-route call counters, and switchable failure
//! injection. Tests drive the real client over real HTTP against it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use url::Url;

use vendora_client::checkout::compute_totals;
use vendora_client::persist::{CredentialStore, MemoryCredentialStore, PersistedAuth};
use vendora_client::{ClientConfig, Marketplace, ShippingAddress};
use vendora_client::types::{
    AddToCartRequest, AuthPayload, Cart, CartItem, CheckoutSessionRequest, Envelope, LoginRequest,
    Order, PaymentSessionInfo, PlaceOrderRequest, ProfileUpdate, RefreshPayload, RegisterDetails,
    UpdateQuantityRequest, UserProfile, VerifyPayload, VerifySessionRequest,
};
use vendora_core::{
    CartItemId, Money, OrderId, PaymentSessionId, PaymentStatus, ProductId, Role, UserId,
};

/// Flat delivery fee the stub charges, matching the client default.
const DELIVERY_FEE: i64 = 15;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StubUser {
    id: String,
    name: String,
    email: String,
    password: String,
    role: Role,
}

#[derive(Debug, Clone)]
struct TokenInfo {
    user_id: String,
    valid: bool,
}

/// A product the stub is willing to sell.
#[derive(Debug, Clone)]
pub struct StubProduct {
    pub name: String,
    pub unit_price: Money,
    pub discounted_unit_price: Money,
}

/// Per-route request counters.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub refreshes: usize,
    pub cart_requests: usize,
    pub orders_created: usize,
    pub orders_listed: usize,
    pub checkout_sessions: usize,
    pub verifies: usize,
    pub logouts: usize,
}

#[derive(Default)]
struct StubState {
    users: Vec<StubUser>,
    tokens: HashMap<String, TokenInfo>,
    products: HashMap<String, StubProduct>,
    carts: HashMap<String, Vec<CartItem>>,
    orders: Vec<(String, Order)>,
    payment_sessions: HashMap<String, String>,
    seq: u64,
    fail_refresh: bool,
    issue_invalid_tokens: bool,
    fail_logout: bool,
    fail_payment_session: bool,
    counters: Counters,
}

impl StubState {
    fn next(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}-{}", self.seq)
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        let token = self.next("tok");
        self.tokens.insert(
            token.clone(),
            TokenInfo {
                user_id: user_id.to_string(),
                valid: !self.issue_invalid_tokens,
            },
        );
        token
    }

    fn cart_response(&self, user_id: &str) -> Cart {
        let items = self.carts.get(user_id).cloned().unwrap_or_default();
        Cart {
            owner_id: Some(UserId::new(user_id)),
            item_count: items.len(),
            items,
        }
    }

    fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.users.iter().find(|u| u.id == user_id).map(|u| UserProfile {
            id: UserId::new(&u.id),
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        })
    }
}

type Shared = Arc<Mutex<StubState>>;

// ─────────────────────────────────────────────────────────────────────────────
// Response helpers
// ─────────────────────────────────────────────────────────────────────────────

fn ok<T: Serialize>(message: &str, data: T) -> Response {
    Json(Envelope {
        message: Some(message.to_string()),
        data: Some(data),
    })
    .into_response()
}

fn err(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(Envelope::<serde_json::Value> {
            message: Some(message.to_string()),
            data: None,
        }),
    )
        .into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn authed(state: &StubState, headers: &HeaderMap) -> Result<String, Response> {
    let Some(token) = bearer(headers) else {
        return Err(err(StatusCode::UNAUTHORIZED, "missing credential"));
    };
    match state.tokens.get(&token) {
        Some(info) if info.valid => Ok(info.user_id.clone()),
        _ => Err(err(StatusCode::UNAUTHORIZED, "credential expired")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth routes
// ─────────────────────────────────────────────────────────────────────────────

async fn register(State(shared): State<Shared>, Json(req): Json<RegisterDetails>) -> Response {
    let mut state = lock(&shared);
    if state.users.iter().any(|u| u.email == req.email) {
        return err(StatusCode::CONFLICT, "an account with this email already exists");
    }
    let id = state.next("u");
    state.users.push(StubUser {
        id: id.clone(),
        name: req.name,
        email: req.email,
        password: req.password,
        role: Role::Customer,
    });
    let token = state.issue_token(&id);
    state.profile(&id).map_or_else(
        || err(StatusCode::INTERNAL_SERVER_ERROR, "missing user"),
        |user| ok("account created", AuthPayload { token, user }),
    )
}

async fn login(State(shared): State<Shared>, Json(req): Json<LoginRequest>) -> Response {
    let mut state = lock(&shared);
    let Some(user) = state
        .users
        .iter()
        .find(|u| u.email == req.email && u.password == req.password)
        .cloned()
    else {
        return err(StatusCode::UNAUTHORIZED, "invalid email or password");
    };
    let token = state.issue_token(&user.id);
    state.profile(&user.id).map_or_else(
        || err(StatusCode::INTERNAL_SERVER_ERROR, "missing user"),
        |user| ok("signed in", AuthPayload { token, user }),
    )
}

async fn refresh_token(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shared);
    state.counters.refreshes += 1;

    if state.fail_refresh {
        return err(StatusCode::UNAUTHORIZED, "refresh rejected");
    }
    let Some(old) = bearer(&headers) else {
        return err(StatusCode::UNAUTHORIZED, "missing credential");
    };
    // An expired token still identifies its user for the exchange.
    let Some(info) = state.tokens.get(&old).cloned() else {
        return err(StatusCode::UNAUTHORIZED, "unknown credential");
    };
    state.tokens.remove(&old);
    let token = state.issue_token(&info.user_id);
    ok("credential refreshed", RefreshPayload { token })
}

async fn logout(State(shared): State<Shared>) -> Response {
    let mut state = lock(&shared);
    state.counters.logouts += 1;
    if state.fail_logout {
        return err(StatusCode::INTERNAL_SERVER_ERROR, "logout failed");
    }
    ok("signed out", serde_json::json!({}))
}

async fn get_profile(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&shared);
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    state.profile(&user_id).map_or_else(
        || err(StatusCode::NOT_FOUND, "user not found"),
        |user| ok("profile", user),
    )
}

async fn update_profile(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let mut state = lock(&shared);
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
    }
    state.profile(&user_id).map_or_else(
        || err(StatusCode::NOT_FOUND, "user not found"),
        |user| ok("profile updated", user),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Cart routes
// ─────────────────────────────────────────────────────────────────────────────

async fn get_cart(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shared);
    state.counters.cart_requests += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    ok("cart", state.cart_response(&user_id))
}

async fn add_to_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<AddToCartRequest>,
) -> Response {
    let mut state = lock(&shared);
    state.counters.cart_requests += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(product) = state.products.get(req.product_id.as_str()).cloned() else {
        return err(StatusCode::BAD_REQUEST, "product not available");
    };
    if req.quantity == 0 {
        return err(StatusCode::BAD_REQUEST, "quantity must be positive");
    }

    let item_id = state.next("ci");
    let item = CartItem {
        id: CartItemId::new(item_id),
        product_id: ProductId::new(req.product_id.as_str()),
        name: product.name,
        quantity: req.quantity,
        unit_price: product.unit_price,
        discounted_unit_price: product.discounted_unit_price,
        variant: req.variant,
    };
    state.carts.entry(user_id.clone()).or_default().push(item);
    ok("item added", state.cart_response(&user_id))
}

async fn update_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<UpdateQuantityRequest>,
) -> Response {
    let mut state = lock(&shared);
    state.counters.cart_requests += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let items = state.carts.entry(user_id.clone()).or_default();
    let Some(item) = items.iter_mut().find(|i| i.id == req.item_id) else {
        return err(StatusCode::NOT_FOUND, "cart item not found");
    };
    item.quantity = req.quantity;
    ok("quantity updated", state.cart_response(&user_id))
}

async fn remove_cart_item(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
) -> Response {
    let mut state = lock(&shared);
    state.counters.cart_requests += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let items = state.carts.entry(user_id.clone()).or_default();
    let before = items.len();
    items.retain(|i| i.id.as_str() != item_id);
    if items.len() == before {
        return err(StatusCode::NOT_FOUND, "cart item not found");
    }
    ok("item removed", state.cart_response(&user_id))
}

async fn clear_cart(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shared);
    state.counters.cart_requests += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    state.carts.insert(user_id.clone(), Vec::new());
    ok("cart cleared", state.cart_response(&user_id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Order & payment routes
// ─────────────────────────────────────────────────────────────────────────────

async fn create_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Response {
    let mut state = lock(&shared);
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let items = state.carts.get(&user_id).cloned().unwrap_or_default();
    if items.is_empty() {
        return err(StatusCode::BAD_REQUEST, "cart is empty");
    }

    let is_first = !state.orders.iter().any(|(owner, _)| owner == &user_id);
    let totals = compute_totals(&items, is_first, Money::from_major(DELIVERY_FEE));

    let order = Order {
        id: OrderId::new(state.next("ord")),
        items,
        shipping_address: req.shipping_address,
        payment_method: req.payment_method,
        subtotal: totals.subtotal,
        item_discount: totals.item_discount,
        first_order_discount: totals.first_order_discount,
        delivery_fee: totals.delivery_fee,
        total: totals.total,
        payment_status: PaymentStatus::Pending,
        placed_at: Utc::now(),
    };
    state.orders.push((user_id, order.clone()));
    state.counters.orders_created += 1;
    ok("order placed", order)
}

async fn list_orders(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&shared);
    state.counters.orders_listed += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|(owner, _)| owner == &user_id)
        .map(|(_, order)| order.clone())
        .collect();
    ok("orders", orders)
}

async fn get_order(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response {
    let state = lock(&shared);
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    state
        .orders
        .iter()
        .find(|(owner, order)| owner == &user_id && order.id.as_str() == order_id)
        .map_or_else(
            || err(StatusCode::NOT_FOUND, "order not found"),
            |(_, order)| ok("order", order.clone()),
        )
}

async fn create_checkout_session(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<CheckoutSessionRequest>,
) -> Response {
    let mut state = lock(&shared);
    state.counters.checkout_sessions += 1;
    let user_id = match authed(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if state.fail_payment_session {
        return err(StatusCode::SERVICE_UNAVAILABLE, "payment provider unavailable");
    }
    if !state
        .orders
        .iter()
        .any(|(owner, order)| owner == &user_id && order.id == req.order_id)
    {
        return err(StatusCode::NOT_FOUND, "order not found");
    }
    let session_id = state.next("ps");
    state
        .payment_sessions
        .insert(session_id.clone(), req.order_id.into_inner());
    ok(
        "payment session created",
        PaymentSessionInfo {
            url: format!("https://pay.example/session/{session_id}"),
            id: PaymentSessionId::new(session_id),
        },
    )
}

async fn verify_payment_session(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(req): Json<VerifySessionRequest>,
) -> Response {
    let mut state = lock(&shared);
    state.counters.verifies += 1;
    if let Err(resp) = authed(&state, &headers) {
        return resp;
    }
    let Some(order_id) = state.payment_sessions.get(req.session_id.as_str()).cloned() else {
        return err(StatusCode::NOT_FOUND, "payment session not found");
    };
    if order_id != req.order_id.as_str() {
        return err(StatusCode::BAD_REQUEST, "session does not match order");
    }
    if let Some((_, order)) = state
        .orders
        .iter_mut()
        .find(|(_, order)| order.id.as_str() == order_id)
    {
        order.payment_status = PaymentStatus::Paid;
    }
    ok(
        "payment verified",
        VerifyPayload {
            payment_status: PaymentStatus::Paid,
        },
    )
}

fn lock(shared: &Shared) -> MutexGuard<'_, StubState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Server handle
// ─────────────────────────────────────────────────────────────────────────────

/// A running stub backend.
pub struct StubServer {
    pub base_url: Url,
    state: Shared,
}

impl StubServer {
    /// Bind on an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound (test environment only).
    pub async fn spawn() -> Self {
        let shared: Shared = Arc::new(Mutex::new(StubState {
            products: default_products(),
            ..StubState::default()
        }));

        let app = Router::new()
            .route("/auth/register", post(register))
            .route("/auth/login", post(login))
            .route("/auth/refresh-token", post(refresh_token))
            .route("/auth/logout", post(logout))
            .route("/auth/profile", get(get_profile).put(update_profile))
            .route("/cart", get(get_cart))
            .route("/cart/add", post(add_to_cart))
            .route("/cart/update", put(update_cart))
            .route("/cart/item/{id}", delete(remove_cart_item))
            .route("/cart/clear", delete(clear_cart))
            .route("/orders", post(create_order).get(list_orders))
            .route("/orders/{id}", get(get_order))
            .route("/payments/checkout-session", post(create_checkout_session))
            .route("/payments/verify-session", post(verify_payment_session))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("stub base url"),
            state: shared,
        }
    }

    /// Snapshot of the per-route counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        lock(&self.state).counters.clone()
    }

    /// Invalidate every issued credential, as if they all expired.
    pub fn expire_tokens(&self) {
        for info in lock(&self.state).tokens.values_mut() {
            info.valid = false;
        }
    }

    /// Make the refresh endpoint reject every exchange.
    pub fn set_fail_refresh(&self, fail: bool) {
        lock(&self.state).fail_refresh = fail;
    }

    /// Issue credentials that are immediately invalid (for replay tests).
    pub fn set_issue_invalid_tokens(&self, on: bool) {
        lock(&self.state).issue_invalid_tokens = on;
    }

    /// Make the logout endpoint fail with a server error.
    pub fn set_fail_logout(&self, fail: bool) {
        lock(&self.state).fail_logout = fail;
    }

    /// Make payment-session creation fail.
    pub fn set_fail_payment_session(&self, fail: bool) {
        lock(&self.state).fail_payment_session = fail;
    }

    /// The most recently created payment session, if any.
    #[must_use]
    pub fn last_payment_session(&self) -> Option<(PaymentSessionId, OrderId)> {
        let state = lock(&self.state);
        state
            .payment_sessions
            .iter()
            .max_by_key(|(id, _)| numeric_suffix(id))
            .map(|(session, order)| (PaymentSessionId::new(session), OrderId::new(order)))
    }

    /// The cart the server currently holds for `user_id`.
    #[must_use]
    pub fn server_cart_len(&self, user_id: &UserId) -> usize {
        lock(&self.state)
            .carts
            .get(user_id.as_str())
            .map_or(0, Vec::len)
    }
}

fn numeric_suffix(id: &str) -> u64 {
    id.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn default_products() -> HashMap<String, StubProduct> {
    HashMap::from([
        (
            "p-1".to_string(),
            StubProduct {
                name: "Wool scarf".to_string(),
                unit_price: Money::from_major(50),
                discounted_unit_price: Money::from_major(45),
            },
        ),
        (
            "p-2".to_string(),
            StubProduct {
                name: "Clay mug".to_string(),
                unit_price: Money::from_major(25),
                discounted_unit_price: Money::from_major(25),
            },
        ),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Test helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build a client wired to `server`, with in-memory credential persistence.
///
/// Must be called within a Tokio runtime.
///
/// # Panics
///
/// Panics if the HTTP client cannot be constructed.
#[must_use]
pub fn client(server: &StubServer) -> Marketplace {
    client_with_store(server, Box::new(MemoryCredentialStore::default()))
}

/// Build a client wired to `server` with an explicit credential store.
///
/// # Panics
///
/// Panics if the HTTP client cannot be constructed.
#[must_use]
pub fn client_with_store(server: &StubServer, store: Box<dyn CredentialStore>) -> Marketplace {
    Marketplace::with_store(ClientConfig::new(server.base_url.clone()), store)
        .expect("construct marketplace client")
}

/// Register a fresh account and return its profile.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn sign_up(marketplace: &Marketplace, email: &str) -> UserProfile {
    marketplace
        .session()
        .register(&RegisterDetails {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            password: "engine-no-1".to_string(),
        })
        .await
        .expect("register account")
}

/// A shipping address that passes every validation rule.
#[must_use]
pub fn good_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Lovelace".to_string(),
        street: "12 Analytical Way".to_string(),
        city: "London".to_string(),
        postal_code: "10115".to_string(),
        phone: "+44 20 7946 0321".to_string(),
    }
}

/// A credential store whose state survives across client instances, for
/// restart/hydration tests.
#[derive(Clone, Default)]
pub struct SharedCredentialStore(Arc<MemoryCredentialStore>);

impl CredentialStore for SharedCredentialStore {
    fn load(&self) -> Option<PersistedAuth> {
        self.0.load()
    }

    fn save(&self, auth: &PersistedAuth) {
        self.0.save(auth);
    }

    fn clear(&self) {
        self.0.clear();
    }
}
