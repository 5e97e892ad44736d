//! Checkout end to end: totals, cash and online branches, payment-session
//! failure, and idempotent verification on return.

use vendora_client::checkout::{CheckoutState, PaymentReturn, VerificationStatus};
use vendora_client::{CheckoutOutcome, ClientError, Marketplace};
use vendora_core::{Money, OrderId, PaymentMethod, PaymentSessionId, PaymentStatus, ProductId};
use vendora_integration_tests::{
    SharedCredentialStore, StubServer, client, client_with_store, good_address, sign_up,
};

/// Place an online order for one `p-2` and return its payment handoff.
async fn submit_online(marketplace: &Marketplace) -> (OrderId, PaymentSessionId) {
    marketplace
        .cart()
        .add(ProductId::new("p-2"), 1, None)
        .await
        .expect("add to cart");
    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::Online)
        .await
        .expect("submit online order");
    let CheckoutOutcome::RedirectToPayment { order_id, url } = outcome else {
        panic!("expected a payment redirect, got {outcome:?}");
    };
    assert!(url.contains("pay.example"));
    (order_id, session_from_url(&url))
}

fn session_from_url(url: &str) -> PaymentSessionId {
    let id = url.rsplit('/').next().expect("session id in url");
    PaymentSessionId::new(id)
}

#[tokio::test]
async fn test_cash_checkout_with_first_order_discount() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    let user = sign_up(&marketplace, "ada@example.com").await;

    // p-1 is 50.00 discounted to 45.00; two units.
    marketplace
        .cart()
        .add(ProductId::new("p-1"), 2, None)
        .await
        .expect("add to cart");

    let totals = marketplace
        .checkout()
        .preview_totals()
        .await
        .expect("preview totals");
    assert_eq!(totals.subtotal, Money::from_major(100));
    assert_eq!(totals.item_discount, Money::from_major(10));
    assert_eq!(totals.first_order_discount, Money::from_major(18));
    assert_eq!(totals.delivery_fee, Money::from_major(15));
    assert_eq!(totals.total, Money::from_major(87));

    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::CashOnDelivery)
        .await
        .expect("submit cash order");
    let CheckoutOutcome::CashConfirmed { order } = outcome else {
        panic!("expected cash confirmation, got {outcome:?}");
    };

    assert_eq!(order.total, Money::from_major(87));
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(matches!(
        marketplace.checkout().state(),
        CheckoutState::CashConfirmed { .. }
    ));

    // Both sides of the cart are empty after a committed order.
    assert!(marketplace.cart().current().is_empty());
    assert_eq!(server.server_cart_len(&user.id), 0);
}

#[tokio::test]
async fn test_invalid_address_blocks_any_network_call() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;
    marketplace
        .cart()
        .add(ProductId::new("p-1"), 1, None)
        .await
        .expect("add to cart");

    let mut address = good_address();
    address.postal_code = "12ab".to_string();
    address.phone = "123".to_string();

    let err = marketplace
        .checkout()
        .submit(address, PaymentMethod::CashOnDelivery)
        .await
        .expect_err("invalid address");
    let ClientError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    let fields: Vec<_> = errors.fields().iter().map(|f| f.field).collect();
    assert_eq!(fields, vec!["phone", "postalCode"]);

    assert_eq!(server.counters().orders_created, 0);
    assert_eq!(marketplace.checkout().state(), CheckoutState::Idle);
    assert_eq!(marketplace.cart().item_count(), 1, "cart kept");
}

#[tokio::test]
async fn test_online_checkout_verifies_exactly_once() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;

    let (order_id, session_id) = submit_online(&marketplace).await;
    assert!(marketplace.cart().current().is_empty());

    let payment_return = PaymentReturn::Completed {
        session_id,
        order_id: order_id.clone(),
    };
    let first = marketplace
        .checkout()
        .confirm_return(payment_return.clone())
        .await;
    assert!(matches!(first, VerificationStatus::Verified { .. }), "got {first:?}");
    assert_eq!(server.counters().verifies, 1);

    let order = marketplace.checkout().order(&order_id).await.expect("fetch order");
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    // A repeated return (back button, re-opened tab) replays the recorded
    // outcome without another verification call.
    let second = marketplace.checkout().confirm_return(payment_return).await;
    assert_eq!(first, second);
    assert_eq!(server.counters().verifies, 1);
}

#[tokio::test]
async fn test_verification_is_idempotent_across_a_restart() {
    let server = StubServer::spawn().await;
    let store = SharedCredentialStore::default();

    let first = client_with_store(&server, Box::new(store.clone()));
    sign_up(&first, "ada@example.com").await;
    let (order_id, session_id) = submit_online(&first).await;

    let status = first
        .checkout()
        .confirm_return(PaymentReturn::Completed {
            session_id: session_id.clone(),
            order_id: order_id.clone(),
        })
        .await;
    assert!(matches!(status, VerificationStatus::Verified { .. }));
    assert_eq!(server.counters().verifies, 1);
    drop(first);

    // A fresh process has no in-memory record of the session; the order's
    // settled payment status must still prevent a second verification.
    let second = client_with_store(&server, Box::new(store));
    second.hydrate().await.expect("hydrate");
    let status = second
        .checkout()
        .confirm_return(PaymentReturn::Completed { session_id, order_id })
        .await;
    assert!(matches!(status, VerificationStatus::Verified { .. }), "got {status:?}");
    assert_eq!(server.counters().verifies, 1, "no second verification call");
}

#[tokio::test]
async fn test_payment_session_failure_keeps_the_order() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;
    marketplace
        .cart()
        .add(ProductId::new("p-1"), 1, None)
        .await
        .expect("add to cart");

    server.set_fail_payment_session(true);

    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::Online)
        .await
        .expect("a committed order is not an error");
    let CheckoutOutcome::PaymentSessionFailed { order_id, message } = outcome else {
        panic!("expected a payment-session failure, got {outcome:?}");
    };
    assert!(message.contains("order was placed"));

    // The order exists and stays payable; the cart no longer holds it.
    let order = marketplace.checkout().order(&order_id).await.expect("order kept");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(marketplace.cart().current().is_empty());
    assert!(matches!(
        marketplace.checkout().state(),
        CheckoutState::AwaitingExternalPayment { .. }
    ));
}

#[tokio::test]
async fn test_cancelled_return_changes_nothing() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;
    let (order_id, _session_id) = submit_online(&marketplace).await;

    let status = marketplace
        .checkout()
        .confirm_return(PaymentReturn::Cancelled {
            order_id: Some(order_id.clone()),
        })
        .await;
    assert!(matches!(status, VerificationStatus::Cancelled { .. }), "got {status:?}");
    assert_eq!(server.counters().verifies, 0);

    let order = marketplace.checkout().order(&order_id).await.expect("fetch order");
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_first_order_answer_does_not_leak_between_sessions() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;

    marketplace
        .cart()
        .add(ProductId::new("p-2"), 1, None)
        .await
        .expect("add to cart");
    marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::CashOnDelivery)
        .await
        .expect("first user's order");
    assert!(!marketplace.checkout().is_first_order().await.expect("cached answer"));

    // A different user on the same client starts from a clean slate.
    marketplace.session().logout().await;
    sign_up(&marketplace, "grace@example.com").await;
    assert!(marketplace.checkout().is_first_order().await.expect("fresh answer"));
    assert_eq!(marketplace.checkout().state(), CheckoutState::Idle);
}

#[tokio::test]
async fn test_retry_payment_reopens_the_payment_path() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;
    marketplace
        .cart()
        .add(ProductId::new("p-1"), 1, None)
        .await
        .expect("add to cart");

    server.set_fail_payment_session(true);
    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::Online)
        .await
        .expect("committed order");
    let CheckoutOutcome::PaymentSessionFailed { order_id, .. } = outcome else {
        panic!("expected a payment-session failure, got {outcome:?}");
    };

    // While the provider is down the retry surfaces the dedicated error.
    let err = marketplace
        .checkout()
        .retry_payment(&order_id)
        .await
        .expect_err("provider still down");
    assert!(matches!(err, ClientError::PaymentSession(_)), "got {err:?}");
    assert!(err.is_retryable());

    // Once it recovers, the same order gets a fresh session.
    server.set_fail_payment_session(false);
    let url = marketplace
        .checkout()
        .retry_payment(&order_id)
        .await
        .expect("fresh payment session");
    assert!(url.contains("pay.example"));

    let status = marketplace
        .checkout()
        .confirm_return(PaymentReturn::Completed {
            session_id: session_from_url(&url),
            order_id: order_id.clone(),
        })
        .await;
    assert!(matches!(status, VerificationStatus::Verified { .. }), "got {status:?}");

    // A settled order is no longer payable.
    let err = marketplace
        .checkout()
        .retry_payment(&order_id)
        .await
        .expect_err("already paid");
    assert!(matches!(err, ClientError::BusinessRule(_)), "got {err:?}");
}

#[tokio::test]
async fn test_first_order_discount_applies_only_once() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;

    assert!(marketplace.checkout().is_first_order().await.expect("query history"));

    // p-2 is 25.00 with no item discount: 25 - 5 (20%) + 15 = 35.
    marketplace
        .cart()
        .add(ProductId::new("p-2"), 1, None)
        .await
        .expect("add to cart");
    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::CashOnDelivery)
        .await
        .expect("first order");
    let CheckoutOutcome::CashConfirmed { order } = outcome else {
        panic!("expected cash confirmation");
    };
    assert_eq!(order.first_order_discount, Money::from_major(5));
    assert_eq!(order.total, Money::from_major(35));

    // Second checkout session: the discount is gone. 25 + 15 = 40.
    marketplace.checkout().begin().await;
    assert!(!marketplace.checkout().is_first_order().await.expect("query history"));

    marketplace
        .cart()
        .add(ProductId::new("p-2"), 1, None)
        .await
        .expect("add to cart again");
    let outcome = marketplace
        .checkout()
        .submit(good_address(), PaymentMethod::CashOnDelivery)
        .await
        .expect("second order");
    let CheckoutOutcome::CashConfirmed { order } = outcome else {
        panic!("expected cash confirmation");
    };
    assert_eq!(order.first_order_discount, Money::ZERO);
    assert_eq!(order.total, Money::from_major(40));

    let history = marketplace.checkout().order_history().await.expect("history");
    assert_eq!(history.len(), 2);
}
