//! Session lifecycle: register, login, profile, logout, and startup
//! hydration from a persisted credential record.

use vendora_client::types::ProfileUpdate;
use vendora_client::{ClientError, Marketplace};
use vendora_core::ProductId;
use vendora_integration_tests::{
    SharedCredentialStore, StubServer, client, client_with_store, sign_up,
};

#[tokio::test]
async fn test_register_then_login() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);

    let user = sign_up(&marketplace, "ada@example.com").await;
    assert_eq!(user.email, "ada@example.com");
    assert!(marketplace.session().is_authenticated());

    marketplace.session().logout().await;
    assert!(!marketplace.session().is_authenticated());
    assert!(marketplace.session().current().is_none());

    let user = marketplace
        .session()
        .login("ada@example.com", "engine-no-1")
        .await
        .expect("login with registered credentials");
    assert_eq!(user.name, "Ada Lovelace");
    assert_eq!(marketplace.session().current(), Some(user));
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;
    marketplace.session().logout().await;

    let err = marketplace
        .session()
        .login("ada@example.com", "not-the-password")
        .await
        .expect_err("wrong password");
    assert!(matches!(err, ClientError::InvalidCredentials), "got {err:?}");
    assert!(!marketplace.session().is_authenticated());
}

#[tokio::test]
async fn test_duplicate_registration_is_a_business_rule() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;

    let other = client(&server);
    let err = other
        .session()
        .register(&vendora_client::RegisterDetails {
            name: "Imposter".to_string(),
            email: "ada@example.com".to_string(),
            password: "whatever1".to_string(),
        })
        .await
        .expect_err("duplicate email");
    assert!(matches!(err, ClientError::BusinessRule(_)), "got {err:?}");
}

#[tokio::test]
async fn test_profile_update_refreshes_stored_identity() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    sign_up(&marketplace, "ada@example.com").await;

    let updated = marketplace
        .session()
        .update_profile(&ProfileUpdate {
            name: Some("Augusta Ada King".to_string()),
            email: None,
        })
        .await
        .expect("update profile");
    assert_eq!(updated.name, "Augusta Ada King");

    let current = marketplace.session().current().expect("still signed in");
    assert_eq!(current.name, "Augusta Ada King");
    assert_eq!(current.email, "ada@example.com");
}

#[tokio::test]
async fn test_logout_clears_local_state_even_when_the_server_fails() {
    let server = StubServer::spawn().await;
    let marketplace = client(&server);
    let user = sign_up(&marketplace, "ada@example.com").await;

    marketplace
        .cart()
        .add(ProductId::new("p-1"), 1, None)
        .await
        .expect("add to cart");

    server.set_fail_logout(true);
    marketplace.session().logout().await;

    assert_eq!(server.counters().logouts, 1, "server was notified");
    assert!(!marketplace.session().is_authenticated());
    assert!(marketplace.cart().current().is_empty());
    // The server-side cart is untouched; only local state is gone.
    assert_eq!(server.server_cart_len(&user.id), 1);
}

#[tokio::test]
async fn test_hydration_restores_a_session_across_instances() {
    let server = StubServer::spawn().await;
    let store = SharedCredentialStore::default();

    let first = client_with_store(&server, Box::new(store.clone()));
    let user = sign_up(&first, "ada@example.com").await;
    drop(first);

    let second = client_with_store(&server, Box::new(store));
    let restored = second.hydrate().await.expect("hydrate");
    assert_eq!(restored.as_ref().map(|u| u.id.clone()), Some(user.id));
    assert!(second.session().is_authenticated());
}

#[tokio::test]
async fn test_hydration_with_a_dead_credential_clears_silently() {
    let server = StubServer::spawn().await;
    let store = SharedCredentialStore::default();

    let first = client_with_store(&server, Box::new(store.clone()));
    sign_up(&first, "ada@example.com").await;
    drop(first);

    server.expire_tokens();
    server.set_fail_refresh(true);

    let second = client_with_store(&server, Box::new(store.clone()));
    let restored = second.hydrate().await.expect("hydrate must not error");
    assert!(restored.is_none());
    assert!(!second.session().is_authenticated());

    // A third start finds nothing to hydrate: the dead record was cleared.
    use vendora_client::CredentialStore;
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_hydration_without_a_record_is_a_noop() {
    let server = StubServer::spawn().await;
    let marketplace: Marketplace = client(&server);

    let restored = marketplace.hydrate().await.expect("hydrate");
    assert!(restored.is_none());
    assert!(!marketplace.session().is_authenticated());
}
