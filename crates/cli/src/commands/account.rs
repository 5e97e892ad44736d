//! Account commands: login, register, profile, logout.

use vendora_client::{Marketplace, RegisterDetails, Result};

#[allow(clippy::print_stdout)]
pub async fn login(marketplace: &Marketplace, email: &str, password: &str) -> Result<()> {
    let user = marketplace.session().login(email, password).await?;
    println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn register(
    marketplace: &Marketplace,
    name: &str,
    email: &str,
    password: &str,
) -> Result<()> {
    let details = RegisterDetails {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    };
    let user = marketplace.session().register(&details).await?;
    println!("Account created: {} <{}>", user.name, user.email);
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn profile(marketplace: &Marketplace) -> Result<()> {
    let user = marketplace.session().refresh_profile().await?;
    println!("{} <{}>", user.name, user.email);
    println!("  id:   {}", user.id);
    println!("  role: {}", user.role);
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn logout(marketplace: &Marketplace) {
    marketplace.session().logout().await;
    println!("Signed out");
}
