//! Checkout commands.

use vendora_client::{
    CheckoutOutcome, ClientError, Marketplace, PaymentReturn, Result, ShippingAddress,
    VerificationStatus,
};
use vendora_core::{OrderId, PaymentMethod};

#[allow(clippy::print_stdout)]
pub async fn submit(
    marketplace: &Marketplace,
    name: &str,
    street: &str,
    city: &str,
    postal: &str,
    phone: &str,
    method: &str,
) -> Result<()> {
    let method = match method {
        "cash" => PaymentMethod::CashOnDelivery,
        "online" => PaymentMethod::Online,
        other => {
            return Err(ClientError::BusinessRule(format!(
                "unknown payment method '{other}', expected 'cash' or 'online'"
            )));
        }
    };

    let address = ShippingAddress {
        full_name: name.to_string(),
        street: street.to_string(),
        city: city.to_string(),
        postal_code: postal.to_string(),
        phone: phone.to_string(),
    };

    marketplace.checkout().begin().await;
    match marketplace.checkout().submit(address, method).await? {
        CheckoutOutcome::CashConfirmed { order } => {
            println!("Order {} confirmed - pay {} on delivery", order.id, order.total);
        }
        CheckoutOutcome::RedirectToPayment { order_id, url } => {
            println!("Order {order_id} placed - complete payment at:");
            println!("  {url}");
        }
        CheckoutOutcome::PaymentSessionFailed { order_id, message } => {
            println!("Order {order_id} placed. {message}");
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn preview(marketplace: &Marketplace) -> Result<()> {
    marketplace.cart().fetch().await?;
    let totals = marketplace.checkout().preview_totals().await?;
    println!("Subtotal:             {}", totals.subtotal);
    println!("Item discount:       -{}", totals.item_discount);
    println!("First-order discount:-{}", totals.first_order_discount);
    println!("Delivery fee:        +{}", totals.delivery_fee);
    println!("Total:                {}", totals.total);
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn pay(marketplace: &Marketplace, order: &str) -> Result<()> {
    let url = marketplace
        .checkout()
        .retry_payment(&OrderId::new(order))
        .await?;
    println!("Complete payment at:");
    println!("  {url}");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn verify(
    marketplace: &Marketplace,
    session: Option<&str>,
    order: Option<&str>,
    cancelled: bool,
) -> Result<()> {
    let Some(payment_return) = PaymentReturn::from_query(session, order, cancelled) else {
        return Err(ClientError::BusinessRule(
            "pass --session and --order, or --cancelled".to_string(),
        ));
    };

    match marketplace.checkout().confirm_return(payment_return).await {
        VerificationStatus::Verified { message }
        | VerificationStatus::Failed { message }
        | VerificationStatus::Cancelled { message } => println!("{message}"),
    }
    Ok(())
}
