//! Order history commands.

use vendora_client::{Marketplace, Order, Result};
use vendora_core::OrderId;

#[allow(clippy::print_stdout)]
fn print_order(order: &Order) {
    println!(
        "{}  {}  {:?}  total {}",
        order.id,
        order.placed_at.format("%Y-%m-%d %H:%M"),
        order.payment_status,
        order.total
    );
}

#[allow(clippy::print_stdout)]
pub async fn list(marketplace: &Marketplace) -> Result<()> {
    let orders = marketplace.checkout().order_history().await?;
    if orders.is_empty() {
        println!("No orders yet");
        return Ok(());
    }
    for order in &orders {
        print_order(order);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn show(marketplace: &Marketplace, id: &str) -> Result<()> {
    let order = marketplace.checkout().order(&OrderId::new(id)).await?;
    print_order(&order);
    println!("  ship to: {}, {}, {} {}",
        order.shipping_address.full_name,
        order.shipping_address.street,
        order.shipping_address.postal_code,
        order.shipping_address.city,
    );
    for item in &order.items {
        println!("  {} x{} @ {}", item.name, item.quantity, item.discounted_unit_price);
    }
    Ok(())
}
