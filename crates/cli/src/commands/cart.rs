//! Cart commands.

use vendora_client::{Cart, ClientError, Marketplace, Result};
use vendora_core::{CartItemId, ProductId, VariantSelection};

#[allow(clippy::print_stdout)]
fn print_cart(cart: &Cart) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    println!("Cart ({} items):", cart.item_count);
    for item in &cart.items {
        let variant = item
            .variant
            .as_ref()
            .map(|v| format!(" [{}]", describe_variant(v)))
            .unwrap_or_default();
        println!(
            "  {} x{} @ {} (was {}){variant}  [{}]",
            item.name, item.quantity, item.discounted_unit_price, item.unit_price, item.id
        );
    }
}

fn describe_variant(variant: &VariantSelection) -> String {
    match variant {
        VariantSelection::Legacy { size, color } => format!("size={size}, color={color}"),
        VariantSelection::Dynamic(options) => options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub async fn show(marketplace: &Marketplace) -> Result<()> {
    let cart = marketplace.cart().fetch().await?;
    print_cart(&cart);
    Ok(())
}

pub async fn add(
    marketplace: &Marketplace,
    product: &str,
    quantity: u32,
    variant: Option<&str>,
) -> Result<()> {
    let variant = variant
        .map(serde_json::from_str::<VariantSelection>)
        .transpose()
        .map_err(ClientError::Parse)?;
    let cart = marketplace
        .cart()
        .add(ProductId::new(product), quantity, variant)
        .await?;
    print_cart(&cart);
    Ok(())
}

pub async fn update(marketplace: &Marketplace, item: &str, quantity: u32) -> Result<()> {
    let cart = marketplace
        .cart()
        .update_quantity(CartItemId::new(item), quantity)
        .await?;
    print_cart(&cart);
    Ok(())
}

pub async fn remove(marketplace: &Marketplace, item: &str) -> Result<()> {
    let cart = marketplace.cart().remove(&CartItemId::new(item)).await?;
    print_cart(&cart);
    Ok(())
}

pub async fn clear(marketplace: &Marketplace) -> Result<()> {
    let cart = marketplace.cart().clear().await?;
    print_cart(&cart);
    Ok(())
}
