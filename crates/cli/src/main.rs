//! Vendora CLI - exercise the client SDK against a live backend.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (persists the credential to VENDORA_AUTH_FILE if set)
//! vendora account login -e ada@example.com -p secret
//!
//! # Cart operations
//! vendora cart show
//! vendora cart add -p p-1 -q 2
//! vendora cart remove -i ci-1
//!
//! # Checkout with cash on delivery
//! vendora checkout submit --name "Ada Lovelace" --street "12 Analytical Way" \
//!     --city London --postal 10115 --phone "+44 20 7946 0321" --method cash
//!
//! # Order history
//! vendora orders list
//! ```
//!
//! # Environment Variables
//!
//! - `VENDORA_API_URL` - Base URL of the marketplace backend (required)
//! - `VENDORA_AUTH_FILE` - Where to persist the session between invocations

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use vendora_client::{ClientConfig, Marketplace};

mod commands;

#[derive(Parser)]
#[command(name = "vendora")]
#[command(author, version, about = "Vendora marketplace client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the signed-in account
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Inspect and mutate the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place orders and handle payment returns
    Checkout {
        #[command(subcommand)]
        action: CheckoutAction,
    },
    /// Browse order history
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Show the current profile (re-fetched from the backend)
    Profile,
    /// Sign out
    Logout,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the current cart
    Show,
    /// Add a product
    Add {
        /// Product id
        #[arg(short, long)]
        product: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
        /// Variant selection as JSON (e.g. '{"size":"M","color":"navy"}')
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Change an item's quantity
    Update {
        /// Cart item id
        #[arg(short, long)]
        item: String,
        #[arg(short, long)]
        quantity: u32,
    },
    /// Remove an item
    Remove {
        /// Cart item id
        #[arg(short, long)]
        item: String,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum CheckoutAction {
    /// Validate, place the order, and branch on payment method
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        street: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        postal: String,
        #[arg(long)]
        phone: String,
        /// Payment method: `cash` or `online`
        #[arg(long, default_value = "cash")]
        method: String,
    },
    /// Preview totals for the current cart
    Preview,
    /// Request a fresh payment session for a pending online order
    Pay {
        /// Order id
        #[arg(short, long)]
        order: String,
    },
    /// Confirm a return from the hosted payment page
    Verify {
        /// External payment session id
        #[arg(short, long)]
        session: Option<String>,
        /// Order id
        #[arg(short, long)]
        order: Option<String>,
        /// The user cancelled on the payment page
        #[arg(long, default_value_t = false)]
        cancelled: bool,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List the order history
    List,
    /// Show one order
    Show {
        /// Order id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let marketplace = Marketplace::new(config)?;

    // Pick up the persisted session (if any) before running the command.
    marketplace.hydrate().await?;

    match cli.command {
        Commands::Account { action } => match action {
            AccountAction::Login { email, password } => {
                commands::account::login(&marketplace, &email, &password).await?;
            }
            AccountAction::Register {
                name,
                email,
                password,
            } => {
                commands::account::register(&marketplace, &name, &email, &password).await?;
            }
            AccountAction::Profile => commands::account::profile(&marketplace).await?,
            AccountAction::Logout => commands::account::logout(&marketplace).await,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&marketplace).await?,
            CartAction::Add {
                product,
                quantity,
                variant,
            } => {
                commands::cart::add(&marketplace, &product, quantity, variant.as_deref()).await?;
            }
            CartAction::Update { item, quantity } => {
                commands::cart::update(&marketplace, &item, quantity).await?;
            }
            CartAction::Remove { item } => commands::cart::remove(&marketplace, &item).await?,
            CartAction::Clear => commands::cart::clear(&marketplace).await?,
        },
        Commands::Checkout { action } => match action {
            CheckoutAction::Submit {
                name,
                street,
                city,
                postal,
                phone,
                method,
            } => {
                commands::checkout::submit(
                    &marketplace,
                    &name,
                    &street,
                    &city,
                    &postal,
                    &phone,
                    &method,
                )
                .await?;
            }
            CheckoutAction::Preview => commands::checkout::preview(&marketplace).await?,
            CheckoutAction::Pay { order } => commands::checkout::pay(&marketplace, &order).await?,
            CheckoutAction::Verify {
                session,
                order,
                cancelled,
            } => {
                commands::checkout::verify(
                    &marketplace,
                    session.as_deref(),
                    order.as_deref(),
                    cancelled,
                )
                .await?;
            }
        },
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::orders::list(&marketplace).await?,
            OrdersAction::Show { id } => commands::orders::show(&marketplace, &id).await?,
        },
    }
    Ok(())
}
