//! Vendora Core - Shared types library.
//!
//! This crate provides common domain types used across all Vendora components:
//! - `client` - Storefront client SDK (sessions, cart, checkout)
//! - `cli` - Command-line harness for exercising the SDK
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and money, plus the
//!   role/payment enums and variant-selection union shared by the SDK.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
