//! Core types for Vendora.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod status;
pub mod variant;

pub use id::*;
pub use money::Money;
pub use status::*;
pub use variant::VariantSelection;
