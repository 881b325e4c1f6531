//! # Error Handling
//!
//! Error types for the provider, defined with `thiserror`.
//!
//! Every failure a mount request can hit maps to exactly one
//! [`ProviderError`] variant. Variants carry the operation, item name and
//! gateway URL where relevant so a failed mount can be diagnosed from the
//! driver logs alone.

pub mod types;

pub use types::{ParseStage, ProviderError, Result};
