//! # Secret Retrieval
//!
//! [`SecretFetcher`] turns a [`SecretSpec`](crate::config::SecretSpec) into a
//! value and version:
//!
//! 1. A fresh [`SecretCache`] entry for the source path is returned as is.
//! 2. Otherwise the item is described to learn its declared type and last
//!    version. The deprecated `secretType` hint is never consulted.
//! 3. The value is retrieved per type:
//!    - `STATIC_SECRET`: the raw value keyed by item name
//!    - `CERTIFICATE`: the certificate object serialized as JSON
//!    - `ROTATED_SECRET`: the `value` field, pretty-printed JSON
//! 4. The cache entry is overwritten with the new value and version.
//!
//! Values travel as [`SecretString`] so they never show up in logs.

pub mod cache;
pub mod fetcher;
pub mod types;

pub use cache::{CachedSecret, SecretCache, DEFAULT_TTL};
pub use fetcher::{FetchedSecret, SecretFetcher};
pub use types::SecretString;
