//! URL handling module for Sumi-Harvest
//!
//! Canonicalization (used for link dedupe and item keys) and resolution of
//! links found on listing pages.

mod normalize;

pub use normalize::{canonicalize_url, resolve_link};
