//! Upstream adapters.

pub mod rise;

pub use rise::{RiseSource, RISE_BASE_URL};
