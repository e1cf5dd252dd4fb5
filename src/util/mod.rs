//! Small utilities shared across the crate.

pub mod fingerprint;

pub use fingerprint::{Fingerprint, FingerprintHasher};
