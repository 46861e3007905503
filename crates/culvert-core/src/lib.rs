//! culvert-core — shared domain primitives.
//!
//! Holds the types every other crate agrees on: runtime and run-type
//! enums, the compilation request that flows from the gateway into the
//! compiler, the function metadata the compiler writes and the
//! orchestrator reads, plus id, clock, and credential helpers.

pub mod auth;
pub mod types;

pub use types::*;

/// Generate a fresh opaque identifier (uuid v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Unix timestamp in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
