//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (clock, storage) are abstracted behind traits. This
//! crate provides implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem
//!
//! `NullStore` doubles as the in-memory backend for ephemeral deployments.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullStore;
