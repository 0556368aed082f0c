//! LMDB storage backend for the Agora platform.
//!
//! Implements every storage trait from `agora-store` using the `heed` LMDB
//! bindings. Each entity family maps to one named database inside a single
//! environment, so multi-record commits share one write transaction.
//! Values are JSON blobs; keys are `\x1f`-separated composite strings.

pub mod environment;
pub mod error;
pub mod ledger;
pub mod review;
pub mod trust;

pub use environment::LmdbStore;
pub use error::LmdbError;
