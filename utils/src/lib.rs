//! Shared utilities for the Agora platform.

pub mod locks;
pub mod logging;
pub mod time;

pub use locks::KeyedLocks;
pub use logging::{init_logging, LogFormat};
pub use time::format_duration;
