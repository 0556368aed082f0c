//! Agora platform node: wires the review, trust and wallet engines.
//!
//! The [`Platform`] facade is what outer surfaces (HTTP handlers, the
//! daemon, module integrations) call into. It owns:
//! - the review engine and its per-module finalize hooks
//! - wallet operations, escrow and the posting scheduler
//! - reputation, vote-weight and stake engines
//! - Prometheus counters for the decisions and money movements above

pub mod config;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod settlement;
pub mod shutdown;

pub use agora_utils::{init_logging, LogFormat};
pub use config::PlatformConfig;
pub use error::NodeError;
pub use metrics::PlatformMetrics;
pub use platform::Platform;
pub use settlement::EscrowSettlementHook;
pub use shutdown::ShutdownController;
