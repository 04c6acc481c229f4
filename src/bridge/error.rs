//! Error definitions for the bridge module.

use crate::client::ClientError;
use crate::config::ConfigError;
use thiserror::Error;

/// Failure modes of the bridge lifecycle.
///
/// Once the worker runs, connection trouble is logged instead of raised;
/// these errors only surface at startup and shutdown.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration rejected before anything was started
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    /// Broker unreachable or the session could not be opened
    #[error("connection setup failed: {0}")]
    Setup(#[from] ClientError),

    /// Worker task ended abnormally
    #[error("bridge task panicked: {0}")]
    TaskPanicked(String),
}
