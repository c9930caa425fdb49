//! Error types for the strategy engine.

use crate::problem::{Discipline, Problem};
use rendezvous_env::EnvError;
use thiserror::Error;

/// Errors surfaced by strategy construction and lifecycle management.
///
/// Cancellation is deliberately absent: a stopped run is reported through
/// [`rendezvous_env::Cancelled`] inside the workers and never escapes them.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The discipline has no strategy for this problem
    #[error("{discipline} is not supported for {problem}")]
    Unsupported {
        problem: Problem,
        discipline: Discipline,
    },

    /// Configuration values that no strategy can honour
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The live-actor cap refused a new arrival
    #[error("Live-actor cap of {cap} reached")]
    CapacityReached { cap: usize },

    /// The OS refused to start a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),

    /// Reading a configuration file failed
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for `EngineConfig`
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Environment layer rejected a setting
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl SyncError {
    /// Creates an invalid-configuration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
