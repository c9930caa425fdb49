//! Error types for the Rendezvous environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    /// Time scale must be a positive, finite factor
    #[error("Invalid time scale: {0}")]
    InvalidTimeScale(f64),

    /// Jitter spread must lie in [0, 1]
    #[error("Invalid jitter spread: {0}")]
    InvalidSpread(f64),
}

impl EnvError {
    /// Validates a time scale factor.
    pub fn check_time_scale(scale: f64) -> Result<f64, Self> {
        if scale.is_finite() && scale > 0.0 {
            Ok(scale)
        } else {
            Err(Self::InvalidTimeScale(scale))
        }
    }

    /// Validates a jitter spread fraction.
    pub fn check_spread(spread: f64) -> Result<f64, Self> {
        if (0.0..=1.0).contains(&spread) {
            Ok(spread)
        } else {
            Err(Self::InvalidSpread(spread))
        }
    }
}
