//! Common identifier types for the Rendezvous engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a simulated actor.
///
/// Allocated sequentially by the roster that owns the actor, so ids are
/// unique for the lifetime of a resource model and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Returns the raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for one start/stop cycle of a strategy.
///
/// Uses UUID v4 so runs can be told apart in logs and harness reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a new random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic RunId from a seed (for seeded harness runs).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_from_seed_is_stable() {
        assert_eq!(RunId::from_seed(7), RunId::from_seed(7));
        assert_ne!(RunId::from_seed(7), RunId::from_seed(8));
        assert_eq!(RunId::from_seed(7).to_string().len(), 8);
    }

    #[test]
    fn test_actor_id_display() {
        assert_eq!(ActorId(12).to_string(), "#12");
        assert_eq!(ActorId(12).get(), 12);
    }
}
