//! Engine configuration.
//!
//! Every section has defaults matching the classroom setup (a 20-slot tank
//! starting half full, five philosophers, five waiting seats, three smokers),
//! so a partial JSON file only needs the values it changes.

use crate::error::SyncError;
use rendezvous_env::EnvError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest configurable pause, in milliseconds.
pub const MAX_PAUSE_MS: u64 = 60_000;

/// Top-level configuration for a [`Controller`](crate::Controller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Producer/consumer tank
    pub buffer: BufferConfig,

    /// Readers-writers record
    pub readers_writers: ReadersWritersConfig,

    /// Dining table
    pub dining: DiningConfig,

    /// Barber shop
    pub barber: BarberConfig,

    /// Assistant desk and token bucket
    pub assistants: AssistantsConfig,

    /// Maximum number of concurrently live actors a spawner may admit
    pub live_actor_cap: usize,

    /// Simulated work durations
    pub timing: Timing,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            readers_writers: ReadersWritersConfig::default(),
            dining: DiningConfig::default(),
            barber: BarberConfig::default(),
            assistants: AssistantsConfig::default(),
            live_actor_cap: 12,
            timing: Timing::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SyncError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses a configuration from JSON text and validates it.
    pub fn from_json_str(raw: &str) -> Result<Self, SyncError> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no strategy can honour.
    pub fn validate(&self) -> Result<(), SyncError> {
        let b = &self.buffer;
        if b.slots == 0 {
            return Err(SyncError::invalid("buffer.slots must be at least 1"));
        }
        if b.initial_level > b.slots {
            return Err(SyncError::invalid(format!(
                "buffer.initial_level {} exceeds slots {}",
                b.initial_level, b.slots
            )));
        }
        if b.producers == 0 || b.consumers == 0 {
            return Err(SyncError::invalid("buffer needs at least one producer and one consumer"));
        }

        let rw = &self.readers_writers;
        if rw.readers + rw.writers == 0 {
            return Err(SyncError::invalid("readers_writers needs at least one actor"));
        }

        if self.dining.philosophers < 2 {
            return Err(SyncError::invalid("dining.philosophers must be at least 2"));
        }

        if self.barber.waiting_seats == 0 {
            return Err(SyncError::invalid("barber.waiting_seats must be at least 1"));
        }

        let a = &self.assistants;
        if a.assistants == 0 {
            return Err(SyncError::invalid("assistants.assistants must be at least 1"));
        }
        if a.bucket_capacity == 0 || a.initial_tokens > a.bucket_capacity {
            return Err(SyncError::invalid(format!(
                "assistants.initial_tokens {} must fit a non-empty bucket of {}",
                a.initial_tokens, a.bucket_capacity
            )));
        }
        if !(0.0..=1.0).contains(&a.high_priority_share) {
            return Err(SyncError::invalid("assistants.high_priority_share must lie in [0, 1]"));
        }

        if self.live_actor_cap == 0 {
            return Err(SyncError::invalid("live_actor_cap must be at least 1"));
        }
        // A barrier batch needs `assistants` spawned customers live at once
        if self.live_actor_cap < a.assistants {
            return Err(SyncError::invalid(format!(
                "live_actor_cap {} must be at least assistants.assistants {}",
                self.live_actor_cap, a.assistants
            )));
        }

        self.timing.validate()?;
        Ok(())
    }
}

/// Bounded buffer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Tank capacity (SLOTS)
    pub slots: usize,
    /// Level at the start of every run
    pub initial_level: usize,
    pub producers: usize,
    pub consumers: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            slots: 20,
            initial_level: 10,
            producers: 1,
            consumers: 1,
        }
    }
}

/// Which side a readers-writers strategy favours when both are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RwPolicy {
    /// Readers keep streaming in while any reader is active
    ReaderPreference,
    /// No new reader is admitted while a writer is queued
    WriterPreference,
}

/// Readers-writers settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadersWritersConfig {
    pub readers: usize,
    pub writers: usize,
    /// Used by the semaphore and monitor strategies
    pub policy: RwPolicy,
}

impl Default for ReadersWritersConfig {
    fn default() -> Self {
        Self {
            readers: 4,
            writers: 2,
            policy: RwPolicy::WriterPreference,
        }
    }
}

/// Dining philosophers settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiningConfig {
    pub philosophers: usize,
}

impl Default for DiningConfig {
    fn default() -> Self {
        Self { philosophers: 5 }
    }
}

/// Sleeping barber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarberConfig {
    pub waiting_seats: usize,
}

impl Default for BarberConfig {
    fn default() -> Self {
        Self { waiting_seats: 5 }
    }
}

/// Virtual assistants settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantsConfig {
    /// Number of assistant slots
    pub assistants: usize,
    /// Token bucket capacity
    pub bucket_capacity: usize,
    /// Tokens in the bucket at the start of every run
    pub initial_tokens: usize,
    /// Fraction of arrivals that are high priority
    pub high_priority_share: f64,
}

impl Default for AssistantsConfig {
    fn default() -> Self {
        Self {
            assistants: 3,
            bucket_capacity: 5,
            initial_tokens: 3,
            high_priority_share: 0.3,
        }
    }
}

/// Simulated work durations, in milliseconds.
///
/// These bound how long an actor holds a resource or rests between rounds;
/// they are not animation pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Time spent using a granted resource
    pub use_ms: u64,
    /// Time spent idle between rounds
    pub rest_ms: u64,
    /// Back-off between busy-wait attempts
    pub retry_ms: u64,
    /// Gap between spawner arrivals
    pub arrival_ms: u64,
    /// Gap between token refills
    pub refill_ms: u64,
    /// Random spread applied to every duration, in [0, 1]
    pub jitter: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            use_ms: 30,
            rest_ms: 15,
            retry_ms: 3,
            arrival_ms: 25,
            refill_ms: 20,
            jitter: 0.5,
        }
    }
}

impl Timing {
    /// A compressed profile for tests.
    pub fn brisk() -> Self {
        Self {
            use_ms: 4,
            rest_ms: 2,
            retry_ms: 1,
            arrival_ms: 3,
            refill_ms: 2,
            jitter: 0.5,
        }
    }

    /// Rejects a jitter outside [0, 1] and any pause over [`MAX_PAUSE_MS`].
    pub fn validate(&self) -> Result<(), SyncError> {
        EnvError::check_spread(self.jitter)?;
        let pauses = [
            ("use_ms", self.use_ms),
            ("rest_ms", self.rest_ms),
            ("retry_ms", self.retry_ms),
            ("arrival_ms", self.arrival_ms),
            ("refill_ms", self.refill_ms),
        ];
        for (name, ms) in pauses {
            if ms > MAX_PAUSE_MS {
                return Err(SyncError::invalid(format!(
                    "timing.{} {} exceeds {} ms",
                    name, ms, MAX_PAUSE_MS
                )));
            }
        }
        Ok(())
    }

    pub fn use_time(&self) -> Duration {
        Duration::from_millis(self.use_ms)
    }

    pub fn rest_time(&self) -> Duration {
        Duration::from_millis(self.rest_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    pub fn arrival_gap(&self) -> Duration {
        Duration::from_millis(self.arrival_ms)
    }

    pub fn refill_gap(&self) -> Duration {
        Duration::from_millis(self.refill_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer.slots, 20);
        assert_eq!(config.buffer.initial_level, 10);
        assert_eq!(config.dining.philosophers, 5);
        assert_eq!(config.barber.waiting_seats, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "buffer": { "slots": 8, "initial_level": 2 }, "readers_writers": { "policy": "reader_preference" } }"#,
        )
        .unwrap();
        assert_eq!(config.buffer.slots, 8);
        assert_eq!(config.buffer.producers, 1);
        assert_eq!(config.readers_writers.policy, RwPolicy::ReaderPreference);
        assert_eq!(config.timing, Timing::default());
    }

    #[test]
    fn test_rejects_cap_too_small_for_a_batch() {
        let mut config = EngineConfig::default();
        config.live_actor_cap = config.assistants.assistants - 1;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
        config.live_actor_cap = config.assistants.assistants;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_overfull_initial_level() {
        let mut config = EngineConfig::default();
        config.buffer.initial_level = 21;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_lonely_philosopher() {
        let mut config = EngineConfig::default();
        config.dining.philosophers = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_jitter() {
        let mut config = EngineConfig::default();
        config.timing.jitter = 1.5;
        assert!(matches!(config.validate(), Err(SyncError::Env(_))));
    }

    #[test]
    fn test_rejects_pauses_over_a_minute() {
        let mut config = EngineConfig::default();
        config.timing.refill_ms = MAX_PAUSE_MS;
        assert!(config.validate().is_ok());

        config.timing.refill_ms = u64::MAX;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let err = EngineConfig::from_json_str(r#"{ "timing": { "use_ms": 60001 } }"#).unwrap_err();
        assert!(err.to_string().contains("use_ms"));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(SyncError::ConfigParse(_))
        ));
    }
}
