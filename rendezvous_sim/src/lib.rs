//! Rendezvous Scenario Harness
//!
//! Runs every problem × discipline combination of the engine against a
//! seeded context and checks what a correct run must show:
//!
//! - **Safety**: sampled model bounds hold and the models record no
//!   violations
//! - **Progress**: every discipline except the deadlock demonstration
//!   completes rounds; the deadlock demonstration completes none
//! - **Teardown**: `stop()` returns within a second and leaves every
//!   primitive at rest
//!
//! # Architecture
//!
//! ```text
//! ScenarioRunner ──► Controller (SeededContext: seeded draws, scaled clock)
//!       │                 │
//!       │ sample          ▼
//!       ├────────► ResourceModel bounds
//!       │
//!       │ stop
//!       └────────► StopReport + violations + progress ──► ScenarioResult
//! ```
//!
//! Thread interleavings stay with the OS scheduler, so a seed reproduces
//! the random draws of a run, not its exact schedule.
//!
//! # Usage
//!
//! ```ignore
//! use rendezvous_core::EngineConfig;
//! use rendezvous_sim::{Scenario, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(42, EngineConfig::default()).with_duration(1.0);
//! for scenario in Scenario::all() {
//!     let result = runner.run(scenario);
//!     assert!(result.passed, "{:?}", result.failure_reason);
//! }
//! ```

mod context;
pub mod runner;
pub mod scenarios;

pub use context::SeededContext;
pub use runner::{ScenarioResult, ScenarioRunner, Tally};
pub use scenarios::Scenario;
