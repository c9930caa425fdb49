//! Rendezvous Environment Abstraction Layer
//!
//! This crate isolates everything a coordination strategy needs from "the
//! outside world" so the same strategy code runs against the wall clock or
//! against a seeded, time-scaled environment in the harness.
//!
//! # Core Concept: Cancellable Pacing
//!
//! Strategy workers never call `std::thread::sleep` directly. They go through
//! a [`SyncContext`], which provides:
//! - Time (`now()`, `sleep()` that observes a [`CancelToken`])
//! - Bounded randomness (`jitter()`, `pick()`)
//!
//! Every blocking call takes a [`CancelToken`] and returns [`Cancelled`] once
//! the token trips, within one [`WAIT_SLICE`].
//!
//! # Example
//!
//! ```ignore
//! use rendezvous_env::{CancelToken, SyncContext, SystemContext};
//!
//! fn worker(ctx: &dyn SyncContext, cancel: &CancelToken) -> Result<(), Cancelled> {
//!     loop {
//!         ctx.sleep(ctx.jitter(Duration::from_millis(40), 0.5), cancel)?;
//!     }
//! }
//! ```

mod cancel;
mod context;
mod error;
mod system;
mod types;

pub use cancel::{CancelToken, Cancelled, WAIT_SLICE};
pub use context::SyncContext;
pub use error::EnvError;
pub use system::SystemContext;
pub use types::{ActorId, RunId};
