//! Rendezvous Core - Synchronization Strategy Engine
//!
//! Runs the classic coordination problems (bounded buffer, readers-writers,
//! dining philosophers, sleeping barber, cigarette smokers, virtual
//! assistants) on real threads and lets a caller swap, at runtime, the
//! discipline that coordinates them:
//!
//! 1. **Mutex**: one lock and a busy-wait retry loop
//! 2. **Semaphore**: counting semaphores, FIFO-fair
//! 3. **Monitor**: one lock plus condition variables
//! 4. **Barrier**: forced rendezvous of a fixed party with an auxiliary lock
//! 5. **Deadlock** (dining only): left fork, rendezvous, right fork, forever
//!
//! # Architecture
//!
//! ```text
//! Controller ──select()──► Strategy (Runner<P: Protocol>)
//!     │                        │ one thread per resident actor / spawner
//!     │                        ▼
//!     │                  P::round(): acquire ─► use ─► release
//!     │                        │                  │
//!     ▼                        ▼                  ▼
//! ResourceModel ◄──── primitives (Lock, Semaphore, Monitor, Barrier)
//!                              │
//!                              └──► Port<Point> ──► Listener (optional)
//! ```
//!
//! Every blocking primitive observes a [`CancelToken`](rendezvous_env::CancelToken),
//! so `stop()` returns promptly even from the deadlock demonstration.

pub mod actor;
pub mod config;
pub mod controller;
pub mod error;
pub mod instrument;
pub mod primitives;
pub mod problem;
pub mod problems;
pub mod runner;
pub mod strategy;

// Re-export key types for convenience
pub use actor::{Actor, ActorSnapshot, ActorState, Position, Priority, Role, Roster};
pub use config::{EngineConfig, RwPolicy, Timing, MAX_PAUSE_MS};
pub use controller::Controller;
pub use error::SyncError;
pub use instrument::{channel, ChannelListener, Listener, Notice, Port, TracingListener};
pub use primitives::{Primitive, PrimitiveStatus};
pub use problem::{Discipline, Problem};
pub use problems::ResourceModel;
pub use strategy::{StopReport, Strategy};
