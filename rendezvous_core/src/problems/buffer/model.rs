//! Bounded buffer tank.

use crate::actor::Roster;
use crate::config::BufferConfig;
use crate::problems::{ResourceModel, Violations};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const MODEL: &str = "buffer";

/// A tank of `slots` units shared by producers and consumers.
pub struct BufferModel {
    config: BufferConfig,
    roster: Roster,
    level: AtomicUsize,
    produced: AtomicU64,
    consumed: AtomicU64,
    low: AtomicUsize,
    high: AtomicUsize,
    violations: Violations,
}

impl BufferModel {
    pub fn new(config: BufferConfig, live_cap: usize) -> Self {
        let initial = config.initial_level;
        Self {
            config,
            roster: Roster::new(live_cap),
            level: AtomicUsize::new(initial),
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            low: AtomicUsize::new(initial),
            high: AtomicUsize::new(initial),
            violations: Violations::default(),
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn slots(&self) -> usize {
        self.config.slots
    }

    pub fn initial_level(&self) -> usize {
        self.config.initial_level
    }

    pub fn level(&self) -> usize {
        self.level.load(Ordering::SeqCst)
    }

    pub fn is_full(&self) -> bool {
        self.level() >= self.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.level() == 0
    }

    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Lowest level seen since the last reset.
    pub fn low_watermark(&self) -> usize {
        self.low.load(Ordering::SeqCst)
    }

    /// Highest level seen since the last reset.
    pub fn high_watermark(&self) -> usize {
        self.high.load(Ordering::SeqCst)
    }

    /// Adds one unit. Returns the new level.
    pub(crate) fn deposit(&self) -> usize {
        let slots = self.slots();
        match self
            .level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |l| (l < slots).then_some(l + 1))
        {
            Ok(before) => {
                self.produced.fetch_add(1, Ordering::SeqCst);
                self.high.fetch_max(before + 1, Ordering::SeqCst);
                before + 1
            }
            Err(level) => {
                self.violations.record(MODEL, "deposit into a full tank");
                level
            }
        }
    }

    /// Removes one unit. Returns the new level.
    pub(crate) fn withdraw(&self) -> usize {
        match self
            .level
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |l| l.checked_sub(1))
        {
            Ok(before) => {
                self.consumed.fetch_add(1, Ordering::SeqCst);
                self.low.fetch_min(before - 1, Ordering::SeqCst);
                before - 1
            }
            Err(level) => {
                self.violations.record(MODEL, "withdraw from an empty tank");
                level
            }
        }
    }

    /// `produced - consumed` must equal the level change since reset.
    pub fn is_balanced(&self) -> bool {
        let net = self.produced() as i128 - self.consumed() as i128;
        net == self.level() as i128 - self.initial_level() as i128
    }
}

impl ResourceModel for BufferModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        let initial = self.initial_level();
        self.level.store(initial, Ordering::SeqCst);
        self.produced.store(0, Ordering::SeqCst);
        self.consumed.store(0, Ordering::SeqCst);
        self.low.store(initial, Ordering::SeqCst);
        self.high.store(initial, Ordering::SeqCst);
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count()
    }

    fn progress(&self) -> u64 {
        self.produced() + self.consumed()
    }
}
