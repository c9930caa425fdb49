//! Shared record guarded by the readers-writers discipline.

use crate::actor::Roster;
use crate::config::ReadersWritersConfig;
use crate::problems::{ResourceModel, Violations};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const MODEL: &str = "readers_writers";

/// Reader/writer occupancy of one shared record.
pub struct RwModel {
    config: ReadersWritersConfig,
    roster: Roster,
    readers: AtomicUsize,
    writers: AtomicUsize,
    writers_waiting: AtomicUsize,
    max_readers: AtomicUsize,
    reads: AtomicU64,
    writes: AtomicU64,
    violations: Violations,
}

impl RwModel {
    pub fn new(config: ReadersWritersConfig, live_cap: usize) -> Self {
        Self {
            config,
            roster: Roster::new(live_cap),
            readers: AtomicUsize::new(0),
            writers: AtomicUsize::new(0),
            writers_waiting: AtomicUsize::new(0),
            max_readers: AtomicUsize::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            violations: Violations::default(),
        }
    }

    pub fn config(&self) -> &ReadersWritersConfig {
        &self.config
    }

    pub fn readers_active(&self) -> usize {
        self.readers.load(Ordering::SeqCst)
    }

    pub fn writers_active(&self) -> usize {
        self.writers.load(Ordering::SeqCst)
    }

    pub fn writers_waiting(&self) -> usize {
        self.writers_waiting.load(Ordering::SeqCst)
    }

    /// Most readers ever inside at once.
    pub fn max_readers(&self) -> usize {
        self.max_readers.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Completed writes; doubles as the record's version.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Marks a writer as queued until the guard drops.
    pub(crate) fn queue_writer(&self) -> QueuedWriter<'_> {
        self.writers_waiting.fetch_add(1, Ordering::SeqCst);
        QueuedWriter { model: self }
    }

    pub(crate) fn begin_read(&self) -> ReadSession<'_> {
        if self.writers_active() > 0 {
            self.violations.record(MODEL, "reader entered while a writer is active");
        }
        let now = self.readers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_readers.fetch_max(now, Ordering::SeqCst);
        ReadSession { model: self }
    }

    pub(crate) fn begin_write(&self) -> WriteSession<'_> {
        let others = self.writers.fetch_add(1, Ordering::SeqCst);
        if others > 0 {
            self.violations.record(MODEL, "two writers active");
        }
        if self.readers_active() > 0 {
            self.violations.record(MODEL, "writer entered while readers are active");
        }
        WriteSession { model: self }
    }
}

impl ResourceModel for RwModel {
    fn roster(&self) -> &Roster {
        &self.roster
    }

    fn reset(&self) {
        self.readers.store(0, Ordering::SeqCst);
        self.writers.store(0, Ordering::SeqCst);
        self.writers_waiting.store(0, Ordering::SeqCst);
        self.max_readers.store(0, Ordering::SeqCst);
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.violations.reset();
        self.roster.clear();
    }

    fn violations(&self) -> u64 {
        self.violations.count()
    }

    fn progress(&self) -> u64 {
        self.reads() + self.writes()
    }
}

/// A reader inside the record.
#[must_use]
pub(crate) struct ReadSession<'a> {
    model: &'a RwModel,
}

impl Drop for ReadSession<'_> {
    fn drop(&mut self) {
        self.model.readers.fetch_sub(1, Ordering::SeqCst);
        self.model.reads.fetch_add(1, Ordering::SeqCst);
    }
}

/// The writer inside the record.
#[must_use]
pub(crate) struct WriteSession<'a> {
    model: &'a RwModel,
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        self.model.writes.fetch_add(1, Ordering::SeqCst);
        self.model.writers.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct QueuedWriter<'a> {
    model: &'a RwModel,
}

impl Drop for QueuedWriter<'_> {
    fn drop(&mut self) {
        self.model.writers_waiting.fetch_sub(1, Ordering::SeqCst);
    }
}
