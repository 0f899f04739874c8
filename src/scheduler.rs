//! Virtual-time scheduler.
//!
//! Callbacks are stored against a due tick and executed synchronously, in
//! order, when the caller drives the clock with `advance_to`, `advance_by` or
//! `run`. Nothing here sleeps or spawns.
//!
//! # Invariants
//!
//! - **Tick order:** a task due at `a` completes before a task due at `b > a` starts
//! - **Stable ties:** tasks with equal due ticks run in scheduling (seq) order
//! - **Folded recursion:** tasks scheduled during a drain run in the same drain
//!   when their due tick is within the drive target
//! - **Monotone clock:** the clock never moves backwards; overdue tasks run at `now`
//! - **Identity cancellation:** a handle removes exactly its own task, at most once

use crate::config::HarnessConfig;
use crate::error::{self, Error, Result};
use crate::marble::{INFINITE, Tick};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

/// Heap entries beyond this many tombstones trigger a compaction.
const TOMBSTONE_SLACK: usize = 64;

/// Monotonically increasing sequence counter for deterministic ordering.
///
/// Also serves as the identity of a scheduled task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(u64);

impl Seq {
    /// The first sequence value handed out by a scheduler.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The sequence value after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Heap key of a scheduled task.
#[derive(Debug, Clone, Copy)]
struct TaskEntry {
    due: Tick,
    seq: Seq,
}

impl TaskEntry {
    const fn new(due: Tick, seq: Seq) -> Self {
        Self { due, seq }
    }
}

// Order by (due, seq) ascending - min-heap needs reversed comparison.
impl PartialEq for TaskEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TaskEntry {}

impl PartialOrd for TaskEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.due.cmp(&self.due) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// A source of "now" in virtual ticks.
pub trait Clock {
    fn now(&self) -> Tick;
}

/// Shared virtual tick counter.
///
/// Clones observe the same clock. Only the scheduler moves it.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    current: Rc<Cell<Tick>>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(start: Tick) -> Self {
        Self {
            current: Rc::new(Cell::new(start)),
        }
    }

    pub(crate) fn set(&self, tick: Tick) {
        self.current.set(tick);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Tick {
        self.current.get()
    }
}

/// Scheduled work. Receives the scheduler so it can schedule follow-ups.
pub type Callback = Box<dyn FnOnce(&TestScheduler) -> Result<()>>;

/// Pending callbacks keyed by `(due, seq)`.
///
/// Cancellation removes the callback slot and leaves the heap entry behind as
/// a tombstone that is skipped when it surfaces.
#[derive(Default)]
struct TaskStore {
    seq: Seq,
    heap: BinaryHeap<TaskEntry>,
    slots: HashMap<Seq, Callback>,
}

impl TaskStore {
    fn insert(&mut self, due: Tick, callback: Callback) -> Seq {
        let seq = self.seq;
        self.seq = self.seq.next();
        self.heap.push(TaskEntry::new(due, seq));
        self.slots.insert(seq, callback);
        seq
    }

    fn reinsert(&mut self, entry: TaskEntry, callback: Callback) {
        self.heap.push(entry);
        self.slots.insert(entry.seq, callback);
    }

    fn cancel(&mut self, seq: Seq) -> bool {
        let removed = self.slots.remove(&seq).is_some();
        if removed && self.heap.len() > self.slots.len() * 2 + TOMBSTONE_SLACK {
            let slots = &self.slots;
            self.heap.retain(|entry| slots.contains_key(&entry.seq));
        }
        removed
    }

    /// Removes the earliest live task due at or before `limit`.
    fn pop_due(&mut self, limit: Tick) -> Option<(TaskEntry, Callback)> {
        while let Some(entry) = self.heap.peek().copied() {
            if entry.due > limit {
                return None;
            }
            self.heap.pop();
            if let Some(callback) = self.slots.remove(&entry.seq) {
                return Some((entry, callback));
            }
            tracing::trace!(
                event = "scheduler.task.skip_cancelled",
                due = entry.due,
                seq = %entry.seq,
                "Skipped cancelled task"
            );
        }
        None
    }

    fn next_due(&self) -> Option<Tick> {
        self.heap
            .iter()
            .filter(|entry| self.slots.contains_key(&entry.seq))
            .map(|entry| entry.due)
            .min()
    }
}

struct SchedulerState {
    store: TaskStore,
    running: bool,
}

/// Cancellation handle returned by `schedule_*`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    seq: Seq,
    due: Tick,
    state: Weak<RefCell<SchedulerState>>,
}

impl TaskHandle {
    #[must_use]
    pub const fn seq(&self) -> Seq {
        self.seq
    }

    #[must_use]
    pub const fn due(&self) -> Tick {
        self.due
    }

    /// Removes the task if it is still pending.
    ///
    /// Returns `false` when the task already ran, is running right now, was
    /// cancelled before, or its scheduler is gone.
    pub fn cancel(&self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let cancelled = state.borrow_mut().store.cancel(self.seq);
        tracing::trace!(
            event = "scheduler.task.cancel",
            due = self.due,
            seq = %self.seq,
            cancelled,
            "Task cancelled"
        );
        cancelled
    }
}

/// Resets the running flag when a drive call ends, including by panic.
struct DriveGuard<'a> {
    state: &'a RefCell<SchedulerState>,
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().running = false;
    }
}

/// Single-threaded virtual-time scheduler.
///
/// Cheap to clone; clones drive the same clock and task store.
#[derive(Clone)]
pub struct TestScheduler {
    clock: VirtualClock,
    state: Rc<RefCell<SchedulerState>>,
    config: HarnessConfig,
}

impl TestScheduler {
    /// Scheduler at tick 0 with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HarnessConfig) -> Self {
        Self {
            clock: VirtualClock::new(0),
            state: Rc::new(RefCell::new(SchedulerState {
                store: TaskStore::default(),
                running: false,
            })),
            config,
        }
    }

    #[must_use]
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// A read-only view of this scheduler's clock.
    #[must_use]
    pub fn clock(&self) -> VirtualClock {
        self.clock.clone()
    }

    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Number of live (not cancelled) pending tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().store.slots.len()
    }

    /// Earliest due tick among live pending tasks.
    #[must_use]
    pub fn next_due(&self) -> Option<Tick> {
        self.state.borrow().store.next_due()
    }

    /// Whether a drive call is currently executing callbacks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Schedules `callback` at absolute tick `due` (clamped to `now`).
    pub fn schedule_absolute<F>(&self, due: Tick, callback: F) -> TaskHandle
    where
        F: FnOnce(&Self) -> Result<()> + 'static,
    {
        let now = self.now();
        let due = due.max(now);
        let seq = self.state.borrow_mut().store.insert(due, Box::new(callback));

        tracing::trace!(
            event = "scheduler.task.schedule",
            due,
            now,
            %seq,
            "Task scheduled"
        );

        TaskHandle {
            seq,
            due,
            state: Rc::downgrade(&self.state),
        }
    }

    /// Schedules `callback` `delay` ticks from now.
    pub fn schedule_relative<F>(&self, delay: Tick, callback: F) -> TaskHandle
    where
        F: FnOnce(&Self) -> Result<()> + 'static,
    {
        self.schedule_absolute(self.now().saturating_add(delay), callback)
    }

    /// Runs every task due at or before `target`, then sets the clock to `target`.
    pub fn advance_to(&self, target: Tick) -> Result<()> {
        let now = self.now();
        if target < now {
            return Err(error::clock_backwards(now, target));
        }
        self.drain(target)?;
        if target > self.now() {
            self.clock.set(target);
        }
        Ok(())
    }

    pub fn advance_by(&self, delta: Tick) -> Result<()> {
        if delta < 0 {
            return Err(Error::validation(format!(
                "advance_by requires a non-negative delta (got {delta})"
            )));
        }
        self.advance_to(self.now().saturating_add(delta))
    }

    /// Runs every pending task, leaving the clock at the last one's tick.
    pub fn run(&self) -> Result<()> {
        self.drain(INFINITE)
    }

    /// Moves the clock forward without running anything.
    ///
    /// Tasks that become overdue run at the new `now` on the next drive.
    pub fn sleep(&self, delta: Tick) -> Result<()> {
        if delta < 0 {
            return Err(Error::validation(format!(
                "sleep requires a non-negative delta (got {delta})"
            )));
        }
        let now = self.now();
        let target = now.saturating_add(delta);
        tracing::trace!(event = "scheduler.clock.sleep", now, target, "Clock moved");
        self.clock.set(target);
        Ok(())
    }

    fn enter(&self) -> Result<DriveGuard<'_>> {
        let mut state = self.state.borrow_mut();
        if state.running {
            return Err(Error::scheduler(
                "scheduler is already draining; drive calls cannot be nested inside callbacks",
            ));
        }
        state.running = true;
        Ok(DriveGuard { state: &self.state })
    }

    fn drain(&self, limit: Tick) -> Result<()> {
        let _guard = self.enter()?;
        let budget = self.config.drain_limit;
        let mut executed: u64 = 0;

        tracing::debug!(
            event = "scheduler.drain.start",
            now = self.now(),
            limit,
            pending = self.pending(),
            "Drain started"
        );

        loop {
            let next = self.state.borrow_mut().store.pop_due(limit);
            let Some((entry, callback)) = next else {
                break;
            };

            if let Some(max) = budget.filter(|max| executed >= *max) {
                self.state.borrow_mut().store.reinsert(entry, callback);
                tracing::warn!(
                    event = "scheduler.drain.limit",
                    max,
                    now = self.now(),
                    "Drain limit exceeded"
                );
                return Err(Error::scheduler(format!(
                    "drain limit of {max} callbacks exceeded at tick {}",
                    self.now()
                )));
            }

            if entry.due > self.now() {
                self.clock.set(entry.due);
            }
            executed += 1;

            tracing::debug!(
                event = "scheduler.task.execute",
                due = entry.due,
                seq = %entry.seq,
                "Executing task"
            );

            if let Err(err) = callback(self) {
                tracing::warn!(
                    event = "scheduler.task.failed",
                    due = entry.due,
                    seq = %entry.seq,
                    error = %err,
                    "Task failed; drain stopped"
                );
                return Err(err);
            }
        }

        tracing::debug!(
            event = "scheduler.drain.finish",
            now = self.now(),
            executed,
            "Drain finished"
        );
        Ok(())
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TestScheduler")
            .field("now", &self.now())
            .field("seq", &state.store.seq)
            .field("pending", &state.store.slots.len())
            .field("heap_len", &state.store.heap.len())
            .field("running", &state.running)
            .finish_non_exhaustive()
    }
}
