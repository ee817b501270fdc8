//! Key-addressed one-shot timers
//!
//! Timers never carry references into MEP state. Each one is identified by a
//! [`TimerKey`]; on expiry the engine looks the MEP up again and ignores keys
//! whose MEP is gone. Restarting a running timer replaces its deadline, and
//! stopping a stopped timer does nothing.

use cfm_core::{MepId, MepKey};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Millisecond time source
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since creation, from the OS monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock moved by hand, for deterministic runs
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// The timers a MEP runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Loss-of-continuity timer of one remote MEP
    RmepWhile(MepId),
    ErrorCcmWhile,
    XconCcmWhile,
    FngWhile,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub mep: MepKey,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(mep: &MepKey, kind: TimerKind) -> Self {
        Self {
            mep: mep.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: u64,
    generation: u64,
}

/// Deadline-ordered set of running timers
///
/// Stopped and restarted timers leave stale heap entries behind; they are
/// recognised by their generation and dropped when they surface.
#[derive(Debug, Default)]
pub struct TimerQueue {
    armed: HashMap<TimerKey, Armed>,
    heap: BinaryHeap<Reverse<(u64, u64, TimerKey)>>,
    generation: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start a timer to fire `timeout_ms` after `now`
    pub fn start(&mut self, key: TimerKey, now: u64, timeout_ms: u64) {
        self.generation += 1;
        let deadline = now.saturating_add(timeout_ms);
        self.armed.insert(
            key.clone(),
            Armed {
                deadline,
                generation: self.generation,
            },
        );
        self.heap.push(Reverse((deadline, self.generation, key)));
    }

    pub fn stop(&mut self, key: &TimerKey) {
        self.armed.remove(key);
    }

    /// Stop every timer of a MEP
    pub fn stop_mep(&mut self, mep: &MepKey) {
        self.armed.retain(|key, _| key.mep != *mep);
    }

    pub fn is_running(&self, key: &TimerKey) -> bool {
        self.armed.contains_key(key)
    }

    /// Deadline of a running timer
    pub fn deadline(&self, key: &TimerKey) -> Option<u64> {
        self.armed.get(key).map(|armed| armed.deadline)
    }

    /// Earliest deadline among running timers
    pub fn next_deadline(&mut self) -> Option<u64> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Remove and return the earliest timer due at `now`
    pub fn pop_expired(&mut self, now: u64) -> Option<TimerKey> {
        self.discard_stale();
        let due = matches!(self.heap.peek(), Some(Reverse((deadline, _, _))) if *deadline <= now);
        if !due {
            return None;
        }

        let Reverse((_, _, key)) = self.heap.pop()?;
        self.armed.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    fn discard_stale(&mut self) {
        loop {
            let stale = match self.heap.peek() {
                Some(Reverse((_, generation, key))) => self
                    .armed
                    .get(key)
                    .map_or(true, |armed| armed.generation != *generation),
                None => false,
            };
            if !stale {
                break;
            }
            self.heap.pop();
        }
    }
}
