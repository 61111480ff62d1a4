//! Single-slot pending/retired update exchange.
//!
//! [`UpdateMailbox`] is the ownership-transfer channel between the control
//! thread and the render thread. The control thread publishes at most one
//! pending payload (publishing again replaces and discards the unconsumed
//! one). The render thread takes the pending payload at a quantum boundary
//! and parks the structure it displaced in a fixed array of retired slots;
//! the control thread later reclaims and drops those. Payloads are held in
//! atomically swappable slots, so neither side ever locks, and the render
//! thread never frees a large structure.
//!
//! Single-producer/single-consumer discipline is part of the contract:
//! exactly one thread publishes/reclaims and exactly one thread
//! takes/retires. Both handles of the engine pair uphold this; the type is
//! not meant for wider sharing.
//!
//! Backpressure: when every retired slot is occupied the consumer must not
//! take the pending payload (it would have nowhere to park the displaced
//! one). The payload stays queued and installs on a later cycle once the
//! producer has reclaimed a slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use arc_swap::ArcSwapOption;

/// Number of retired slots per mailbox.
///
/// The control thread reclaims on every enqueue, so more than two payloads
/// are only ever in flight when it stalls; four slots give headroom without
/// growing the steady-state footprint.
pub const RETIRED_SLOTS: usize = 4;

/// A single-producer/single-consumer update exchange with bounded
/// reclamation.
pub struct UpdateMailbox<T> {
    pending: ArcSwapOption<T>,
    retired: [ArcSwapOption<T>; RETIRED_SLOTS],
}

impl<T> Default for UpdateMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UpdateMailbox<T> {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self {
            pending: ArcSwapOption::const_empty(),
            retired: std::array::from_fn(|_| ArcSwapOption::const_empty()),
        }
    }

    /// Producer: publishes a payload, replacing and discarding any pending
    /// payload the consumer has not taken yet. The replaced payload is
    /// dropped on the calling (control) thread.
    pub fn publish(&self, payload: T) {
        self.pending.store(Some(Arc::new(payload)));
    }

    /// Consumer: true if a payload is waiting.
    pub fn has_pending(&self) -> bool {
        self.pending.load().is_some()
    }

    /// Consumer: index of a free retired slot, or `None` when all are
    /// occupied (backpressure — do not take the pending payload).
    pub fn free_retired_slot(&self) -> Option<usize> {
        self.retired.iter().position(|slot| slot.load().is_none())
    }

    /// Consumer: takes ownership of the pending payload, if any.
    pub fn take_pending(&self) -> Option<Arc<T>> {
        self.pending.swap(None)
    }

    /// Consumer: parks a displaced payload in a retired slot previously
    /// obtained from [`free_retired_slot`](Self::free_retired_slot).
    ///
    /// The payload becomes invisible to the consumer from here on; the
    /// producer reclaims and drops it.
    pub fn retire(&self, slot: usize, payload: Arc<T>) {
        debug_assert!(slot < RETIRED_SLOTS);
        self.retired[slot].store(Some(payload));
    }

    /// Producer (or teardown): empties every retired slot, dropping the
    /// payloads on the calling thread.
    pub fn reclaim(&self) {
        for slot in &self.retired {
            slot.swap(None);
        }
    }
}

/// Rate limiter for commit-stall logging from the render thread.
///
/// The render callback can hit a full retired array on every quantum; this
/// keeps the log output to at most one line per interval.
pub struct StallThrottle {
    started: Instant,
    last_logged_ms: AtomicU64,
    interval_ms: u64,
}

impl StallThrottle {
    /// Creates a throttle that admits one log line per `interval_ms`.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            last_logged_ms: AtomicU64::new(0),
            interval_ms,
        }
    }

    /// Returns true if the caller should emit a log line now.
    pub fn should_log(&self) -> bool {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_logged_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.interval_ms && last != 0 {
            return false;
        }
        self.last_logged_ms
            .compare_exchange(last, now_ms.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for StallThrottle {
    fn default() -> Self {
        Self::new(1000)
    }
}
