//! Expiration Queue Module
//!
//! Min-heap of TTL deadlines shared by every entry of one cache.
//!
//! Entries do not own timers. Arming pushes `(deadline, generation, slot)`
//! and stores the same generation on the entry; disarming only clears the
//! entry's expiry. Heap items whose generation no longer matches are stale
//! and get discarded when they surface or when the heap is compacted.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::Expiry;

/// Stale heap items tolerated on top of twice the live entry count.
const COMPACT_SLACK: usize = 64;

// == Deadline ==
/// A scheduled fire for the entry stored in `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub generation: u64,
    pub slot: usize,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// == Expiry Queue ==
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<Deadline>>,
    next_generation: u64,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // == Arm ==
    /// Schedules a fire for `slot` at `now + ttl`.
    ///
    /// Returns the expiry to store on the entry and whether it became the
    /// earliest pending deadline (the expiration task must then be woken).
    pub fn arm(&mut self, slot: usize, ttl: Duration, now: Instant) -> (Expiry, bool) {
        self.next_generation += 1;
        let deadline = Deadline {
            at: now + ttl,
            generation: self.next_generation,
            slot,
        };
        let earliest = self
            .peek()
            .map_or(true, |current| deadline.at < current.at);
        self.heap.push(Reverse(deadline));

        let expiry = Expiry {
            deadline: deadline.at,
            ttl,
            generation: deadline.generation,
        };
        (expiry, earliest)
    }

    // == Peek ==
    /// Earliest scheduled fire, possibly stale.
    pub fn peek(&self) -> Option<Deadline> {
        self.heap.peek().map(|Reverse(deadline)| *deadline)
    }

    /// Removes the earliest scheduled fire.
    pub fn pop(&mut self) -> Option<Deadline> {
        self.heap.pop().map(|Reverse(deadline)| deadline)
    }

    // == Pop Due ==
    /// Removes and returns the earliest fire if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Deadline> {
        match self.peek() {
            Some(deadline) if deadline.at <= now => self.pop(),
            _ => None,
        }
    }

    // == Compact ==
    /// Drops stale items once they outnumber live entries.
    ///
    /// `is_live` reports whether a slot is still armed with a generation.
    /// Returns the number of items dropped.
    pub fn compact_if_needed<F>(&mut self, live_entries: usize, is_live: F) -> usize
    where
        F: Fn(usize, u64) -> bool,
    {
        if self.heap.len() <= live_entries * 2 + COMPACT_SLACK {
            return 0;
        }
        let before = self.heap.len();
        self.heap
            .retain(|Reverse(deadline)| is_live(deadline.slot, deadline.generation));
        before - self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
