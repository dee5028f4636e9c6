// ============================================
// File: crates/nyxstream-core/src/replay.rs
// ============================================
//! # Salt Replay Cache
//!
//! ## Creation Reason
//! A salt seen twice under the same PSK means a replayed (or reflected)
//! stream. Every salt we send or accept is recorded, and incoming salts
//! are checked before any key is derived.
//!
//! ## Main Functionality
//! - `ReplayCache`: Injectable, thread-safe cache interface
//! - `SaltFilter`: Bounded exact ring of salt sets (default)
//!
//! ## Ring Layout
//! ```text
//! capacity = 1_000_000, slots = 10 → 100_000 salts per slot
//!
//!   ┌────────┬────────┬────────┬─────┬────────┐
//!   │ slot 0 │ slot 1 │ slot 2 │ ... │ slot 9 │
//!   └────────┴────────┴───▲────┴─────┴────────┘
//!                         │ current
//! insert: current full → advance, clear the slot, insert there
//! check:  hit in any slot → repeated
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - One cache is shared by every connection of a cipher suite
//! - Implementations MUST be safe for concurrent insert/lookup
//! - `check` both tests and records
//!
//! ## Last Modified
//! v0.1.0 - Initial replay cache

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

// ============================================
// Constants
// ============================================

/// Default number of salts remembered.
pub const DEFAULT_CAPACITY: usize = 1_000_000;

/// Default number of ring slots.
pub const DEFAULT_SLOTS: usize = 10;

// ============================================
// ReplayCache Trait
// ============================================

/// Records salts and reports repeats.
pub trait ReplayCache: Send + Sync {
    /// Returns `true` if `salt` was already present. Records it either way.
    fn check(&self, salt: &[u8]) -> bool;

    /// Records `salt` without checking.
    fn record(&self, salt: &[u8]);

    /// Returns `false` if this cache never reports a repeat.
    fn is_active(&self) -> bool {
        true
    }
}

// ============================================
// SaltFilter
// ============================================

/// Bounded exact salt cache organized as a ring of sets.
///
/// Remembers at least `capacity - capacity / slots` of the most recent
/// salts. A capacity of zero disables the filter.
pub struct SaltFilter {
    ring: Mutex<Ring>,
    slot_capacity: usize,
}

struct Ring {
    slots: Vec<HashSet<Box<[u8]>>>,
    current: usize,
}

impl SaltFilter {
    /// Creates a filter remembering up to `capacity` salts in `slots` slots.
    #[must_use]
    pub fn new(capacity: usize, slots: usize) -> Self {
        let slots = slots.max(1);
        let slot_capacity = if capacity == 0 {
            0
        } else {
            capacity.div_ceil(slots)
        };

        Self {
            ring: Mutex::new(Ring {
                slots: (0..slots).map(|_| HashSet::new()).collect(),
                current: 0,
            }),
            slot_capacity,
        }
    }

    /// Returns `true` if the filter records nothing.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.slot_capacity == 0
    }

    /// Number of salts currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().slots.iter().map(HashSet::len).sum()
    }

    /// Returns `true` if no salt is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, ring: &mut Ring, salt: &[u8]) {
        if ring.slots[ring.current].len() >= self.slot_capacity {
            ring.current = (ring.current + 1) % ring.slots.len();
            let current = ring.current;
            ring.slots[current].clear();
        }
        let current = ring.current;
        ring.slots[current].insert(salt.into());
    }
}

impl ReplayCache for SaltFilter {
    fn check(&self, salt: &[u8]) -> bool {
        if self.is_disabled() {
            return false;
        }

        let mut ring = self.ring.lock();
        let seen = ring.slots.iter().any(|slot| slot.contains(salt));
        if !seen {
            self.insert(&mut ring, salt);
        }
        seen
    }

    fn record(&self, salt: &[u8]) {
        if self.is_disabled() {
            return;
        }

        let mut ring = self.ring.lock();
        if !ring.slots.iter().any(|slot| slot.contains(salt)) {
            self.insert(&mut ring, salt);
        }
    }

    fn is_active(&self) -> bool {
        !self.is_disabled()
    }
}

impl Default for SaltFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_SLOTS)
    }
}

impl fmt::Debug for SaltFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("SaltFilter")
            .field("slots", &ring.slots.len())
            .field("slot_capacity", &self.slot_capacity)
            .field("current", &ring.current)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_check_reports_repeat() {
        let filter = SaltFilter::new(100, 4);

        assert!(!filter.check(b"salt-one"));
        assert!(filter.check(b"salt-one"));
        assert!(!filter.check(b"salt-two"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_record_then_check() {
        let filter = SaltFilter::default();

        filter.record(b"reflected");
        assert!(filter.check(b"reflected"));
    }

    #[test]
    fn test_ring_evicts_oldest_slot() {
        // 2 slots of 2 salts each
        let filter = SaltFilter::new(4, 2);

        for salt in [b"a", b"b", b"c", b"d"] {
            assert!(!filter.check(salt));
        }
        assert_eq!(filter.len(), 4);

        // Slot 0 ("a", "b") is cleared to make room
        assert!(!filter.check(b"e"));
        assert!(filter.check(b"c"));
        assert!(filter.check(b"d"));
        assert!(filter.check(b"e"));
        assert!(!filter.check(b"a"));
    }

    #[test]
    fn test_zero_capacity_disables() {
        let filter = SaltFilter::new(0, 10);
        assert!(filter.is_disabled());
        assert!(!filter.is_active());
        assert!(SaltFilter::default().is_active());

        filter.record(b"x");
        assert!(!filter.check(b"x"));
        assert!(!filter.check(b"x"));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_concurrent_checks_accept_each_salt_once() {
        let filter = Arc::new(SaltFilter::new(10_000, 4));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || {
                    (0u32..500)
                        .filter(|i| !filter.check(&i.to_be_bytes()))
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 500);
    }
}
