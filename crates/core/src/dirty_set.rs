//! Bounded work queues for the predictive/critical pipeline: a plain
//! dirty-set of "needs re-evaluation" users, and a priority hotlist of the
//! users judged worth the tightest polling.
//!
//! Both are capacity-bounded the way
//! [`TieredPositionTracker`](crate::position_tracker::TieredPositionTracker)
//! bounds its critical tier with a fixed-size `ArrayVec` — a single
//! misbehaving price feed shouldn't be able to grow an unbounded work queue
//! and starve the rest of the pipeline.

use alloy::primitives::Address;
use dashmap::DashSet;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum time a hotlist entry must sit before it can be evicted to make
/// room for a new candidate. Without this, two positions whose priority
/// scores straddle the capacity boundary would evict each other every tick.
const HOTLIST_MIN_RESIDENCY: Duration = Duration::from_millis(250);

/// FIFO-bounded set of users flagged for re-evaluation. `mark_dirty` is the
/// single write path; a consumer drains it with `take_all` once per cycle.
pub struct DirtySet {
    capacity: usize,
    members: DashSet<Address>,
    order: RwLock<VecDeque<Address>>,
}

impl DirtySet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            members: DashSet::new(),
            order: RwLock::new(VecDeque::new()),
        }
    }

    /// Mark `user` dirty. Returns `true` if this was a new entry. If the set
    /// is at capacity, the oldest entry is evicted to make room — dirty
    /// membership is a hint, not a guarantee, so dropping the stalest entry
    /// under pressure is an acceptable trade for bounded memory.
    pub fn mark_dirty(&self, user: Address) -> bool {
        if self.members.contains(&user) {
            return false;
        }

        let mut order = self.order.write();
        if order.len() >= self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        order.push_back(user);
        self.members.insert(user);
        true
    }

    pub fn contains(&self, user: &Address) -> bool {
        self.members.contains(user)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Drain the full set in FIFO order, leaving it empty.
    pub fn take_all(&self) -> Vec<Address> {
        let mut order = self.order.write();
        let drained: Vec<Address> = order.drain(..).collect();
        for user in &drained {
            self.members.remove(user);
        }
        drained
    }
}

/// One tracked hotlist candidate.
#[derive(Debug, Clone, Copy)]
struct HotlistEntry {
    user: Address,
    priority: f64,
    inserted_at: Instant,
}

/// Bounded, priority-ordered list of the users most worth tight polling
/// (typically fed by [`PredictiveOrchestrator`](crate::predictive::PredictiveOrchestrator)
/// scoring). Unlike `DirtySet`, entries persist until explicitly removed or
/// displaced by a higher-priority candidate, subject to a minimum residency
/// to avoid churn among near-tied scores.
pub struct Hotlist {
    capacity: usize,
    entries: RwLock<Vec<HotlistEntry>>,
}

impl Hotlist {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert or update a user's priority score. Returns `true` if the user
    /// is present in the hotlist after this call (it may have been rejected
    /// if the list is full and every existing entry outranks it and is
    /// still within its minimum residency).
    pub fn upsert(&self, user: Address, priority: f64) -> bool {
        let mut entries = self.entries.write();

        if let Some(existing) = entries.iter_mut().find(|e| e.user == user) {
            existing.priority = priority;
            entries.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap());
            return true;
        }

        if entries.len() < self.capacity {
            entries.push(HotlistEntry {
                user,
                priority,
                inserted_at: Instant::now(),
            });
            entries.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap());
            return true;
        }

        // Full: only displace the lowest-priority entry if it's both
        // outranked and has sat past the anti-churn residency floor.
        let lowest_idx = entries.len() - 1;
        let lowest = entries[lowest_idx];
        if priority > lowest.priority && lowest.inserted_at.elapsed() >= HOTLIST_MIN_RESIDENCY {
            entries[lowest_idx] = HotlistEntry {
                user,
                priority,
                inserted_at: Instant::now(),
            };
            entries.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap());
            true
        } else {
            false
        }
    }

    pub fn remove(&self, user: &Address) {
        self.entries.write().retain(|e| &e.user != user);
    }

    pub fn contains(&self, user: &Address) -> bool {
        self.entries.read().iter().any(|e| &e.user == user)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Top `n` users by priority, highest first.
    pub fn top(&self, n: usize) -> Vec<Address> {
        self.entries
            .read()
            .iter()
            .take(n)
            .map(|e| e.user)
            .collect()
    }

    pub fn all(&self) -> Vec<Address> {
        self.entries.read().iter().map(|e| e.user).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_set_evicts_oldest_over_capacity() {
        let set = DirtySet::new(2);
        set.mark_dirty(Address::repeat_byte(1));
        set.mark_dirty(Address::repeat_byte(2));
        set.mark_dirty(Address::repeat_byte(3));

        assert_eq!(set.len(), 2);
        assert!(!set.contains(&Address::repeat_byte(1)));
        assert!(set.contains(&Address::repeat_byte(3)));
    }

    #[test]
    fn test_dirty_set_take_all_drains() {
        let set = DirtySet::new(10);
        set.mark_dirty(Address::repeat_byte(1));
        set.mark_dirty(Address::repeat_byte(2));

        let drained = set.take_all();
        assert_eq!(drained.len(), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_hotlist_orders_by_priority() {
        let hotlist = Hotlist::new(10);
        hotlist.upsert(Address::repeat_byte(1), 0.5);
        hotlist.upsert(Address::repeat_byte(2), 0.9);
        hotlist.upsert(Address::repeat_byte(3), 0.1);

        let top = hotlist.top(2);
        assert_eq!(top[0], Address::repeat_byte(2));
        assert_eq!(top[1], Address::repeat_byte(1));
    }

    #[test]
    fn test_hotlist_rejects_displacement_within_residency() {
        let hotlist = Hotlist::new(1);
        hotlist.upsert(Address::repeat_byte(1), 0.5);

        // Immediately try to displace with a higher-priority candidate.
        let admitted = hotlist.upsert(Address::repeat_byte(2), 0.9);
        assert!(!admitted);
        assert!(hotlist.contains(&Address::repeat_byte(1)));
    }
}
