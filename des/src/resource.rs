//! Capacity-limited pool of identical servers with an ordered wait list.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::fmt;

use crate::{ProcessId, SimError};

/// Handle for a pool owned by a [`crate::Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub(crate) usize);

impl PoolId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order in which waiting requesters are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Strictly by request order.
    #[default]
    Fifo,
    /// By `(priority_class, request order)`, lowest class first. Non-preemptive.
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEntry {
    pub requester: ProcessId,
    pub priority_class: i64,
    pub insertion_sequence: u64,
}

// Heap wrapper carrying the rank the pool's policy assigns to an entry.
#[derive(Debug)]
struct Ranked {
    rank: (i64, u64),
    entry: WaitEntry,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank.cmp(&self.rank)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Queued,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub queued: usize,
    pub total_granted: usize,
    pub total_released: usize,
    pub peak_queue: usize,
}

impl PoolStats {
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.in_use as f64 / self.capacity as f64
    }
}

pub struct ResourcePool {
    capacity: usize,
    in_use: usize,
    policy: QueuePolicy,
    wait_queue: BinaryHeap<Ranked>,
    holders: BTreeSet<ProcessId>,
    next_sequence: u64,
    total_granted: usize,
    total_released: usize,
    peak_queue: usize,
}

impl ResourcePool {
    pub fn new(capacity: usize, policy: QueuePolicy) -> Result<ResourcePool, SimError> {
        if capacity == 0 {
            return Err(SimError::InvalidCapacity { capacity });
        }
        Ok(ResourcePool {
            capacity,
            in_use: 0,
            policy,
            wait_queue: BinaryHeap::new(),
            holders: BTreeSet::new(),
            next_sequence: 0,
            total_granted: 0,
            total_released: 0,
            peak_queue: 0,
        })
    }

    /// Admit `requester` if a slot is free, otherwise add it to the wait list.
    ///
    /// `pool` is only used to label errors.
    pub fn request(
        &mut self,
        pool: PoolId,
        requester: ProcessId,
        priority_class: i64,
    ) -> Result<Admission, SimError> {
        if self.holders.contains(&requester) || self.is_waiting(requester) {
            return Err(SimError::DuplicateRequest {
                process: requester,
                pool,
            });
        }

        let insertion_sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.in_use < self.capacity {
            self.grant(requester);
            return Ok(Admission::Granted);
        }

        let entry = WaitEntry {
            requester,
            priority_class,
            insertion_sequence,
        };
        let rank = match self.policy {
            QueuePolicy::Fifo => (0, insertion_sequence),
            QueuePolicy::Priority => (priority_class, insertion_sequence),
        };
        self.wait_queue.push(Ranked { rank, entry });
        self.peak_queue = self.peak_queue.max(self.wait_queue.len());
        self.check_invariants();
        Ok(Admission::Queued)
    }

    /// Give back the slot held by `holder`.
    ///
    /// If someone is waiting, the head of the wait list is admitted on the
    /// spot and returned; the caller is responsible for waking it.
    pub fn release(
        &mut self,
        pool: PoolId,
        holder: ProcessId,
    ) -> Result<Option<ProcessId>, SimError> {
        if !self.holders.remove(&holder) {
            return Err(SimError::ReleaseWithoutGrant {
                process: holder,
                pool,
            });
        }
        self.in_use -= 1;
        self.total_released += 1;

        let next = self.wait_queue.pop().map(|ranked| ranked.entry.requester);
        if let Some(requester) = next {
            self.grant(requester);
        }
        self.check_invariants();
        Ok(next)
    }

    fn grant(&mut self, requester: ProcessId) {
        self.in_use += 1;
        self.total_granted += 1;
        self.holders.insert(requester);
        self.check_invariants();
    }

    fn check_invariants(&self) {
        debug_assert!(self.in_use <= self.capacity);
        debug_assert_eq!(self.in_use, self.holders.len());
        debug_assert!(self.wait_queue.is_empty() || self.in_use == self.capacity);
    }

    fn is_waiting(&self, process: ProcessId) -> bool {
        self.wait_queue
            .iter()
            .any(|ranked| ranked.entry.requester == process)
    }

    pub fn holds(&self, process: ProcessId) -> bool {
        self.holders.contains(&process)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn queue_len(&self) -> usize {
        self.wait_queue.len()
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Waiting entries in the order they will be served.
    pub fn waiting(&self) -> Vec<WaitEntry> {
        let mut ranked: Vec<&Ranked> = self.wait_queue.iter().collect();
        ranked.sort_by_key(|r| r.rank);
        ranked.into_iter().map(|r| r.entry).collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            in_use: self.in_use,
            queued: self.wait_queue.len(),
            total_granted: self.total_granted,
            total_released: self.total_released,
            peak_queue: self.peak_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: PoolId = PoolId(0);

    fn pid(n: usize) -> ProcessId {
        ProcessId(n)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            ResourcePool::new(0, QueuePolicy::Fifo).err(),
            Some(SimError::InvalidCapacity { capacity: 0 })
        );
    }

    #[test]
    fn given_free_slot_when_requested_then_granted() {
        let mut pool = ResourcePool::new(2, QueuePolicy::Fifo).unwrap();

        assert_eq!(pool.request(POOL, pid(1), 0), Ok(Admission::Granted));
        assert_eq!(pool.request(POOL, pid(2), 0), Ok(Admission::Granted));
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.queue_len(), 0);
        assert!(pool.holds(pid(1)));
    }

    #[test]
    fn given_full_pool_when_requested_then_queued() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Fifo).unwrap();
        pool.request(POOL, pid(1), 0).unwrap();

        assert_eq!(pool.request(POOL, pid(2), 0), Ok(Admission::Queued));
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.queue_len(), 1);
        assert!(!pool.holds(pid(2)));
    }

    #[test]
    fn given_queue_when_released_then_head_admitted_in_fifo_order() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Fifo).unwrap();
        pool.request(POOL, pid(1), 0).unwrap();
        pool.request(POOL, pid(2), 5).unwrap();
        pool.request(POOL, pid(3), 0).unwrap();

        assert_eq!(pool.release(POOL, pid(1)), Ok(Some(pid(2))));
        assert!(pool.holds(pid(2)));
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.release(POOL, pid(2)), Ok(Some(pid(3))));
        assert_eq!(pool.release(POOL, pid(3)), Ok(None));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn priority_policy_serves_lower_class_first_then_by_arrival() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Priority).unwrap();
        pool.request(POOL, pid(1), 1).unwrap();
        pool.request(POOL, pid(2), 1).unwrap();
        pool.request(POOL, pid(3), 0).unwrap();
        pool.request(POOL, pid(4), 1).unwrap();
        pool.request(POOL, pid(5), 0).unwrap();

        let order: Vec<ProcessId> = pool.waiting().iter().map(|e| e.requester).collect();
        assert_eq!(order, vec![pid(3), pid(5), pid(2), pid(4)]);

        assert_eq!(pool.release(POOL, pid(1)), Ok(Some(pid(3))));
        assert_eq!(pool.release(POOL, pid(3)), Ok(Some(pid(5))));
        assert_eq!(pool.release(POOL, pid(5)), Ok(Some(pid(2))));
        assert_eq!(pool.release(POOL, pid(2)), Ok(Some(pid(4))));
    }

    #[test]
    fn release_without_grant_is_an_error() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Fifo).unwrap();
        pool.request(POOL, pid(1), 0).unwrap();
        pool.request(POOL, pid(2), 0).unwrap();

        assert_eq!(
            pool.release(POOL, pid(2)),
            Err(SimError::ReleaseWithoutGrant {
                process: pid(2),
                pool: POOL
            })
        );
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn second_request_from_same_process_is_an_error() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Fifo).unwrap();
        pool.request(POOL, pid(1), 0).unwrap();
        pool.request(POOL, pid(2), 0).unwrap();

        assert!(pool.request(POOL, pid(1), 0).is_err());
        assert!(pool.request(POOL, pid(2), 0).is_err());
    }

    #[test]
    fn stats_track_counts_and_peak_queue() {
        let mut pool = ResourcePool::new(1, QueuePolicy::Fifo).unwrap();
        pool.request(POOL, pid(1), 0).unwrap();
        pool.request(POOL, pid(2), 0).unwrap();
        pool.request(POOL, pid(3), 0).unwrap();
        pool.release(POOL, pid(1)).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.total_granted, 2);
        assert_eq!(stats.total_released, 1);
        assert_eq!(stats.peak_queue, 2);
        assert_eq!(stats.utilization(), 1.0);
    }
}
