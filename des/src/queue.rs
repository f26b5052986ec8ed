//! Simulation clock and pending-event queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{SimError, SimTime};

/// A pending or popped event.
///
/// `sequence` is assigned at insertion and is the only tie-breaker between
/// events due at the same instant.
#[derive(Debug, Clone)]
pub struct Event<T> {
    pub due: SimTime,
    pub sequence: u64,
    pub payload: T,
}

impl<T> Event<T> {
    pub fn key(&self) -> EventKey {
        EventKey {
            due: self.due,
            sequence: self.sequence,
        }
    }
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Event<T> {}

// Reversed so that `BinaryHeap` pops the earliest (due, sequence) first.
impl<T> Ord for Event<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for Event<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Position of an event in the global order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventKey {
    pub due: SimTime,
    pub sequence: u64,
}

/// Min-heap of events keyed by `(due, sequence)` that owns the clock.
pub struct EventQueue<T> {
    heap: BinaryHeap<Event<T>>,
    now: SimTime,
    next_sequence: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> EventQueue<T> {
        EventQueue {
            heap: BinaryHeap::new(),
            now: 0.0,
            next_sequence: 0,
        }
    }

    /// Current simulated time. Never decreases.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Insert `payload` due at `now + delay`.
    ///
    /// Negative and NaN delays are rejected; an infinite delay is accepted and
    /// simply never fires within a finite horizon.
    pub fn schedule(&mut self, delay: SimTime, payload: T) -> Result<EventKey, SimError> {
        if !(delay >= 0.0) {
            return Err(SimError::NegativeDelay { delay });
        }
        Ok(self.push(self.now + delay, payload))
    }

    /// Insert `payload` due at the current instant, behind anything already
    /// due now.
    pub fn schedule_now(&mut self, payload: T) -> EventKey {
        self.push(self.now, payload)
    }

    fn push(&mut self, due: SimTime, payload: T) -> EventKey {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Event {
            due,
            sequence,
            payload,
        });
        EventKey { due, sequence }
    }

    /// Remove the earliest event and advance the clock to its due time.
    pub fn pop_next(&mut self) -> Option<Event<T>> {
        let event = self.heap.pop()?;
        debug_assert!(event.due >= self.now, "event due in the past");
        self.now = event.due;
        Some(event)
    }

    pub fn peek_due(&self) -> Option<SimTime> {
        self.heap.peek().map(|event| event.due)
    }

    /// Move the clock forward without popping anything. Earlier times are
    /// ignored.
    pub fn advance_to(&mut self, t: SimTime) {
        if t > self.now {
            self.now = t;
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
