//! Time-ordered event queue.
//!
//! A binary heap over `(time, seq)`: primary key is the event's due time
//! ascending, tie-break is a monotonically increasing insertion sequence
//! number, so same-time events pop in FIFO order. The sequence tie-break is
//! what makes the whole engine deterministic; nothing else orders
//! same-time events.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::event::Event;

#[derive(Debug, Clone)]
struct Scheduled {
    time: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap surfaces the earliest (time, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of pending events, owned exclusively by the kernel.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event at its own due time.
    pub fn enqueue(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            time: event.time,
            seq,
            event,
        });
    }

    /// Pop the earliest pending event, FIFO among equal times.
    pub fn pop_earliest(&mut self) -> Option<Event> {
        self.heap.pop().map(|scheduled| scheduled.event)
    }

    /// Due time of the earliest pending event, or +∞ when empty.
    pub fn peek_earliest_time(&self) -> f64 {
        self.heap
            .peek()
            .map_or(f64::INFINITY, |scheduled| scheduled.time)
    }

    /// Drop all pending events and restart the sequence counter, so a reset
    /// simulation replays identically to a fresh one.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn transfer_at(time: f64, amount: f64) -> Event {
        Event::transfer("a", "out", "b", "in", time, amount)
    }

    #[test]
    fn earlier_times_pop_first() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(transfer_at(3.0, 1.0));
        scheduler.enqueue(transfer_at(1.0, 2.0));
        scheduler.enqueue(transfer_at(2.0, 3.0));

        let times: Vec<f64> = std::iter::from_fn(|| scheduler.pop_earliest())
            .map(|ev| ev.time)
            .collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn same_time_events_pop_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        for amount in 0..10 {
            scheduler.enqueue(transfer_at(1.0, amount as f64));
        }
        let amounts: Vec<f64> = std::iter::from_fn(|| scheduler.pop_earliest())
            .map(|ev| ev.amount())
            .collect();
        assert_eq!(amounts, (0..10).map(|a| a as f64).collect::<Vec<_>>());
    }

    #[test]
    fn peek_is_infinity_when_empty() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.peek_earliest_time(), f64::INFINITY);
        scheduler.enqueue(transfer_at(4.0, 1.0));
        assert_eq!(scheduler.peek_earliest_time(), 4.0);
        scheduler.clear();
        assert_eq!(scheduler.peek_earliest_time(), f64::INFINITY);
    }

    #[test]
    fn clear_restarts_the_sequence() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(transfer_at(1.0, 0.0));
        scheduler.clear();
        scheduler.enqueue(transfer_at(1.0, 1.0));
        scheduler.enqueue(transfer_at(1.0, 2.0));
        assert_eq!(scheduler.pop_earliest().map(|ev| ev.amount()), Some(1.0));
        assert_eq!(scheduler.pop_earliest().map(|ev| ev.amount()), Some(2.0));
    }
}
