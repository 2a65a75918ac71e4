//! Per-terminal (ONU) state: class queues, demand history, and derived metrics.

use crate::history::DemandHistory;
use crate::tcont::{ClassTable, TrafficClass};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A pending unit of upstream transmission.
///
/// The size shrinks in place when a grant only covers part of the burst; the
/// burst keeps its FIFO position until fully consumed. The arrival cycle is
/// stamped at enqueue time and used for latency accounting when the burst
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    /// Remaining size in capacity units.
    pub size: f64,
    /// Cycle number during which the burst entered the queue.
    pub arrival_cycle: u64,
}

impl Burst {
    pub fn new(size: f64, arrival_cycle: u64) -> Self {
        Self {
            size,
            arrival_cycle,
        }
    }
}

/// Derived per-terminal reporting metrics.
///
/// Latency is measured in whole cycles: a burst fully drained in cycle `N`
/// waited `N - arrival_cycle` cycles. Partially consumed bursts contribute
/// nothing until they complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnuMetrics {
    pub onu_id: String,
    /// Average cycles a completed burst waited in its queue.
    pub avg_latency_cycles: f64,
    /// Highest total capacity granted to this terminal in any single cycle.
    pub peak_allocated: f64,
    /// Number of bursts fully transmitted.
    pub bursts_transmitted: u64,
}

/// Subscriber terminal competing for shared upstream capacity.
///
/// Holds one FIFO queue and one bounded demand history per traffic class.
/// Queues are appended by the cycle driver between cycles and drained by the
/// transmission pass; history is appended exactly once per cycle by
/// [`Onu::record_demand`].
#[derive(Debug, Clone)]
pub struct Onu {
    id: String,
    capacity: f64,
    class_share: ClassTable<f64>,
    queues: ClassTable<VecDeque<Burst>>,
    history: ClassTable<DemandHistory>,
    total_wait_cycles: u64,
    bursts_transmitted: u64,
    peak_allocated: f64,
}

impl Onu {
    /// Build a terminal with the given identity, per-cycle capacity, history
    /// window, and expected per-class traffic proportions.
    ///
    /// `class_share` is only consulted by external stimulus generators; the
    /// allocation algorithm itself never reads it. Validation of capacity and
    /// window happens when the terminal is handed to the engine.
    pub fn new(
        id: impl Into<String>,
        capacity: f64,
        history_window: usize,
        class_share: ClassTable<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            capacity,
            class_share,
            queues: ClassTable::from_fn(|_| VecDeque::new()),
            history: ClassTable::from_fn(|_| DemandHistory::new(history_window)),
            total_wait_cycles: 0,
            bursts_transmitted: 0,
            peak_allocated: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Maximum grantable capacity per cycle.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Bounded count of retained history samples per class.
    pub fn history_window(&self) -> usize {
        self.history[TrafficClass::Guaranteed].window()
    }

    /// Configured per-class traffic proportions (stimulus generators only).
    pub fn class_share(&self) -> &ClassTable<f64> {
        &self.class_share
    }

    /// Append a burst to the tail of a class queue.
    pub fn enqueue(&mut self, class: TrafficClass, burst: Burst) {
        self.queues[class].push_back(burst);
    }

    /// Total pending size in one class queue.
    pub fn queued_size(&self, class: TrafficClass) -> f64 {
        self.queues[class].iter().map(|b| b.size).sum()
    }

    /// Number of pending bursts in one class queue.
    pub fn queue_len(&self, class: TrafficClass) -> usize {
        self.queues[class].len()
    }

    /// Current total queued size for every class.
    pub fn demand_snapshot(&self) -> ClassTable<f64> {
        ClassTable::from_fn(|class| self.queued_size(class))
    }

    /// Moving average of the retained demand history for one class.
    pub fn average_demand(&self, class: TrafficClass) -> f64 {
        self.history[class].average()
    }

    /// Number of retained history samples for one class.
    pub fn history_len(&self, class: TrafficClass) -> usize {
        self.history[class].len()
    }

    /// Sample the current queued size of every class into the demand history.
    ///
    /// Must run exactly once per cycle, before the allocation pass reads the
    /// averages; a second invocation in the same cycle would corrupt the
    /// trend signal.
    pub fn record_demand(&mut self) {
        for class in TrafficClass::ALL {
            let total = self.queued_size(class);
            self.history[class].push(total);
        }
    }

    /// Consume up to `grant` capacity units from one class queue in arrival
    /// order.
    ///
    /// Whole bursts are removed while the remaining grant covers them; a head
    /// burst larger than the leftover grant is shrunk in place and keeps its
    /// position. Fully drained bursts feed the latency accumulators using
    /// `cycle` as the completion time.
    pub fn drain_class(&mut self, class: TrafficClass, grant: f64, cycle: u64) {
        let mut remaining = grant;
        let mut completed_wait = 0u64;
        let mut completed = 0u64;
        {
            let queue = &mut self.queues[class];
            while remaining > 0.0 {
                let Some(head) = queue.front_mut() else {
                    break;
                };
                if remaining >= head.size {
                    remaining -= head.size;
                    completed_wait += cycle.saturating_sub(head.arrival_cycle);
                    completed += 1;
                    queue.pop_front();
                } else {
                    head.size -= remaining;
                    remaining = 0.0;
                }
            }
        }
        self.total_wait_cycles += completed_wait;
        self.bursts_transmitted += completed;
    }

    /// Record the total capacity granted to this terminal for one cycle.
    pub fn note_allocated(&mut self, total_grant: f64) {
        if total_grant > self.peak_allocated {
            self.peak_allocated = total_grant;
        }
    }

    /// Snapshot of the derived reporting metrics.
    pub fn metrics(&self) -> OnuMetrics {
        let avg_latency_cycles = if self.bursts_transmitted > 0 {
            self.total_wait_cycles as f64 / self.bursts_transmitted as f64
        } else {
            0.0
        };
        OnuMetrics {
            onu_id: self.id.clone(),
            avg_latency_cycles,
            peak_allocated: self.peak_allocated,
            bursts_transmitted: self.bursts_transmitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_onu(capacity: f64) -> Onu {
        Onu::new("ONU1", capacity, 4, ClassTable::default())
    }

    #[test]
    fn enqueue_accumulates_queued_size() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::Assured, Burst::new(3.0, 1));
        onu.enqueue(TrafficClass::Assured, Burst::new(2.0, 1));
        assert_eq!(onu.queued_size(TrafficClass::Assured), 5.0);
        assert_eq!(onu.queued_size(TrafficClass::BestEffort), 0.0);
    }

    #[test]
    fn record_demand_samples_every_class() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::NonAssured, Burst::new(6.0, 1));
        onu.record_demand();
        assert_eq!(onu.average_demand(TrafficClass::NonAssured), 6.0);
        assert_eq!(onu.average_demand(TrafficClass::Assured), 0.0);
        assert_eq!(onu.history_len(TrafficClass::Assured), 1);
    }

    #[test]
    fn history_stays_within_window() {
        let mut onu = test_onu(10.0);
        for _ in 0..20 {
            onu.record_demand();
        }
        for class in TrafficClass::ALL {
            assert!(onu.history_len(class) <= onu.history_window());
        }
    }

    #[test]
    fn drain_removes_whole_bursts_in_fifo_order() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::Assured, Burst::new(2.0, 1));
        onu.enqueue(TrafficClass::Assured, Burst::new(3.0, 1));
        onu.drain_class(TrafficClass::Assured, 5.0, 2);
        assert_eq!(onu.queue_len(TrafficClass::Assured), 0);
        assert_eq!(onu.metrics().bursts_transmitted, 2);
    }

    #[test]
    fn drain_shrinks_head_in_place_on_partial_grant() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::Assured, Burst::new(2.0, 1));
        onu.enqueue(TrafficClass::Assured, Burst::new(4.0, 1));
        onu.drain_class(TrafficClass::Assured, 3.0, 2);
        // First burst consumed, second shrunk to 3.0 and still at the head.
        assert_eq!(onu.queue_len(TrafficClass::Assured), 1);
        assert_eq!(onu.queued_size(TrafficClass::Assured), 3.0);
        assert_eq!(onu.metrics().bursts_transmitted, 1);
    }

    #[test]
    fn zero_grant_leaves_queue_untouched() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::BestEffort, Burst::new(1.5, 1));
        onu.drain_class(TrafficClass::BestEffort, 0.0, 2);
        assert_eq!(onu.queued_size(TrafficClass::BestEffort), 1.5);
    }

    #[test]
    fn latency_counts_cycles_waited_by_completed_bursts() {
        let mut onu = test_onu(10.0);
        onu.enqueue(TrafficClass::Assured, Burst::new(1.0, 1));
        onu.enqueue(TrafficClass::Assured, Burst::new(1.0, 2));
        onu.drain_class(TrafficClass::Assured, 2.0, 4);
        let metrics = onu.metrics();
        // Waited 3 and 2 cycles respectively.
        assert_eq!(metrics.bursts_transmitted, 2);
        assert_eq!(metrics.avg_latency_cycles, 2.5);
    }

    #[test]
    fn peak_allocated_tracks_the_maximum() {
        let mut onu = test_onu(10.0);
        onu.note_allocated(4.0);
        onu.note_allocated(9.0);
        onu.note_allocated(2.0);
        assert_eq!(onu.metrics().peak_allocated, 9.0);
    }
}
