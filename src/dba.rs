//! Group-based dynamic bandwidth allocation.
//!
//! Every cycle, each group of terminals is allocated independently:
//!
//! 1. Sample per-class demand into the terminal's bounded history
//! 2. Plan each terminal (priority preemption or predictive fair grant)
//! 3. Classify terminals as lightly or heavily loaded
//! 4. Redistribute the group's unused capacity to heavy terminals,
//!    weighted by unmet predicted demand
//!
//! Planning is a pure mapping from a demand snapshot to a [`TerminalPlan`], so
//! the preemption branch is a tagged state rather than control flow and the
//! whole step is testable without touching engine internals.

use crate::error::DbaError;
use crate::onu::{Burst, Onu};
use crate::tcont::{ClassTable, TrafficClass};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered set of terminals sharing one capacity-redistribution pool.
///
/// Groups are immutable once the engine is constructed and partition the
/// terminal set; both properties are enforced by [`DbaEngine::new`].
#[derive(Debug, Clone)]
pub struct Group {
    onu_ids: Vec<String>,
}

impl Group {
    pub fn new(onu_ids: Vec<String>) -> Self {
        Self { onu_ids }
    }

    pub fn onu_ids(&self) -> &[String] {
        &self.onu_ids
    }
}

/// Per-terminal, per-class grant map for one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Allocation {
    grants: HashMap<String, ClassTable<f64>>,
}

impl Allocation {
    fn insert(&mut self, onu_id: String, grants: ClassTable<f64>) {
        self.grants.insert(onu_id, grants);
    }

    /// Grant for one terminal and class, `0` when the terminal is absent.
    pub fn grant(&self, onu_id: &str, class: TrafficClass) -> f64 {
        self.grants.get(onu_id).map_or(0.0, |table| table[class])
    }

    /// Full per-class grant table for one terminal.
    pub fn grants_for(&self, onu_id: &str) -> Option<&ClassTable<f64>> {
        self.grants.get(onu_id)
    }

    /// Total capacity granted to one terminal across all classes.
    pub fn total_for(&self, onu_id: &str) -> f64 {
        self.grants.get(onu_id).map_or(0.0, ClassTable::total)
    }

    /// Total capacity granted across all terminals and classes.
    pub fn total(&self) -> f64 {
        self.grants.values().map(ClassTable::total).sum()
    }

    /// Iterate `(terminal, grants)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClassTable<f64>)> {
        self.grants.iter()
    }

    /// Number of terminals covered by this allocation.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Outcome of planning a single terminal for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalPlan {
    /// Guaranteed-class demand present: the whole capacity goes to
    /// `Guaranteed` and predictive classes get nothing.
    Preempted,
    /// No guaranteed demand: predictive classes receive the initial fair
    /// grant, bounded by the terminal capacity.
    Normal {
        /// Trend-extrapolated demand per class. May be negative for
        /// `NonAssured`/`BestEffort`; the raw value is kept so the trend
        /// signal survives into the grant computation.
        predicted: ClassTable<f64>,
        /// Granted capacity per class, never negative.
        granted: ClassTable<f64>,
    },
}

/// Load classification of a planned terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Load {
    /// Unused capacity contributed to the group excess pool.
    Light(f64),
    /// Unmet predicted demand, used as the redistribution weight.
    Heavy(f64),
    /// Capacity fully used with no unmet demand, or preempted.
    Balanced,
}

/// Plan one terminal from its demand snapshot and historical averages.
///
/// `Assured` demand is treated as already smoothed; `NonAssured` and
/// `BestEffort` are extrapolated as `requested + (requested - average)`, so a
/// demand spike above the historical average is projected to recur. Negative
/// predicted values are not clamped; only the resulting grant is floored at
/// zero.
pub fn plan_terminal(
    capacity: f64,
    requested: &ClassTable<f64>,
    averages: &ClassTable<f64>,
) -> TerminalPlan {
    if requested[TrafficClass::Guaranteed] != 0.0 {
        return TerminalPlan::Preempted;
    }

    let predicted = ClassTable::from_fn(|class| match class {
        TrafficClass::Guaranteed => 0.0,
        TrafficClass::Assured => requested[class],
        TrafficClass::NonAssured | TrafficClass::BestEffort => {
            let delta = requested[class] - averages[class];
            requested[class] + delta
        }
    });

    let mut granted = ClassTable::default();
    let mut remaining = capacity;
    for class in TrafficClass::PREDICTIVE {
        let grant = remaining.min(predicted[class]).max(0.0);
        granted[class] = grant;
        remaining -= grant;
    }

    TerminalPlan::Normal { predicted, granted }
}

/// Classify a planned terminal against its capacity.
///
/// Preempted terminals are neither light nor heavy: their full capacity is
/// already committed to the guaranteed class.
pub fn classify(capacity: f64, plan: &TerminalPlan) -> Load {
    match plan {
        TerminalPlan::Preempted => Load::Balanced,
        TerminalPlan::Normal { predicted, granted } => {
            let granted_total = granted.total();
            if granted_total < capacity {
                Load::Light(capacity - granted_total)
            } else if predicted.total() > capacity {
                Load::Heavy(predicted.total() - capacity)
            } else {
                Load::Balanced
            }
        }
    }
}

/// Dynamic bandwidth allocation engine over a fixed set of terminals and
/// groups.
#[derive(Debug)]
pub struct DbaEngine {
    onus: HashMap<String, Onu>,
    groups: Vec<Group>,
}

impl DbaEngine {
    /// Validate the configuration and build the engine.
    ///
    /// Rejects negative or non-finite capacities, zero history windows,
    /// duplicate terminal ids, empty groups, groups referencing unknown
    /// terminals, and terminals appearing in more than one group. A
    /// zero-capacity terminal is legal and will simply receive all-zero
    /// grants.
    pub fn new(onus: Vec<Onu>, groups: Vec<Group>) -> Result<Self, DbaError> {
        let mut map = HashMap::with_capacity(onus.len());
        for onu in onus {
            if !onu.capacity().is_finite() || onu.capacity() < 0.0 {
                return Err(DbaError::InvalidCapacity {
                    id: onu.id().to_string(),
                    capacity: onu.capacity(),
                });
            }
            if onu.history_window() == 0 {
                return Err(DbaError::InvalidHistoryWindow {
                    id: onu.id().to_string(),
                });
            }
            let id = onu.id().to_string();
            if map.insert(id.clone(), onu).is_some() {
                return Err(DbaError::DuplicateOnu(id));
            }
        }

        let mut grouped: HashSet<String> = HashSet::new();
        for (index, group) in groups.iter().enumerate() {
            if group.onu_ids().is_empty() {
                return Err(DbaError::EmptyGroup(index));
            }
            for id in group.onu_ids() {
                if !map.contains_key(id) {
                    return Err(DbaError::UnknownGroupMember {
                        index,
                        id: id.clone(),
                    });
                }
                if !grouped.insert(id.clone()) {
                    return Err(DbaError::OverlappingGroups(id.clone()));
                }
            }
        }

        Ok(Self { onus: map, groups })
    }

    pub fn onu(&self, id: &str) -> Option<&Onu> {
        self.onus.get(id)
    }

    pub fn onus(&self) -> impl Iterator<Item = &Onu> {
        self.onus.values()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Append a burst to a terminal's class queue.
    ///
    /// Only the cycle driver may call this while no cycle is executing;
    /// arrivals during a cycle must be staged and merged between cycles.
    pub fn enqueue(
        &mut self,
        onu_id: &str,
        class: TrafficClass,
        burst: Burst,
    ) -> Result<(), DbaError> {
        let onu = self
            .onus
            .get_mut(onu_id)
            .ok_or_else(|| DbaError::UnknownOnu(onu_id.to_string()))?;
        onu.enqueue(class, burst);
        Ok(())
    }

    /// Run one full allocation pass across all groups.
    ///
    /// Samples each terminal's demand history exactly once, then plans,
    /// classifies, and redistributes per group. Groups have no cross-group
    /// interaction. Per-terminal peak-allocation metrics are updated from the
    /// resulting grants.
    pub fn allocate(&mut self) -> Allocation {
        let mut allocation = Allocation::default();
        for group_index in 0..self.groups.len() {
            self.allocate_group(group_index, &mut allocation);
        }
        for (id, grants) in &allocation.grants {
            if let Some(onu) = self.onus.get_mut(id) {
                onu.note_allocated(grants.total());
            }
        }
        allocation
    }

    fn allocate_group(&mut self, group_index: usize, allocation: &mut Allocation) {
        let member_ids: Vec<String> = self.groups[group_index].onu_ids().to_vec();

        let mut plans: Vec<(String, f64, TerminalPlan)> = Vec::with_capacity(member_ids.len());
        let mut pool = 0.0;
        let mut heavy: Vec<(usize, f64)> = Vec::new();
        let mut total_weight = 0.0;

        for id in &member_ids {
            let Some(onu) = self.onus.get_mut(id) else {
                continue;
            };
            onu.record_demand();
            let requested = onu.demand_snapshot();
            let averages = ClassTable::from_fn(|class| onu.average_demand(class));
            let capacity = onu.capacity();

            let plan = plan_terminal(capacity, &requested, &averages);
            match classify(capacity, &plan) {
                Load::Light(excess) => pool += excess,
                Load::Heavy(weight) => {
                    heavy.push((plans.len(), weight));
                    total_weight += weight;
                }
                Load::Balanced => {}
            }
            plans.push((id.clone(), capacity, plan));
        }

        if pool > 0.0 && total_weight > 0.0 {
            for (plan_index, weight) in heavy {
                let share = weight / total_weight * pool;
                let (_, _, plan) = &mut plans[plan_index];
                if let TerminalPlan::Normal { predicted, granted } = plan {
                    let mut remaining_share = share;
                    for class in TrafficClass::PREDICTIVE {
                        let needed = predicted[class] - granted[class];
                        if needed > 0.0 {
                            let extra = remaining_share.min(needed);
                            granted[class] += extra;
                            remaining_share -= extra;
                            if remaining_share <= 0.0 {
                                break;
                            }
                        }
                    }
                    // Any leftover share is forfeited for this cycle instead
                    // of returning to the pool (origin behavior).
                }
            }
        }

        for (id, capacity, plan) in plans {
            let grants = match plan {
                TerminalPlan::Preempted => ClassTable::from_fn(|class| {
                    if class == TrafficClass::Guaranteed {
                        capacity
                    } else {
                        0.0
                    }
                }),
                TerminalPlan::Normal { granted, .. } => granted,
            };
            allocation.insert(id, grants);
        }
    }

    /// Consume granted capacity against the pending queues.
    ///
    /// Only the predictive classes are drained; `Guaranteed` queues are never
    /// touched by this path (origin behavior, see the pinned tests). Every
    /// terminal referenced by the allocation is validated before any queue is
    /// mutated.
    pub fn transmit(&mut self, allocation: &Allocation, cycle: u64) -> Result<(), DbaError> {
        for (id, _) in allocation.iter() {
            if !self.onus.contains_key(id) {
                return Err(DbaError::UnknownOnu(id.clone()));
            }
        }
        for (id, grants) in allocation.iter() {
            let Some(onu) = self.onus.get_mut(id) else {
                continue;
            };
            for class in TrafficClass::PREDICTIVE {
                onu.drain_class(class, grants[class], cycle);
            }
        }
        Ok(())
    }
}
