//! Traffic class (T-CONT) definitions and helpers used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Upstream traffic classes ordered from most to least critical.
///
/// The ordering is fixed and significant: `Guaranteed` preempts everything, and
/// excess capacity is always applied to `Assured` before `NonAssured` before
/// `BestEffort`. Schedulers rely on the stable integer indexes instead of
/// branching on specific labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrafficClass {
    /// T-CONT 1: guaranteed bandwidth, preempts the whole terminal capacity.
    Guaranteed,
    /// T-CONT 2: assured bandwidth, requested demand is treated as already smoothed.
    Assured,
    /// T-CONT 3: non-assured bandwidth, trend-extrapolated demand.
    NonAssured,
    /// T-CONT 4: best-effort bandwidth, trend-extrapolated demand.
    BestEffort,
}

impl TrafficClass {
    /// Ordered list of all classes (highest → lowest) for iteration utilities.
    pub const ALL: [TrafficClass; 4] = [
        TrafficClass::Guaranteed,
        TrafficClass::Assured,
        TrafficClass::NonAssured,
        TrafficClass::BestEffort,
    ];

    /// Classes that participate in predictive allocation and draining, in the
    /// order excess capacity is handed out.
    pub const PREDICTIVE: [TrafficClass; 3] = [
        TrafficClass::Assured,
        TrafficClass::NonAssured,
        TrafficClass::BestEffort,
    ];

    /// Stable index for class based arrays.
    pub const fn index(self) -> usize {
        match self {
            TrafficClass::Guaranteed => 0,
            TrafficClass::Assured => 1,
            TrafficClass::NonAssured => 2,
            TrafficClass::BestEffort => 3,
        }
    }

    /// Numeric T-CONT identifier (1-4) used by external reporting and exports.
    pub const fn tcont_id(self) -> u8 {
        match self {
            TrafficClass::Guaranteed => 1,
            TrafficClass::Assured => 2,
            TrafficClass::NonAssured => 3,
            TrafficClass::BestEffort => 4,
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrafficClass::Guaranteed => "guaranteed",
            TrafficClass::Assured => "assured",
            TrafficClass::NonAssured => "non_assured",
            TrafficClass::BestEffort => "best_effort",
        };
        write!(f, "{label}")
    }
}

/// Helper structure wrapping one value per [`TrafficClass`].
///
/// Keeps per-class state in a dense array indexed by [`TrafficClass::index`],
/// so call sites iterate [`TrafficClass::ALL`] instead of hard-coding labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTable<T> {
    values: Vec<T>,
}

impl<T> ClassTable<T> {
    /// Build a table by executing a closure for each class in
    /// [`TrafficClass::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(TrafficClass) -> T) -> Self {
        let mut values = Vec::with_capacity(TrafficClass::ALL.len());
        for class in TrafficClass::ALL {
            values.push(f(class));
        }
        ClassTable { values }
    }

    /// Borrow the value for a given class.
    pub fn get(&self, class: TrafficClass) -> &T {
        &self.values[class.index()]
    }

    /// Mutably borrow the value for a given class.
    pub fn get_mut(&mut self, class: TrafficClass) -> &mut T {
        &mut self.values[class.index()]
    }

    /// Iterate `(class, value)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (TrafficClass, &T)> {
        TrafficClass::ALL.iter().copied().zip(self.values.iter())
    }
}

impl ClassTable<f64> {
    /// Sum of all per-class values.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

impl<T: Default> Default for ClassTable<T> {
    fn default() -> Self {
        ClassTable::from_fn(|_| T::default())
    }
}

impl<T> Index<TrafficClass> for ClassTable<T> {
    type Output = T;

    fn index(&self, index: TrafficClass) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<TrafficClass> for ClassTable<T> {
    fn index_mut(&mut self, index: TrafficClass) -> &mut Self::Output {
        self.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_index_is_stable() {
        assert_eq!(TrafficClass::Guaranteed.index(), 0);
        assert_eq!(TrafficClass::Assured.index(), 1);
        assert_eq!(TrafficClass::NonAssured.index(), 2);
        assert_eq!(TrafficClass::BestEffort.index(), 3);
    }

    #[test]
    fn tcont_ids_match_external_numbering() {
        assert_eq!(TrafficClass::Guaranteed.tcont_id(), 1);
        assert_eq!(TrafficClass::BestEffort.tcont_id(), 4);
    }

    #[test]
    fn predictive_order_hands_excess_to_assured_first() {
        assert_eq!(
            TrafficClass::PREDICTIVE,
            [
                TrafficClass::Assured,
                TrafficClass::NonAssured,
                TrafficClass::BestEffort
            ]
        );
    }

    #[test]
    fn class_table_builds_and_indexes() {
        let table = ClassTable::from_fn(|c| c.index());
        assert_eq!(table[TrafficClass::Guaranteed], 0);
        assert_eq!(table[TrafficClass::BestEffort], 3);
    }

    #[test]
    fn class_table_total_sums_values() {
        let table = ClassTable::from_fn(|c| c.index() as f64);
        assert_eq!(table.total(), 6.0);
    }
}
