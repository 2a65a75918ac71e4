//! Bounded demand history used for trend prediction.

use std::collections::VecDeque;

/// Fixed-capacity ring buffer of per-cycle demand samples.
///
/// Appending a sample evicts the oldest entry once the window is full and
/// recomputes the moving average over the retained window in one operation,
/// so the trend signal is never updated piecemeal by the engine.
#[derive(Debug, Clone)]
pub struct DemandHistory {
    window: usize,
    samples: VecDeque<f64>,
    average: f64,
}

impl DemandHistory {
    /// Create an empty history retaining at most `window` samples.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            average: 0.0,
        }
    }

    /// Append the newest sample, evicting the oldest when the window is full,
    /// and return the recomputed moving average.
    pub fn push(&mut self, sample: f64) -> f64 {
        if self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        self.average
    }

    /// Moving average over the retained window, `0` when empty.
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Configured window size.
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_averages_to_zero() {
        let history = DemandHistory::new(4);
        assert!(history.is_empty());
        assert_eq!(history.average(), 0.0);
    }

    #[test]
    fn push_returns_running_average() {
        let mut history = DemandHistory::new(4);
        assert_eq!(history.push(10.0), 10.0);
        assert_eq!(history.push(20.0), 15.0);
        assert_eq!(history.push(30.0), 20.0);
    }

    #[test]
    fn window_evicts_oldest_sample_first() {
        let mut history = DemandHistory::new(3);
        history.push(1.0);
        history.push(2.0);
        history.push(3.0);
        // 1.0 falls out, average covers [2, 3, 4]
        assert_eq!(history.push(4.0), 3.0);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn length_never_exceeds_window() {
        let mut history = DemandHistory::new(5);
        for i in 0..100 {
            history.push(i as f64);
            assert!(history.len() <= 5);
        }
    }
}
