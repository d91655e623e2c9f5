use rand::Rng;
use serde::Serialize;

use crate::util::{mean, std_dev};

/// Descriptive statistics over a value table, for checkpoint reporting
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TableStats {
    /// States with at least one non-zero action value
    pub nonzero_states: usize,
    pub mean: f32,
    pub std_dev: f32,
}

/// A dense table of action-value estimates
///
/// Rows are state indices, columns action indices. The shape is fixed at
/// construction and entries change only through [`set`](QTable::set).
#[derive(Clone, Debug, PartialEq)]
pub struct QTable {
    values: Vec<f32>,
    n_states: usize,
    n_actions: usize,
}

impl QTable {
    /// Initialize every entry with uniform noise in `[-scale, scale]`
    ///
    /// The noise breaks ties between never-updated actions, which would
    /// otherwise pin the greedy policy to action 0 across the whole table.
    ///
    /// **Panics** if either dimension is zero
    pub fn new<R: Rng>(n_states: usize, n_actions: usize, scale: f32, rng: &mut R) -> Self {
        assert!(n_states > 0, "Table must have at least one state");
        assert!(n_actions > 0, "Table must have at least one action");
        let values = (0..n_states * n_actions)
            .map(|_| rng.gen_range(-scale..=scale))
            .collect();
        Self {
            values,
            n_states,
            n_actions,
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Action values for a state
    pub fn row(&self, state: usize) -> &[f32] {
        &self.values[state * self.n_actions..][..self.n_actions]
    }

    /// Iterate rows in state order, for export
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks(self.n_actions)
    }

    pub fn get(&self, state: usize, action: usize) -> f32 {
        assert!(action < self.n_actions, "Action {action} out of range");
        self.values[state * self.n_actions + action]
    }

    pub(crate) fn set(&mut self, state: usize, action: usize, value: f32) {
        assert!(action < self.n_actions, "Action {action} out of range");
        self.values[state * self.n_actions + action] = value;
    }

    /// Greatest action value in a state's row
    pub fn max(&self, state: usize) -> f32 {
        self.row(state)
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// First action index attaining the row maximum
    pub fn argmax(&self, state: usize) -> usize {
        let row = self.row(state);
        let mut best = 0;
        for (action, &value) in row.iter().enumerate() {
            if value > row[best] {
                best = action;
            }
        }
        best
    }

    /// All action indices tied for the row maximum
    pub fn maximal_actions(&self, state: usize) -> Vec<usize> {
        let row = self.row(state);
        let max = self.max(state);
        row.iter()
            .enumerate()
            .filter(|&(_, &value)| value == max)
            .map(|(action, _)| action)
            .collect()
    }

    pub fn stats(&self) -> TableStats {
        let nonzero_states = self
            .rows()
            .filter(|row| row.iter().any(|&v| v != 0.0))
            .count();
        TableStats {
            nonzero_states,
            mean: mean(&self.values),
            std_dev: std_dev(&self.values),
        }
    }
}
