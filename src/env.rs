use std::collections::{hash_map::Entry, HashMap};
use std::ops::Index;

/// Represents a Markov decision process, defining the dynamics of an environment
/// in which an agent can operate.
///
/// This base trait represents the common case of a discrete-time MDP with one agent
/// and a finite state space and action space.
pub trait Environment {
    /// A representation of the state of the environment to be passed to an agent
    type State;

    /// A representation of an action that an agent can take to affect the environment
    type Action;

    /// Reset the environment to an initial state
    ///
    /// **Returns** the state
    fn reset(&mut self) -> Self::State;

    /// Update the environment in response to an action taken by an agent
    ///
    /// The state is returned on the terminal step as well, so an agent running a
    /// time-limited episode can bootstrap its final update from it.
    ///
    /// **Returns** `(next_state, reward, terminal)`
    fn step(&mut self, action: Self::Action) -> (Self::State, f32, bool);

    /// Sample an action uniformly at random from the action space
    fn random_action(&mut self) -> Self::Action;
}

/// An environment with a finite, fixed action space
pub trait DiscreteActionSpace: Environment {
    /// Get the available actions, in a stable order
    ///
    /// The returned vec should never be empty, instead specify an action that
    /// represents doing nothing if necessary.
    fn actions(&self) -> Vec<Self::Action>;
}

/// Named per-episode statistics accumulated by an environment
///
/// Keys are fixed at construction; [`Report::take`] hands the accumulated values
/// to the caller and resets them to zero for the next episode.
#[derive(Debug, Clone)]
pub struct Report {
    keys: Vec<&'static str>,
    data: HashMap<&'static str, f32>,
}

impl Report {
    pub fn new(keys: Vec<&'static str>) -> Self {
        let data = keys.iter().map(|&k| (k, 0.0)).collect();
        Self { keys, data }
    }

    /// Entry API for a tracked statistic
    ///
    /// **Panics** if `key` was not registered at construction
    pub fn entry(&mut self, key: &'static str) -> Entry<'_, &'static str, f32> {
        assert!(self.keys.contains(&key), "Unknown report key `{key}`");
        self.data.entry(key)
    }

    /// Registered keys in insertion order
    pub fn keys(&self) -> Vec<&'static str> {
        self.keys.clone()
    }

    /// Take the accumulated values, resetting all statistics to zero
    pub fn take(&mut self) -> HashMap<&'static str, f32> {
        let fresh = self.keys.iter().map(|&k| (k, 0.0)).collect();
        std::mem::replace(&mut self.data, fresh)
    }
}

impl Index<&str> for Report {
    type Output = f32;

    fn index(&self, key: &str) -> &Self::Output {
        &self.data[key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_accumulates_and_resets() {
        let mut report = Report::new(vec!["reward", "steps"]);
        report.entry("reward").and_modify(|x| *x += 2.5);
        report.entry("steps").and_modify(|x| *x += 1.0);
        report.entry("steps").and_modify(|x| *x += 1.0);

        assert_eq!(report["reward"], 2.5, "Reward accumulated");
        assert_eq!(report["steps"], 2.0, "Steps accumulated");

        let taken = report.take();
        assert_eq!(*taken.get("steps").unwrap(), 2.0, "Taken values preserved");
        assert_eq!(report["steps"], 0.0, "Statistics reset after take");
    }

    #[test]
    #[should_panic(expected = "Unknown report key")]
    fn report_rejects_unknown_key() {
        let mut report = Report::new(vec!["reward"]);
        report.entry("oops").and_modify(|x| *x += 1.0);
    }
}
