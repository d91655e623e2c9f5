use rand::Rng;

use crate::decay::Decay;

use super::Choice;

/// Epsilon greedy exploration policy with a decaying epsilon threshold
///
/// The random source is supplied by the caller so that a training run is
/// reproducible from its seed.
pub struct EpsilonGreedy<D: Decay> {
    epsilon: D,
}

impl<D: Decay> EpsilonGreedy<D> {
    /// Initialize epsilon greedy policy with a decay strategy
    pub fn new(decay: D) -> Self {
        Self { epsilon: decay }
    }

    /// Effective exploration rate at training progress `t`
    pub fn epsilon(&self, t: f32) -> f32 {
        self.epsilon.evaluate(t)
    }

    /// Invoke epsilon greedy policy at training progress `t`
    pub fn choose<R: Rng>(&self, rng: &mut R, t: f32) -> Choice {
        if rng.gen::<f32>() < self.epsilon.evaluate(t) {
            Choice::Explore
        } else {
            Choice::Exploit
        }
    }
}
