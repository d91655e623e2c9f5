use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use strum::EnumCount;

use crate::{
    assert_interval, decay,
    env::{DiscreteActionSpace, Environment},
    exploration::{Choice, EpsilonGreedy},
    sim::Dose,
    state::STATE_COUNT,
};

use super::table::{QTable, TableStats};
use super::TableIndex;

/// Scale of the uniform noise used to initialize the value table
const INIT_NOISE: f32 = 0.1;

/// Exploration never falls below this rate during training
const EPSILON_FLOOR: f32 = 0.01;

/// Position within a training run, used to decay exploration
#[derive(Clone, Copy, Debug)]
pub struct EpisodeSchedule {
    episode: u32,
    total_episodes: u32,
}

impl EpisodeSchedule {
    /// **Panics** if `total_episodes` is zero
    pub fn new(episode: u32, total_episodes: u32) -> Self {
        assert!(total_episodes > 0, "A schedule needs at least one episode");
        Self {
            episode,
            total_episodes,
        }
    }

    /// Fraction of the run completed
    pub fn progress(&self) -> f32 {
        self.episode as f32 / self.total_episodes as f32
    }
}

/// Configuration for the [`QTableAgent`]
pub struct QTableAgentConfig {
    pub exploration: EpsilonGreedy<decay::Polynomial>,
    pub alpha: f32,
    pub gamma: f32,
    pub n_states: usize,
    pub n_actions: usize,
}

impl Default for QTableAgentConfig {
    fn default() -> Self {
        Self {
            exploration: EpsilonGreedy::new(decay::Polynomial::new(0.8, 0.3, EPSILON_FLOOR).unwrap()),
            alpha: 0.3,
            gamma: 0.95,
            n_states: STATE_COUNT,
            n_actions: Dose::COUNT,
        }
    }
}

/// Append-only record of a training run, for reporting only
///
/// Nothing in the control loop reads these back.
#[derive(Clone, Debug, Default)]
pub struct TrainingHistory {
    /// Total reward per completed episode
    pub episode_rewards: Vec<f32>,
    /// Whether each action selection explored
    pub explored: Vec<bool>,
    /// Effective epsilon at each action selection
    pub epsilon: Vec<f32>,
}

/// A Q-learning agent over a dense state-action value table
///
/// States are table indices; pair it with any [`Environment`] whose states
/// implement [`TableIndex`] and whose action space is fixed.
pub struct QTableAgent {
    table: QTable,
    exploration: EpsilonGreedy<decay::Polynomial>,
    alpha: f32, // learning rate
    gamma: f32, // discount factor
    rng: StdRng,
    history: TrainingHistory,
}

impl QTableAgent {
    /// Initialize a new `QTableAgent` with a noise-initialized table
    ///
    /// ### Parameters
    /// - `config.alpha` - The learning rate - must be in `(0,1]`
    /// - `config.gamma` - The discount factor - must be in `(0,1]`
    /// - `seed` - Seeds both the table initialization and action selection
    ///
    /// **Panics** if `alpha` or `gamma` is outside `(0,1]` or a table dimension
    /// is zero
    pub fn new(config: QTableAgentConfig, seed: u64) -> Self {
        assert!(config.alpha > 0.0, "Invalid value for `alpha`. Must be positive.");
        assert!(config.gamma > 0.0, "Invalid value for `gamma`. Must be positive.");
        assert_interval!(config.alpha, 0.0, 1.0);
        assert_interval!(config.gamma, 0.0, 1.0);

        let mut rng = StdRng::seed_from_u64(seed);
        let table = QTable::new(config.n_states, config.n_actions, INIT_NOISE, &mut rng);
        Self {
            table,
            exploration: config.exploration,
            alpha: config.alpha,
            gamma: config.gamma,
            rng,
            history: TrainingHistory::default(),
        }
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Adjust the learning rate between training batches
    ///
    /// **Panics** if `alpha` is outside `(0,1]`
    pub fn set_alpha(&mut self, alpha: f32) {
        assert!(alpha > 0.0, "Invalid value for `alpha`. Must be positive.");
        assert_interval!(alpha, 0.0, 1.0);
        self.alpha = alpha;
    }

    /// Adjust the discount factor between training batches
    ///
    /// **Panics** if `gamma` is outside `(0,1]`
    pub fn set_gamma(&mut self, gamma: f32) {
        assert!(gamma > 0.0, "Invalid value for `gamma`. Must be positive.");
        assert_interval!(gamma, 0.0, 1.0);
        self.gamma = gamma;
    }

    /// Swap the exploration policy between training batches
    pub fn set_exploration(&mut self, exploration: EpsilonGreedy<decay::Polynomial>) {
        self.exploration = exploration;
    }

    /// Select an action index for a state with ε-greedy exploration
    ///
    /// With a schedule, the exploration rate decays with run progress down to a
    /// floor of 0.01; without one, the base rate applies throughout. Exploiting
    /// breaks ties uniformly at random among the maximal actions, so that
    /// initialization noise alone never pins the policy on untrained rows.
    pub fn select_action(&mut self, state: usize, schedule: Option<EpisodeSchedule>) -> usize {
        let progress = schedule.map_or(0.0, |s| s.progress());
        self.history.epsilon.push(self.exploration.epsilon(progress));

        match self.exploration.choose(&mut self.rng, progress) {
            Choice::Explore => {
                self.history.explored.push(true);
                self.rng.gen_range(0..self.table.n_actions())
            }
            Choice::Exploit => {
                self.history.explored.push(false);
                *self
                    .table
                    .maximal_actions(state)
                    .choose(&mut self.rng)
                    .expect("A row always has at least one action")
            }
        }
    }

    /// Deterministic greedy action for a state, used in evaluation
    pub fn best_action(&self, state: usize) -> usize {
        self.table.argmax(state)
    }

    /// Apply one Bellman update for the transition `(state, action, reward, next_state)`
    ///
    /// This is the only path that mutates the value table.
    pub fn update(&mut self, state: usize, action: usize, reward: f32, next_state: usize) {
        let q = self.table.get(state, action);
        let target = reward + self.gamma * self.table.max(next_state);
        self.table.set(state, action, q + self.alpha * (target - q));
    }

    /// Run one training episode against an environment
    ///
    /// Selection, environment step, and value update run in that order every
    /// tick until the environment signals terminal.
    ///
    /// **Returns** the total episode reward
    pub fn train_episode<E>(&mut self, env: &mut E, schedule: Option<EpisodeSchedule>) -> f32
    where
        E: Environment + DiscreteActionSpace,
        E::State: TableIndex,
        E::Action: Copy,
    {
        let actions = env.actions();
        assert_eq!(
            actions.len(),
            self.table.n_actions(),
            "Action space does not match the table shape"
        );

        let mut state = env.reset().table_index();
        let mut total_reward = 0.0;

        loop {
            let action = self.select_action(state, schedule);
            let (next_state, reward, terminal) = env.step(actions[action]);
            let next_state = next_state.table_index();
            self.update(state, action, reward, next_state);

            state = next_state;
            total_reward += reward;
            if terminal {
                break;
            }
        }

        self.history.episode_rewards.push(total_reward);
        total_reward
    }

    /// Run one episode greedily, without learning
    ///
    /// Neither the table nor the history changes, so repeating the run against
    /// an identically seeded environment replays the same action sequence.
    ///
    /// **Returns** the total episode reward
    pub fn evaluate_episode<E>(&self, env: &mut E) -> f32
    where
        E: Environment + DiscreteActionSpace,
        E::State: TableIndex,
        E::Action: Copy,
    {
        let actions = env.actions();
        let mut state = env.reset().table_index();
        let mut total_reward = 0.0;

        loop {
            let action = self.best_action(state);
            let (next_state, reward, terminal) = env.step(actions[action]);
            state = next_state.table_index();
            total_reward += reward;
            if terminal {
                break;
            }
        }

        total_reward
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::{GlucoseSim, SimParams, EPISODE_STEPS};
    use crate::state::Sensitivity;

    use super::*;

    fn small_agent() -> QTableAgent {
        let config = QTableAgentConfig {
            n_states: 4,
            n_actions: 2,
            ..Default::default()
        };
        QTableAgent::new(config, 17)
    }

    #[test]
    #[should_panic(expected = "Must be positive")]
    fn zero_alpha_rejected() {
        let config = QTableAgentConfig {
            alpha: 0.0,
            ..Default::default()
        };
        QTableAgent::new(config, 0);
    }

    #[test]
    #[should_panic(expected = "Must be in the interval")]
    fn oversized_gamma_rejected() {
        let config = QTableAgentConfig {
            gamma: 1.5,
            ..Default::default()
        };
        QTableAgent::new(config, 0);
    }

    #[test]
    fn bellman_update_converges_monotonically() {
        let mut agent = small_agent();
        let target = 1.0 + agent.gamma * agent.table.max(1);

        let mut error = (target - agent.table.get(0, 0)).abs();
        for _ in 0..200 {
            agent.update(0, 0, 1.0, 1);
            let q = agent.table.get(0, 0);
            assert!(q <= target, "No overshoot past the fixed point");
            let next_error = (target - q).abs();
            assert!(next_error <= error, "Error shrinks every update");
            error = next_error;
        }
        assert!(error < 1e-3, "Converged to r + gamma * max_next");
    }

    #[test]
    fn update_touches_one_entry() {
        let mut agent = small_agent();
        let before = agent.table.clone();
        agent.update(2, 1, 5.0, 3);
        for state in 0..4 {
            for action in 0..2 {
                if (state, action) != (2, 1) {
                    assert_eq!(
                        agent.table.get(state, action),
                        before.get(state, action),
                        "Untouched entries unchanged"
                    );
                }
            }
        }
    }

    #[test]
    fn epsilon_decays_within_bounds() {
        let mut agent = small_agent();
        let total = 1000;
        for episode in 0..=total {
            agent.select_action(0, Some(EpisodeSchedule::new(episode, total)));
        }

        let epsilon = &agent.history().epsilon;
        assert_eq!(epsilon.len(), total as usize + 1, "One entry per selection");
        assert_eq!(epsilon[0], 0.3, "Base rate on the first episode");
        assert_eq!(*epsilon.last().unwrap(), EPSILON_FLOOR, "Floor at the end");
        for pair in epsilon.windows(2) {
            assert!(pair[1] <= pair[0], "Rate never increases across episodes");
            assert!(
                (EPSILON_FLOOR..=0.3).contains(&pair[1]),
                "Rate stays within [floor, base]"
            );
        }
    }

    #[test]
    fn selection_records_history_and_stays_in_range() {
        let mut agent = small_agent();
        for _ in 0..50 {
            let action = agent.select_action(1, None);
            assert!(action < 2, "Selected action within the action space");
        }
        assert_eq!(agent.history().explored.len(), 50, "Exploration flags kept");
        assert_eq!(agent.history().epsilon.len(), 50, "Effective rates kept");
    }

    #[test]
    fn training_episode_runs_the_full_horizon() {
        let mut agent = QTableAgent::new(QTableAgentConfig::default(), 3);
        let mut env = GlucoseSim::new(SimParams::baseline(Sensitivity::Normal), 3);

        let total = agent.train_episode(&mut env, Some(EpisodeSchedule::new(0, 10)));

        assert_eq!(agent.history().episode_rewards, vec![total]);
        assert_eq!(
            agent.history().explored.len(),
            EPISODE_STEPS as usize,
            "One selection per step"
        );
        assert_eq!(env.report["steps"], EPISODE_STEPS as f32);
        assert_eq!(env.report["reward"], total, "Report agrees with the agent");
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut agent = QTableAgent::new(QTableAgentConfig::default(), 5);
        let params = SimParams::baseline(Sensitivity::Normal);

        // A little training so the policy is not pure initialization noise.
        let mut env = GlucoseSim::new(params.clone(), 40);
        for episode in 0..5 {
            agent.train_episode(&mut env, Some(EpisodeSchedule::new(episode, 5)));
        }

        let table_before = agent.table().clone();
        let history_len = agent.history().explored.len();

        let first = agent.evaluate_episode(&mut GlucoseSim::new(params.clone(), 123));
        let second = agent.evaluate_episode(&mut GlucoseSim::new(params, 123));

        assert_eq!(first, second, "Identical seeds replay identical episodes");
        assert_eq!(*agent.table(), table_before, "Evaluation never learns");
        assert_eq!(
            agent.history().explored.len(),
            history_len,
            "Evaluation leaves no history"
        );
    }
}
