use serde::Serialize;

use crate::algo::tabular::QTableAgent;
use crate::env::{DiscreteActionSpace, Environment};
use crate::sim::GlucoseSim;

/// Aggregate clinical outcomes of a greedy policy over full simulated days
///
/// Readings are pooled across episodes; the three glucose percentages
/// partition every reading (below, within, above 70-180 mg/dL).
#[derive(Clone, Debug, Serialize)]
pub struct ClinicalSummary {
    pub episodes: usize,
    pub mean_reward: f32,
    /// Percentage of readings within 70-180 mg/dL
    pub time_in_range_pct: f32,
    /// Percentage of readings below 70 mg/dL
    pub hypo_pct: f32,
    /// Percentage of readings above 180 mg/dL
    pub hyper_pct: f32,
    pub mean_glucose: f32,
    /// Mean administered dose per step (units)
    pub mean_dose: f32,
}

impl ClinicalSummary {
    /// Composite score used to rank checkpoints
    ///
    /// Weights time in range at 0.5 and penalizes hypoglycemia five times as
    /// hard as hyperglycemia, mirroring their clinical severity.
    pub fn score(&self) -> f32 {
        self.time_in_range_pct * 0.5
            + (100.0 - self.hypo_pct * 10.0) * 0.3
            + (100.0 - self.hyper_pct * 2.0) * 0.2
    }

    /// Pool summaries from several patients, weighting by episode count
    pub fn merge(summaries: &[ClinicalSummary]) -> Option<ClinicalSummary> {
        let episodes: usize = summaries.iter().map(|s| s.episodes).sum();
        if episodes == 0 {
            return None;
        }
        let weighted = |f: fn(&ClinicalSummary) -> f32| {
            summaries
                .iter()
                .map(|s| f(s) * s.episodes as f32)
                .sum::<f32>()
                / episodes as f32
        };
        Some(ClinicalSummary {
            episodes,
            mean_reward: weighted(|s| s.mean_reward),
            time_in_range_pct: weighted(|s| s.time_in_range_pct),
            hypo_pct: weighted(|s| s.hypo_pct),
            hyper_pct: weighted(|s| s.hyper_pct),
            mean_glucose: weighted(|s| s.mean_glucose),
            mean_dose: weighted(|s| s.mean_dose),
        })
    }
}

/// Evaluate a greedy policy over `episodes` full days on one simulator
///
/// Runs the same loop as [`QTableAgent::evaluate_episode`] but also samples the
/// simulator's continuous glucose after every step, which the agent itself
/// never sees.
pub fn evaluate_policy(agent: &QTableAgent, env: &mut GlucoseSim, episodes: usize) -> ClinicalSummary {
    let actions = env.actions();

    let mut total_reward = 0.0;
    let mut readings = 0usize;
    let mut in_range = 0usize;
    let mut hypo = 0usize;
    let mut hyper = 0usize;
    let mut glucose_sum = 0.0;
    let mut dose_sum = 0.0;

    for _ in 0..episodes {
        let mut state = env.reset().index();
        loop {
            let action = agent.best_action(state);
            let dose = actions[action];
            let (next_state, reward, terminal) = env.step(dose);

            let glucose = env.glucose();
            readings += 1;
            glucose_sum += glucose;
            dose_sum += dose.units();
            if glucose < 70.0 {
                hypo += 1;
            } else if glucose <= 180.0 {
                in_range += 1;
            } else {
                hyper += 1;
            }

            state = next_state.index();
            total_reward += reward;
            if terminal {
                break;
            }
        }
    }

    let pct = |count: usize| count as f32 / readings.max(1) as f32 * 100.0;
    ClinicalSummary {
        episodes,
        mean_reward: total_reward / episodes.max(1) as f32,
        time_in_range_pct: pct(in_range),
        hypo_pct: pct(hypo),
        hyper_pct: pct(hyper),
        mean_glucose: glucose_sum / readings.max(1) as f32,
        mean_dose: dose_sum / readings.max(1) as f32,
    }
}

#[cfg(test)]
mod tests {
    use crate::algo::tabular::QTableAgentConfig;
    use crate::sim::{SimParams, EPISODE_STEPS};
    use crate::state::Sensitivity;

    use super::*;

    fn summary(in_range: f32, hypo: f32, hyper: f32) -> ClinicalSummary {
        ClinicalSummary {
            episodes: 1,
            mean_reward: 0.0,
            time_in_range_pct: in_range,
            hypo_pct: hypo,
            hyper_pct: hyper,
            mean_glucose: 120.0,
            mean_dose: 5.0,
        }
    }

    #[test]
    fn score_weighs_hypoglycemia_hardest() {
        let perfect = summary(100.0, 0.0, 0.0);
        assert_eq!(perfect.score(), 100.0, "Perfect control scores 100");

        let hypo = summary(90.0, 10.0, 0.0);
        let hyper = summary(90.0, 0.0, 10.0);
        assert!(
            hypo.score() < hyper.score(),
            "Hypoglycemia is punished harder than hyperglycemia"
        );
    }

    #[test]
    fn merge_weights_by_episodes() {
        let mut a = summary(100.0, 0.0, 0.0);
        a.episodes = 3;
        let b = summary(0.0, 100.0, 0.0);
        let merged = ClinicalSummary::merge(&[a, b]).unwrap();
        assert_eq!(merged.episodes, 4);
        assert_eq!(merged.time_in_range_pct, 75.0, "Weighted pooling");
        assert_eq!(merged.hypo_pct, 25.0, "Weighted pooling");
        assert!(ClinicalSummary::merge(&[]).is_none(), "Nothing to merge");
    }

    #[test]
    fn percentages_partition_the_readings() {
        let agent = QTableAgent::new(QTableAgentConfig::default(), 9);
        let mut env = GlucoseSim::new(SimParams::baseline(Sensitivity::Normal), 9);

        let summary = evaluate_policy(&agent, &mut env, 4);

        assert_eq!(summary.episodes, 4);
        assert_eq!(env.report["steps"], 4.0 * EPISODE_STEPS as f32);
        let total = summary.time_in_range_pct + summary.hypo_pct + summary.hyper_pct;
        assert!((total - 100.0).abs() < 1e-3, "Bands cover every reading");
        assert!(
            (40.0..=400.0).contains(&summary.mean_glucose),
            "Mean glucose within the simulator clamp"
        );
    }
}
