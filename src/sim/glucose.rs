use rand::{rngs::StdRng, seq::IteratorRandom, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use strum::{EnumCount, EnumIter, IntoEnumIterator, VariantArray};

use crate::env::{DiscreteActionSpace, Environment, Report};
use crate::sim::patient::{SimParams, MEAL_TIMES};
use crate::state::{DoseRecency, GlucoseBand, InsulinOnBoard, Observation};

/// Length of one simulation step in minutes
pub const STEP_MINUTES: u32 = 30;

/// Steps per episode: one simulated day at 30-minute resolution
pub const EPISODE_STEPS: u32 = 48;

/// Fraction of active insulin remaining after each step
const INSULIN_DECAY: f32 = 0.75;

/// Active insulin below this is cleared entirely (units)
const INSULIN_FLOOR: f32 = 0.5;

/// Standard deviation of the per-step glucose noise (mg/dL)
const NOISE_SD: f32 = 5.0;

/// Insulin doses an agent can administer each step
#[derive(EnumCount, EnumIter, VariantArray, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dose {
    Zero = 0,
    Five = 1,
    Ten = 2,
    Fifteen = 3,
}

impl Dose {
    /// Dose size in insulin units
    pub fn units(self) -> f32 {
        self as u8 as f32 * 5.0
    }
}

/// Discrete-time simulator of one patient's glucose dynamics
///
/// Owns the continuous physiological state and exposes it to an agent only as
/// the discretized [`Observation`]. The random source is seeded at
/// construction, so a run is reproducible.
pub struct GlucoseSim {
    params: SimParams,
    glucose: f32,
    active_insulin: f32,
    time_since_dose: u32,
    elapsed_minutes: u32,
    steps: u32,
    noise: Normal<f32>,
    rng: StdRng,
    pub report: Report,
}

impl GlucoseSim {
    pub fn new(params: SimParams, seed: u64) -> Self {
        let mut sim = Self {
            params,
            glucose: 0.0,
            active_insulin: 0.0,
            time_since_dose: 0,
            elapsed_minutes: 0,
            steps: 0,
            noise: Normal::new(0.0, NOISE_SD).expect("noise deviation is finite and positive"),
            rng: StdRng::seed_from_u64(seed),
            report: Report::new(vec!["reward", "steps"]),
        };
        sim.reset();
        sim
    }

    /// Current continuous glucose reading (mg/dL)
    pub fn glucose(&self) -> f32 {
        self.glucose
    }

    /// Insulin still acting from previous doses (units)
    pub fn active_insulin(&self) -> f32 {
        self.active_insulin
    }

    /// Minutes elapsed since the episode started
    pub fn clock(&self) -> u32 {
        self.elapsed_minutes
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    fn observe(&self) -> Observation {
        Observation {
            glucose: GlucoseBand::from_mgdl(self.glucose),
            insulin: InsulinOnBoard::from_units(self.active_insulin),
            recency: DoseRecency::from_minutes(self.time_since_dose),
            sensitivity: self.params.sensitivity,
        }
    }

    /// Summed meal contribution at the current clock
    ///
    /// Each meal is a triangular pulse: rising linearly for 60 minutes after
    /// the meal, falling back over the next 30, zero outside that window.
    fn meal_effect(&self) -> f32 {
        let mut effect = 0.0;
        for meal in MEAL_TIMES {
            let since = self.elapsed_minutes as i64 - meal as i64;
            let progression = match since {
                0..=60 => since as f32 / 60.0,
                61..=90 => 1.0 - (since - 60) as f32 / 30.0,
                _ => continue,
            };
            effect += self.params.meal_strength * progression;
        }
        effect
    }

    /// Tiered reward over the post-update glucose and the dose just given
    ///
    /// The 60-70 and 180-260 gaps deliberately fall through to the mild
    /// penalty; the tiers are thresholds, not a smooth function.
    fn reward(&self, dose: f32) -> f32 {
        if (70.0..=180.0).contains(&self.glucose) {
            10.0
        } else if self.glucose < 60.0 {
            -20.0
        } else if self.glucose > 260.0 {
            -15.0
        } else if dose > 20.0 {
            -5.0
        } else {
            -1.0
        }
    }
}

impl Environment for GlucoseSim {
    type State = Observation;
    type Action = Dose;

    fn reset(&mut self) -> Observation {
        self.glucose = self.rng.gen_range(80.0..160.0);
        self.active_insulin = 0.0;
        self.time_since_dose = self.rng.gen_range(120..300);
        self.elapsed_minutes = 0;
        self.steps = 0;
        self.observe()
    }

    fn step(&mut self, action: Dose) -> (Observation, f32, bool) {
        self.report.entry("steps").and_modify(|x| *x += 1.0);

        let dose = action.units();
        if dose > 0.0 {
            self.active_insulin += dose;
            self.time_since_dose = 0;
        }

        let delta = self.params.basal_rise + self.meal_effect()
            - self.active_insulin * self.params.insulin_effect
            + self.noise.sample(&mut self.rng);

        self.glucose = (self.glucose + delta).clamp(40.0, 400.0);

        self.active_insulin *= INSULIN_DECAY;
        if self.active_insulin < INSULIN_FLOOR {
            self.active_insulin = 0.0;
        }

        self.time_since_dose += STEP_MINUTES;
        self.elapsed_minutes += STEP_MINUTES;
        self.steps += 1;

        let reward = self.reward(dose);
        self.report.entry("reward").and_modify(|x| *x += reward);

        (self.observe(), reward, self.steps >= EPISODE_STEPS)
    }

    fn random_action(&mut self) -> Dose {
        Dose::iter()
            .choose(&mut self.rng)
            .expect("Iterator is not empty")
    }
}

impl DiscreteActionSpace for GlucoseSim {
    fn actions(&self) -> Vec<Dose> {
        Dose::VARIANTS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use crate::state::Sensitivity;

    use super::*;

    fn sim() -> GlucoseSim {
        GlucoseSim::new(SimParams::baseline(Sensitivity::Normal), 7)
    }

    #[test]
    fn reward_tiers() {
        let mut env = sim();

        env.glucose = 150.0;
        assert_eq!(env.reward(0.0), 10.0, "In range");
        env.glucose = 55.0;
        assert_eq!(env.reward(0.0), -20.0, "Severe hypoglycemia");
        env.glucose = 280.0;
        assert_eq!(env.reward(0.0), -15.0, "Severe hyperglycemia");
        env.glucose = 200.0;
        assert_eq!(env.reward(25.0), -5.0, "Excessive dose");
        env.glucose = 200.0;
        assert_eq!(env.reward(0.0), -1.0, "Mild penalty in the gap");
        env.glucose = 65.0;
        assert_eq!(env.reward(0.0), -1.0, "60-70 gap is only mildly penalized");
        env.glucose = 70.0;
        assert_eq!(env.reward(0.0), 10.0, "Boundary at 70 is in range");
        env.glucose = 180.0;
        assert_eq!(env.reward(0.0), 10.0, "Boundary at 180 is in range");
    }

    #[test]
    fn episode_terminates_after_48_steps() {
        let mut env = sim();
        env.reset();
        for step in 1..=EPISODE_STEPS {
            let (_, _, terminal) = env.step(Dose::Zero);
            assert_eq!(
                terminal,
                step == EPISODE_STEPS,
                "Terminal only on step {EPISODE_STEPS}"
            );
        }
        assert_eq!(env.report["steps"], EPISODE_STEPS as f32, "Steps reported");
    }

    #[test]
    fn reset_initializes_within_bounds() {
        let mut env = sim();
        for _ in 0..100 {
            env.reset();
            assert!(
                (80.0..160.0).contains(&env.glucose),
                "Initial glucose in [80, 160)"
            );
            assert_eq!(env.active_insulin, 0.0, "No insulin on board at reset");
            assert!(
                (120..300).contains(&env.time_since_dose),
                "Last dose 2-5 hours ago"
            );
            assert_eq!(env.clock(), 0, "Clock restarts");
        }
    }

    #[test]
    fn dosing_tracks_insulin_and_recency() {
        let mut env = sim();
        env.reset();

        let (observation, _, _) = env.step(Dose::Ten);
        assert_eq!(
            observation.recency,
            DoseRecency::Within60,
            "Dose resets recency to the current step"
        );
        assert_eq!(
            env.active_insulin,
            10.0 * INSULIN_DECAY,
            "Insulin decays after taking effect"
        );

        let (observation, _, _) = env.step(Dose::Zero);
        assert_eq!(
            env.active_insulin,
            10.0 * INSULIN_DECAY * INSULIN_DECAY,
            "Insulin keeps decaying without a dose"
        );
        assert_eq!(
            observation.recency,
            DoseRecency::Within60,
            "One hour has not yet passed"
        );

        for _ in 0..10 {
            env.step(Dose::Zero);
        }
        assert_eq!(env.active_insulin, 0.0, "Residual insulin clears below 0.5");
    }

    #[test]
    fn glucose_stays_clamped() {
        let mut params = SimParams::baseline(Sensitivity::Normal);
        params.basal_rise = 500.0;
        let mut env = GlucoseSim::new(params, 3);
        env.step(Dose::Zero);
        assert_eq!(env.glucose(), 400.0, "Upper clamp");

        let mut params = SimParams::baseline(Sensitivity::Normal);
        params.basal_rise = -500.0;
        let mut env = GlucoseSim::new(params, 3);
        env.step(Dose::Zero);
        assert_eq!(env.glucose(), 40.0, "Lower clamp");
    }

    #[test]
    fn meal_pulses_are_triangular() {
        let mut env = sim();
        env.reset();

        env.elapsed_minutes = MEAL_TIMES[0];
        assert_eq!(env.meal_effect(), 0.0, "Nothing absorbed at meal time");
        env.elapsed_minutes = MEAL_TIMES[0] + 30;
        assert_eq!(env.meal_effect(), 12.5, "Halfway up the pulse");
        env.elapsed_minutes = MEAL_TIMES[0] + 60;
        assert_eq!(env.meal_effect(), 25.0, "Peak one hour after eating");
        env.elapsed_minutes = MEAL_TIMES[0] + 90;
        assert_eq!(env.meal_effect(), 0.0, "Pulse over at 90 minutes");
        env.elapsed_minutes = MEAL_TIMES[0] - 30;
        assert_eq!(env.meal_effect(), 0.0, "No effect before the meal");
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let params = SimParams::baseline(Sensitivity::High);
        let mut a = GlucoseSim::new(params.clone(), 99);
        let mut b = GlucoseSim::new(params, 99);

        assert_eq!(a.reset(), b.reset(), "Initial observations match");
        for _ in 0..EPISODE_STEPS {
            let step_a = a.step(Dose::Five);
            let step_b = b.step(Dose::Five);
            assert_eq!(step_a, step_b, "Transitions match");
            assert_eq!(a.glucose(), b.glucose(), "Continuous state matches");
        }
    }
}
