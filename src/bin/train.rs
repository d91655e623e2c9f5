//! Offline trainer for the insulin dosing policy
//!
//! Synthesizes a patient population, trains one shared Q-table across it with
//! periodic checkpoint evaluations, and exports the learned table plus run
//! metadata for downstream reporting.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use strum::VariantArray;

use glycemic_rl::algo::tabular::{EpisodeSchedule, QTableAgent, QTableAgentConfig, TableStats};
use glycemic_rl::eval::{evaluate_policy, ClinicalSummary};
use glycemic_rl::sim::{Dose, GlucoseSim, PatientRecord, SimParams};
use glycemic_rl::state::Observation;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train an insulin dosing policy on simulated patients")]
struct Cli {
    /// Number of synthetic patients in the population
    #[arg(long, default_value_t = 200)]
    patients: usize,

    /// Training episodes per patient
    #[arg(long, default_value_t = 3)]
    episodes_per_patient: u32,

    /// Episodes between checkpoint evaluations
    #[arg(long, default_value_t = 500)]
    checkpoint_interval: u32,

    /// Patients sampled per checkpoint evaluation
    #[arg(long, default_value_t = 20)]
    eval_patients: usize,

    /// Seed for the population, the simulators, and the agent
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output directory for the exported table and metadata
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

/// Sample a plausible type-1 population; the clamps keep the tails inside the
/// ranges the simulator personalization is calibrated for.
fn synthesize_population(count: usize, rng: &mut StdRng) -> Vec<PatientRecord> {
    let weight = Normal::<f32>::new(75.0, 12.0).expect("deviation is finite and positive");
    let carbs = Normal::<f32>::new(70.0, 15.0).expect("deviation is finite and positive");
    let factor = Normal::<f32>::new(50.0, 15.0).expect("deviation is finite and positive");

    (0..count)
        .map(|i| PatientRecord {
            id: i as u32 + 1,
            weight_kg: weight.sample(rng).clamp(40.0, 130.0),
            carb_load: carbs.sample(rng).clamp(30.0, 150.0),
            sensitivity_factor: factor.sample(rng).clamp(20.0, 90.0),
        })
        .collect()
}

/// Greedy evaluation over a random sample of the population, one day each
fn evaluate_sample(
    agent: &QTableAgent,
    population: &[PatientRecord],
    count: usize,
    rng: &mut StdRng,
) -> Option<ClinicalSummary> {
    let summaries: Vec<ClinicalSummary> = population
        .choose_multiple(rng, count)
        .map(|patient| {
            let mut env = GlucoseSim::new(SimParams::for_patient(patient), rng.gen());
            evaluate_policy(agent, &mut env, 1)
        })
        .collect();
    ClinicalSummary::merge(&summaries)
}

#[derive(Serialize)]
struct RunMetadata {
    patients: usize,
    episodes: u32,
    seed: u64,
    alpha: f32,
    gamma: f32,
    best_checkpoint: Option<u32>,
    best_score: Option<f32>,
    table: TableStats,
    summary: Option<ClinicalSummary>,
}

fn export_table(agent: &QTableAgent, path: &Path) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "state",
        "glucose",
        "insulin",
        "recency",
        "sensitivity",
        "q_dose_0",
        "q_dose_5",
        "q_dose_10",
        "q_dose_15",
        "greedy_dose",
    ])?;

    let doses = Dose::VARIANTS;
    for (state, row) in agent.table().rows().enumerate() {
        let observation =
            Observation::from_index(state).context("table row without a state encoding")?;
        let mut record = vec![
            state.to_string(),
            observation.glucose.to_string(),
            observation.insulin.to_string(),
            observation.recency.to_string(),
            observation.sensitivity.to_string(),
        ];
        record.extend(row.iter().map(|q| q.to_string()));
        record.push(doses[agent.best_action(state)].units().to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let population = synthesize_population(cli.patients, &mut rng);
    let total_episodes = cli.patients as u32 * cli.episodes_per_patient;

    let config = QTableAgentConfig::default();
    let (alpha, gamma) = (config.alpha, config.gamma);
    let mut agent = QTableAgent::new(config, cli.seed);

    log::info!(
        "training over {} patients, {} episodes total (alpha {alpha}, gamma {gamma})",
        cli.patients,
        total_episodes
    );

    let mut episode = 0u32;
    let mut best_checkpoint: Option<u32> = None;
    let mut best_score: Option<f32> = None;

    for patient in &population {
        let mut env = GlucoseSim::new(SimParams::for_patient(patient), rng.gen());

        for _ in 0..cli.episodes_per_patient {
            let schedule = EpisodeSchedule::new(episode, total_episodes);
            agent.train_episode(&mut env, Some(schedule));
            episode += 1;

            if episode % 100 == 0 {
                let rewards = &agent.history().episode_rewards;
                let recent = &rewards[rewards.len().saturating_sub(100)..];
                let mean = recent.iter().sum::<f32>() / recent.len() as f32;
                log::info!("episode {episode}/{total_episodes} | mean reward (last 100): {mean:.1}");
            }

            if episode % cli.checkpoint_interval == 0 {
                if let Some(summary) =
                    evaluate_sample(&agent, &population, cli.eval_patients, &mut rng)
                {
                    let score = summary.score();
                    log::info!(
                        "checkpoint at episode {episode}: score {score:.1} | in range {:.1}% | \
                         hypo {:.1}% | hyper {:.1}%",
                        summary.time_in_range_pct,
                        summary.hypo_pct,
                        summary.hyper_pct
                    );
                    if best_score.map_or(true, |best| score > best) {
                        best_score = Some(score);
                        best_checkpoint = Some(episode);
                    }
                }
            }
        }

        let totals = env.report.take();
        log::debug!("patient {} totals: {totals:?}", patient.id);
    }

    let summary = evaluate_sample(&agent, &population, cli.eval_patients, &mut rng);
    if let Some(summary) = &summary {
        log::info!(
            "final policy: score {:.1} | in range {:.1}% | hypo {:.1}% | hyper {:.1}% | \
             mean glucose {:.0} mg/dL | mean dose {:.1} U",
            summary.score(),
            summary.time_in_range_pct,
            summary.hypo_pct,
            summary.hyper_pct,
            summary.mean_glucose,
            summary.mean_dose
        );
    }

    fs::create_dir_all(&cli.out)?;

    let table_path = cli.out.join("q_table.csv");
    export_table(&agent, &table_path)?;
    log::info!("value table exported to {}", table_path.display());

    let metadata = RunMetadata {
        patients: cli.patients,
        episodes: episode,
        seed: cli.seed,
        alpha,
        gamma,
        best_checkpoint,
        best_score,
        table: agent.stats(),
        summary,
    };
    let metadata_path = cli.out.join("metadata.json");
    fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;
    log::info!("run metadata exported to {}", metadata_path.display());

    Ok(())
}
