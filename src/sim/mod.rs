pub mod glucose;
pub mod patient;

pub use glucose::{Dose, GlucoseSim, EPISODE_STEPS, STEP_MINUTES};
pub use patient::{PatientRecord, SimParams, MEAL_TIMES};
