use serde::{Deserialize, Serialize};

use crate::state::Sensitivity;

/// Daily meal times, in minutes from the start of an episode (midnight)
pub const MEAL_TIMES: [u32; 3] = [8 * 60, 13 * 60, 20 * 60];

/// Peak glucose contribution of one reference meal (mg/dL)
const BASE_MEAL_STRENGTH: f32 = 25.0;

/// Reference values the physiological constants are scaled against
const REFERENCE_WEIGHT_KG: f32 = 70.0;
const REFERENCE_CARB_LOAD: f32 = 70.0;
const REFERENCE_SENSITIVITY_FACTOR: f32 = 50.0;

/// Glucose reduction per unit of insulin for a normally sensitive patient
const REFERENCE_INSULIN_EFFECT: f32 = 2.5;

/// External description of a patient, supplied by the population collaborator
///
/// Only used to derive the physiological scaling constants in [`SimParams`];
/// the crate does not parse patient files or manage their storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: u32,
    pub weight_kg: f32,
    /// Daily carbohydrate load in grams
    pub carb_load: f32,
    /// Insulin sensitivity factor (mg/dL dropped per unit)
    pub sensitivity_factor: f32,
}

impl PatientRecord {
    /// Sensitivity class derived from the sensitivity factor
    pub fn sensitivity(&self) -> Sensitivity {
        if self.sensitivity_factor < 40.0 {
            Sensitivity::Low
        } else if self.sensitivity_factor < 60.0 {
            Sensitivity::Normal
        } else {
            Sensitivity::High
        }
    }
}

/// Physiological constants driving one simulated patient
///
/// Supplied at simulator construction and never mutated afterwards; callers
/// that want a personalized simulator build new params instead of reaching into
/// a running instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimParams {
    /// Steady glucose rise per 30-minute step (mg/dL)
    pub basal_rise: f32,
    /// Peak glucose contribution of one meal (mg/dL)
    pub meal_strength: f32,
    /// Glucose reduction per unit of active insulin (mg/dL)
    pub insulin_effect: f32,
    /// Sensitivity class reported in every observation
    pub sensitivity: Sensitivity,
}

impl SimParams {
    /// Baseline constants for a sensitivity class
    pub fn baseline(sensitivity: Sensitivity) -> Self {
        let (insulin_effect, basal_rise) = match sensitivity {
            Sensitivity::Low => (1.5, 2.0),
            Sensitivity::Normal => (2.5, 2.2),
            Sensitivity::High => (3.5, 2.5),
        };
        Self {
            basal_rise,
            meal_strength: BASE_MEAL_STRENGTH,
            insulin_effect,
            sensitivity,
        }
    }

    /// Personalize the baseline constants for a patient
    ///
    /// Basal rise scales with body weight, meal strength with carbohydrate
    /// load, and insulin effect inversely with the sensitivity factor (floored
    /// at 20 to keep the effect bounded).
    pub fn for_patient(patient: &PatientRecord) -> Self {
        let mut params = Self::baseline(patient.sensitivity());
        params.basal_rise *= patient.weight_kg / REFERENCE_WEIGHT_KG;
        params.meal_strength = BASE_MEAL_STRENGTH * patient.carb_load / REFERENCE_CARB_LOAD;
        params.insulin_effect = REFERENCE_INSULIN_EFFECT * REFERENCE_SENSITIVITY_FACTOR
            / patient.sensitivity_factor.max(20.0);
        params
    }
}
