use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, FromRepr, VariantArray};

/// Number of discrete patient states
pub const STATE_COUNT: usize =
    GlucoseBand::COUNT * InsulinOnBoard::COUNT * DoseRecency::COUNT * Sensitivity::COUNT;

/// Glucose reading bands (mg/dL)
#[derive(
    Display, EnumCount, EnumIter, EnumString, FromRepr, VariantArray, Clone, Copy, Debug, PartialEq,
    Eq, Hash,
)]
pub enum GlucoseBand {
    #[strum(serialize = "<70")]
    Low = 0,
    #[strum(serialize = "70-180")]
    InRange = 1,
    #[strum(serialize = "180-250")]
    Elevated = 2,
    #[strum(serialize = ">250")]
    Severe = 3,
}

impl GlucoseBand {
    /// Classify a continuous glucose reading
    pub fn from_mgdl(glucose: f32) -> Self {
        if glucose < 70.0 {
            Self::Low
        } else if glucose <= 180.0 {
            Self::InRange
        } else if glucose <= 250.0 {
            Self::Elevated
        } else {
            Self::Severe
        }
    }
}

/// Insulin still acting from previous doses, bucketed to multiples of 5 units
#[derive(
    Display, EnumCount, EnumIter, EnumString, FromRepr, VariantArray, Clone, Copy, Debug, PartialEq,
    Eq, Hash,
)]
pub enum InsulinOnBoard {
    #[strum(serialize = "0")]
    Zero = 0,
    #[strum(serialize = "5")]
    Five = 1,
    #[strum(serialize = "10")]
    Ten = 2,
    #[strum(serialize = "15")]
    Fifteen = 3,
    #[strum(serialize = "20")]
    Twenty = 4,
}

impl InsulinOnBoard {
    /// Bucket a continuous amount of active insulin, saturating at 20 units
    pub fn from_units(units: f32) -> Self {
        let bucket = ((units / 5.0).round() as usize).min(Self::COUNT - 1);
        Self::from_repr(bucket).expect("bucket is clamped to a valid discriminant")
    }

    /// Nominal units represented by this bucket
    pub fn units(self) -> u8 {
        self as u8 * 5
    }
}

/// Minutes elapsed since the last non-zero dose, bucketed
#[derive(
    Display, EnumCount, EnumIter, EnumString, FromRepr, VariantArray, Clone, Copy, Debug, PartialEq,
    Eq, Hash,
)]
pub enum DoseRecency {
    #[strum(serialize = "0-60")]
    Within60 = 0,
    #[strum(serialize = "60-120")]
    Within120 = 1,
    #[strum(serialize = "120-240")]
    Within240 = 2,
    #[strum(serialize = ">240")]
    Over240 = 3,
}

impl DoseRecency {
    /// Bucket minutes since the last dose
    pub fn from_minutes(minutes: u32) -> Self {
        if minutes <= 60 {
            Self::Within60
        } else if minutes <= 120 {
            Self::Within120
        } else if minutes <= 240 {
            Self::Within240
        } else {
            Self::Over240
        }
    }
}

/// A patient's insulin sensitivity class, fixed for the lifetime of a simulator
#[derive(
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    FromRepr,
    VariantArray,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// A discrete snapshot of patient physiology, the state the agent observes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Observation {
    pub glucose: GlucoseBand,
    pub insulin: InsulinOnBoard,
    pub recency: DoseRecency,
    pub sensitivity: Sensitivity,
}

impl Observation {
    /// Dense table index in `0..STATE_COUNT`
    ///
    /// The weights mirror the category counts (5 insulin × 4 recency × 3
    /// sensitivity), so the mapping is a bijection for valid variants. The
    /// modulo only guards against a category list outgrowing `STATE_COUNT`.
    pub fn index(&self) -> usize {
        let g = self.glucose as usize;
        let i = self.insulin as usize;
        let t = self.recency as usize;
        let s = self.sensitivity as usize;
        (g * 60 + i * 12 + t * 3 + s) % STATE_COUNT
    }

    /// Recover the observation a table index encodes
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= STATE_COUNT {
            return None;
        }
        Some(Self {
            glucose: GlucoseBand::from_repr(index / 60)?,
            insulin: InsulinOnBoard::from_repr(index % 60 / 12)?,
            recency: DoseRecency::from_repr(index % 12 / 3)?,
            sensitivity: Sensitivity::from_repr(index % 3)?,
        })
    }

    /// Parse an observation from raw category labels
    pub fn from_labels(
        glucose: &str,
        insulin: &str,
        recency: &str,
        sensitivity: &str,
    ) -> Option<Self> {
        Some(Self {
            glucose: glucose.parse().ok()?,
            insulin: insulin.parse().ok()?,
            recency: recency.parse().ok()?,
            sensitivity: sensitivity.parse().ok()?,
        })
    }

    /// Table index for raw category labels, substituting state 0 for unknown ones
    ///
    /// An unknown label indicates a bug in the collaborator that produced it, so
    /// it is logged rather than propagated and the episode loop continues on the
    /// default state.
    pub fn index_for_labels(
        glucose: &str,
        insulin: &str,
        recency: &str,
        sensitivity: &str,
    ) -> usize {
        match Self::from_labels(glucose, insulin, recency, sensitivity) {
            Some(observation) => observation.index(),
            None => {
                log::warn!(
                    "unknown state category in ({glucose}, {insulin}, {recency}, {sensitivity}), \
                     defaulting to state 0"
                );
                0
            }
        }
    }
}
