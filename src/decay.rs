/// An implementation of a time-decaying value
pub trait Decay {
    /// Calculate value at time `t`
    fn evaluate(&self, t: f32) -> f32;
}

// TODO: better error types
fn validate(vi: f32, vf: f32) -> Result<(), String> {
    (vi > vf)
        .then_some(())
        .ok_or_else(|| String::from("`vi` must be greater than `vf`"))
}

/// A constant value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constant {
    value: f32,
}

impl Constant {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Decay for Constant {
    fn evaluate(&self, _t: f32) -> f32 {
        self.value
    }
}

/// v(t) = max(v<sub>f</sub>, v<sub>i</sub> * (1 - t<sup>p</sup>))
///
/// Here `t` is the fraction of a training run completed rather than an absolute
/// timestep, so `v` falls from `vi` at the start of the run to `vf` at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polynomial {
    power: f32,
    vi: f32,
    vf: f32,
}

impl Polynomial {
    pub fn new(power: f32, vi: f32, vf: f32) -> Result<Self, String> {
        validate(vi, vf)?;
        (power > 0.0)
            .then_some(())
            .ok_or_else(|| String::from("`power` must be positive"))?;
        Ok(Self { power, vi, vf })
    }
}

impl Decay for Polynomial {
    fn evaluate(&self, t: f32) -> f32 {
        let &Self { power, vi, vf } = self;
        (vi * (1.0 - t.powf(power))).max(vf)
    }
}
