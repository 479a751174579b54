//! Learning rate schedules.
//!
//! A schedule is indexed by completed epochs. Training epoch `e` (numbered
//! from 1) uses `rates_for(e - 1)`, read through `current_rates`, and the
//! trainer calls `step` once the epoch completes.

use crate::error::{TrainingError, TrainingResult};
use std::f64::consts::PI;

pub trait LrSchedule: Send {
    /// Rate of every parameter group once `epoch` epochs have completed.
    fn rates_for(&self, epoch: u32) -> Vec<f64>;

    fn last_epoch(&self) -> u32;

    /// Marks one more epoch as completed.
    fn step(&mut self);

    /// Repositions the schedule after `last_epoch` completed epochs.
    fn seek(&mut self, last_epoch: u32);

    fn next_epoch(&self) -> u32 {
        self.last_epoch() + 1
    }

    /// Rates of the epoch about to be trained.
    fn current_rates(&self) -> Vec<f64> {
        self.rates_for(self.last_epoch())
    }
}

/// Rounds a rate to 8 decimal digits.
#[must_use]
pub fn round_rate(rate: f64) -> f64 {
    (rate * 1e8).round() / 1e8
}

fn validate_base_rates(base_rates: &[f64]) -> TrainingResult<()> {
    if base_rates.is_empty() {
        return Err(TrainingError::InvalidSchedule("at least one base rate is required".to_string()));
    }
    if let Some(rate) = base_rates.iter().find(|r| !r.is_finite() || **r < 0.0) {
        return Err(TrainingError::InvalidSchedule(format!("base rate must be finite and >= 0, got {rate}")));
    }
    Ok(())
}

/// Multiplies the base rate by one decay factor per milestone reached.
///
/// After `e` completed epochs the rate is `base * gammas[0] * ... *
/// gammas[c - 1]` where `c` counts the milestones `<= e`.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneSchedule {
    base_rates: Vec<f64>,
    milestones: Vec<u32>,
    gammas: Vec<f64>,
    last_epoch: u32,
}

impl MilestoneSchedule {
    pub fn new(base_rates: Vec<f64>, milestones: Vec<u32>, gammas: Vec<f64>) -> TrainingResult<Self> {
        validate_base_rates(&base_rates)?;
        if let Some(pair) = milestones.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(TrainingError::InvalidSchedule(format!(
                "milestones must be strictly increasing, got {} then {}",
                pair[0], pair[1]
            )));
        }
        if gammas.len() != milestones.len() {
            return Err(TrainingError::InvalidSchedule(format!(
                "{} milestones need {} gammas, got {}",
                milestones.len(),
                milestones.len(),
                gammas.len()
            )));
        }
        if let Some(gamma) = gammas.iter().find(|g| !g.is_finite() || **g < 0.0) {
            return Err(TrainingError::InvalidSchedule(format!("gamma must be finite and >= 0, got {gamma}")));
        }
        Ok(Self { base_rates, milestones, gammas, last_epoch: 0 })
    }

    #[must_use]
    pub fn with_last_epoch(mut self, last_epoch: u32) -> Self {
        self.last_epoch = last_epoch;
        self
    }

    #[must_use]
    pub fn base_rates(&self) -> &[f64] {
        &self.base_rates
    }

    #[must_use]
    pub fn milestones(&self) -> &[u32] {
        &self.milestones
    }

    /// Rate of the last parameter group after `epoch` completed epochs.
    #[must_use]
    pub fn rate_for(&self, epoch: u32) -> f64 {
        let base = self.base_rates.last().copied().unwrap_or_default();
        round_rate(base * self.decay(epoch))
    }

    fn decay(&self, epoch: u32) -> f64 {
        let reached = self.milestones.partition_point(|&m| m <= epoch);
        self.gammas[..reached].iter().product()
    }
}

impl LrSchedule for MilestoneSchedule {
    fn rates_for(&self, epoch: u32) -> Vec<f64> {
        let decay = self.decay(epoch);
        self.base_rates.iter().map(|base| round_rate(base * decay)).collect()
    }

    fn last_epoch(&self) -> u32 {
        self.last_epoch
    }

    fn step(&mut self) {
        self.last_epoch += 1;
    }

    fn seek(&mut self, last_epoch: u32) {
        self.last_epoch = last_epoch;
    }
}

/// Cosine annealing from the base rate down to `eta_min` over `t_max`
/// epochs, holding `eta_min` afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineSchedule {
    base_rates: Vec<f64>,
    t_max: u32,
    eta_min: f64,
    last_epoch: u32,
}

impl CosineSchedule {
    pub fn new(base_rates: Vec<f64>, t_max: u32, eta_min: f64) -> TrainingResult<Self> {
        validate_base_rates(&base_rates)?;
        if t_max == 0 {
            return Err(TrainingError::InvalidSchedule("t_max must be >= 1".to_string()));
        }
        if !eta_min.is_finite() || eta_min < 0.0 {
            return Err(TrainingError::InvalidSchedule(format!("eta_min must be finite and >= 0, got {eta_min}")));
        }
        Ok(Self { base_rates, t_max, eta_min, last_epoch: 0 })
    }
}

impl LrSchedule for CosineSchedule {
    fn rates_for(&self, epoch: u32) -> Vec<f64> {
        if epoch >= self.t_max {
            return vec![self.eta_min; self.base_rates.len()];
        }
        let progress = f64::from(epoch) / f64::from(self.t_max);
        let cosine = 0.5 * (1.0 + (PI * progress).cos());
        self.base_rates.iter().map(|base| self.eta_min + (base - self.eta_min) * cosine).collect()
    }

    fn last_epoch(&self) -> u32 {
        self.last_epoch
    }

    fn step(&mut self) {
        self.last_epoch += 1;
    }

    fn seek(&mut self, last_epoch: u32) {
        self.last_epoch = last_epoch;
    }
}
