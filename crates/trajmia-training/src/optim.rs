//! Stochastic gradient descent with momentum and weight decay.

use crate::error::{TrainingError, TrainingResult};
use ndarray::Array1;
use trajmia_abstraction::{ModelError, Optimizer, Parameter};

/// SGD over a single parameter group.
///
/// Parameters with `requires_grad == false` are skipped, so a frozen
/// parameter never moves even if a gradient was accumulated into it.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    weight_decay: f64,
    velocities: Vec<Option<Array1<f32>>>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64, weight_decay: f64) -> TrainingResult<Self> {
        if !lr.is_finite() || lr < 0.0 {
            return Err(TrainingError::Configuration(format!("learning_rate must be finite and >= 0, got {lr}")));
        }
        if !(0.0..1.0).contains(&momentum) {
            return Err(TrainingError::Configuration(format!("momentum must be in [0, 1), got {momentum}")));
        }
        if !weight_decay.is_finite() || weight_decay < 0.0 {
            return Err(TrainingError::Configuration(format!(
                "weight_decay must be finite and >= 0, got {weight_decay}"
            )));
        }
        Ok(Self { lr, momentum, weight_decay, velocities: Vec::new() })
    }
}

impl Optimizer for Sgd {
    fn learning_rates(&self) -> Vec<f64> {
        vec![self.lr]
    }

    fn set_learning_rates(&mut self, rates: &[f64]) -> Result<(), ModelError> {
        match rates {
            [rate] => {
                self.lr = *rate;
                Ok(())
            }
            _ => Err(ModelError::Parameter(format!("SGD has one parameter group, got {} rates", rates.len()))),
        }
    }

    fn step(&mut self, params: &mut [Parameter]) -> Result<(), ModelError> {
        if self.velocities.is_empty() {
            self.velocities = vec![None; params.len()];
        }
        if self.velocities.len() != params.len() {
            return Err(ModelError::Parameter(format!(
                "optimizer tracks {} parameters, got {}",
                self.velocities.len(),
                params.len()
            )));
        }

        let lr = self.lr as f32;
        let momentum = self.momentum as f32;
        let weight_decay = self.weight_decay as f32;
        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            if !param.requires_grad {
                continue;
            }
            let mut update = param.grad.clone();
            if weight_decay > 0.0 {
                update.scaled_add(weight_decay, &param.value);
            }
            if momentum > 0.0 {
                let buffer = velocity.get_or_insert_with(|| Array1::zeros(update.len()));
                buffer.mapv_inplace(|v| v * momentum);
                *buffer += &update;
                update.assign(&*buffer);
            }
            param.value.scaled_add(-lr, &update);
        }
        Ok(())
    }
}
