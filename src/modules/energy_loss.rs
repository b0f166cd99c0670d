//! Continuous energy losses

use crate::{
    candidate::Candidate,
    error::{ensure_positive, ConfigError},
    linalg::Vector3,
    module::Module,
    numeric::Float,
    particle::ParticleId,
};
use prefix_num_ops::real::*;
use std::sync::Arc;

/// Energy loss rate collaborator
pub trait EnergyLossRate: Send + Sync {
    /// Energy loss length E / (dE/dx) (m), infinite if there is no loss
    fn loss_length(&self, id: ParticleId, energy: Float, position: &Vector3) -> Float;
}

/// Energy loss with a constant loss length, for all particles
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantLossLength(Float);
//
impl ConstantLossLength {
    /// Loss rate of `1 / loss_length` (m)
    pub fn new(loss_length: Float) -> Result<Self, ConfigError> {
        ensure_positive("ConstantLossLength", "loss_length", loss_length).map(Self)
    }
}

impl EnergyLossRate for ConstantLossLength {
    fn loss_length(&self, _id: ParticleId, _energy: Float, _position: &Vector3) -> Float {
        self.0
    }
}

/// Continuous energy loss, integrated exactly over each step
///
/// Over a step of length s with loss length L, the energy becomes
/// E exp(-s / L). The next step is limited so that at most `max_fraction` of
/// the energy is lost in one step.
///
pub struct ContinuousEnergyLoss {
    rate: Arc<dyn EnergyLossRate>,
    max_fraction: Float,
}
//
impl ContinuousEnergyLoss {
    /// Module applying the given loss rate, capped per step
    pub fn new(rate: Arc<dyn EnergyLossRate>) -> Self {
        Self {
            rate,
            max_fraction: 0.1,
        }
    }

    /// Largest energy fraction lost in one step
    pub fn set_max_fraction(&mut self, max_fraction: Float) -> Result<(), ConfigError> {
        if !(max_fraction > 0. && max_fraction < 1.) {
            return Err(ConfigError::OutOfRange {
                module: "ContinuousEnergyLoss",
                parameter: "max_fraction",
                value: max_fraction,
                expected: "0 < max_fraction < 1",
            });
        }
        self.max_fraction = max_fraction;
        Ok(())
    }
}

impl Module for ContinuousEnergyLoss {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let id = candidate.current.id();
        let position = *candidate.current.position();
        let length = self
            .rate
            .loss_length(id, candidate.current.energy(), &position);
        if !(length > 0.) || !length.is_finite() {
            return;
        }

        let step = candidate.current_step();
        let energy = candidate.current.energy() * exp(-step / length);
        candidate.current.set_energy(energy);

        // Stepping ln(1 / (1 - f)) loss lengths loses a fraction f of the energy
        let new_length = self.rate.loss_length(id, energy, &position);
        if new_length > 0. && new_length.is_finite() {
            candidate.limit_next_step(-ln(1. - self.max_fraction) * new_length);
        }
    }

    fn description(&self) -> String {
        format!(
            "ContinuousEnergyLoss: at most {}% of the energy lost per step",
            100. * self.max_fraction
        )
    }
}

/// Loss of a fixed fraction of the energy for every step that was taken
///
/// Mostly useful for testing, since the energy after n steps is known to be
/// E (1 - f)^n whatever the step sizes.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FractionPerStep {
    fraction: Float,
}
//
impl FractionPerStep {
    /// Lose `fraction` of the energy at each step, in (0, 1]
    pub fn new(fraction: Float) -> Result<Self, ConfigError> {
        if !(fraction > 0. && fraction <= 1.) {
            return Err(ConfigError::OutOfRange {
                module: "FractionPerStep",
                parameter: "fraction",
                value: fraction,
                expected: "0 < fraction <= 1",
            });
        }
        Ok(Self { fraction })
    }

    /// Halve the energy at every step
    pub fn halving() -> Self {
        Self { fraction: 0.5 }
    }
}

impl Module for FractionPerStep {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() || !(candidate.current_step() > 0.) {
            return;
        }
        let energy = candidate.current.energy() * (1. - self.fraction);
        candidate.current.set_energy(energy);
    }

    fn description(&self) -> String {
        format!("FractionPerStep: {}% of the energy lost per step", 100. * self.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{candidate::InactiveReason, module::tests::proton};

    #[test]
    fn exponential_loss_over_one_step() {
        let module = ContinuousEnergyLoss::new(Arc::new(ConstantLossLength::new(2.).unwrap()));
        let mut c = proton(8.);
        c.set_next_step(100.);
        c.set_current_step(2.);
        module.process(&mut c);
        assert!((c.current.energy() - 8. * (-1.0 as Float).exp()).abs() < 1e-12);
        assert!((c.next_step() - 2. * -(0.9 as Float).ln()).abs() < 1e-12);
    }

    #[test]
    fn no_loss_without_step() {
        let module = FractionPerStep::halving();
        let mut c = proton(8.);
        module.process(&mut c);
        assert_eq!(c.current.energy(), 8.);
        c.set_current_step(1.);
        module.process(&mut c);
        assert_eq!(c.current.energy(), 4.);
    }

    #[test]
    fn inactive_candidates_keep_their_energy() {
        let module = FractionPerStep::halving();
        let mut c = proton(8.);
        c.set_current_step(1.);
        c.set_inactive(InactiveReason::BelowEnergy);
        module.process(&mut c);
        assert_eq!(c.current.energy(), 8.);
    }

    #[test]
    fn invalid_parameters() {
        assert!(FractionPerStep::new(0.).is_err());
        assert!(FractionPerStep::new(1.5).is_err());
        assert!(ConstantLossLength::new(-1.).is_err());
        let mut module =
            ContinuousEnergyLoss::new(Arc::new(ConstantLossLength::new(1.).unwrap()));
        assert!(module.set_max_fraction(1.).is_err());
    }
}
