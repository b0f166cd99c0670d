//! Propagation modules: move candidates by one step
//!
//! Propagators advance position and heading and record the step on the
//! candidate. They never change the particle type and never terminate a
//! candidate for physical reasons, that is the job of conditions.

use crate::{
    candidate::{Candidate, InactiveReason},
    error::{ensure_positive, ConfigError},
    field::MagneticField,
    integrator::{Integrator, PhasePoint, StepControl, StepMode},
    module::Module,
    numeric::{clip, Float},
    units::{C_LIGHT, KPC},
};
use std::sync::Arc;
use tracing::warn;

/// Straight-line propagation with step sizes in `[min_step, max_step]`
///
/// The proposed next step of the candidate (possibly limited by other
/// modules) is honored within these bounds, and reset to the maximum step.
///
#[derive(Clone, Debug, PartialEq)]
pub struct SimplePropagation {
    min_step: Float,
    max_step: Float,
}
//
impl SimplePropagation {
    /// Straight-line steps bounded to [`min_step`, `max_step`] (m)
    pub fn new(min_step: Float, max_step: Float) -> Result<Self, ConfigError> {
        ensure_positive("SimplePropagation", "min_step", min_step)?;
        if min_step > max_step {
            return Err(ConfigError::InvertedStepBounds {
                module: "SimplePropagation",
                min: min_step,
                max: max_step,
            });
        }
        Ok(Self { min_step, max_step })
    }

    /// Propagation with a constant step size
    pub fn fixed(step: Float) -> Result<Self, ConfigError> {
        Self::new(step, step)
    }
}

impl Module for SimplePropagation {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        candidate.previous = candidate.current.clone();

        let step = clip(candidate.next_step(), self.min_step, self.max_step);
        let position = candidate.current.position() + candidate.current.direction() * step;
        candidate.current.set_position(position);
        candidate.set_current_step(step);
        candidate.set_next_step(self.max_step);
    }

    fn description(&self) -> String {
        format!(
            "SimplePropagation: Step size = {} - {} kpc",
            self.min_step / KPC,
            self.max_step / KPC
        )
    }
}

/// Propagation in magnetic fields with the Cash-Karp method
///
/// Charged particles are deflected by the Lorentz force, with adaptive or
/// fixed step sizes depending on the integrator configuration. Neutral
/// particles and field-free regions get exact straight-line motion.
///
pub struct PropagationCK {
    field: Arc<dyn MagneticField>,
    integrator: Integrator,
    deactivate_on_degraded: bool,
}
//
impl PropagationCK {
    /// Adaptive propagation, with target relative error `tolerance`
    pub fn new(
        field: Arc<dyn MagneticField>,
        tolerance: Float,
        min_step: Float,
        max_step: Float,
    ) -> Result<Self, ConfigError> {
        let control = StepControl::new(tolerance, min_step, max_step)?;
        Self::with_mode(field, StepMode::Adaptive(control))
    }

    /// Propagation with a constant step size and no error estimation
    pub fn fixed(field: Arc<dyn MagneticField>, step: Float) -> Result<Self, ConfigError> {
        Self::with_mode(field, StepMode::fixed(step)?)
    }

    /// Propagation with an arbitrary step mode
    pub fn with_mode(field: Arc<dyn MagneticField>, mode: StepMode) -> Result<Self, ConfigError> {
        field.check()?;
        Ok(Self {
            field,
            integrator: Integrator::new(mode),
            deactivate_on_degraded: false,
        })
    }

    /// Deactivate candidates as soon as one step misses the tolerance
    ///
    /// By default such steps are accepted at the minimum step size and only
    /// counted on the candidate.
    ///
    pub fn set_deactivate_on_degraded(&mut self, deactivate: bool) {
        self.deactivate_on_degraded = deactivate;
    }

    /// Underlying integrator
    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }
}

impl Module for PropagationCK {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        candidate.previous = candidate.current.clone();

        // A particle without energy has no defined trajectory
        let energy = candidate.current.energy();
        if !(energy > 0.) {
            warn!(id = %candidate.id(), energy, "Cannot propagate a particle without energy");
            candidate.set_inactive(InactiveReason::PhysicalInconsistency);
            return;
        }
        let curvature = candidate.current.charge() * C_LIGHT / energy;

        let y = PhasePoint::new(
            *candidate.current.position(),
            *candidate.current.direction(),
        );
        let field = &self.field;
        let record = self.integrator.advance(&y, candidate.next_step(), curvature, |x| {
            field.field_at(x)
        });

        if !record.state.is_finite() || !record.accepted_step.is_finite() {
            warn!(id = %candidate.id(), "Integration produced a non-finite state");
            candidate.set_inactive(InactiveReason::NumericalFailure);
            return;
        }

        candidate.current.set_position(record.state.position);
        candidate.current.set_direction(record.state.direction);
        candidate.set_current_step(record.accepted_step);
        candidate.set_next_step(record.next_step);

        if record.degraded {
            warn!(
                id = %candidate.id(),
                step = record.accepted_step,
                error = record.error,
                "Step accepted at minimum size without meeting the tolerance"
            );
            candidate.record_degraded_step();
            if self.deactivate_on_degraded {
                candidate.set_inactive(InactiveReason::NumericalFailure);
            }
        }
    }

    fn description(&self) -> String {
        match self.integrator.mode() {
            StepMode::Adaptive(control) => format!(
                "Propagation in magnetic fields using the Cash-Karp method. Target error: {}, \
                 Minimum Step: {} kpc, Maximum Step: {} kpc",
                control.tolerance(),
                control.min_step() / KPC,
                control.max_step() / KPC
            ),
            StepMode::Fixed(step) => format!(
                "Propagation in magnetic fields using the Cash-Karp method. Fixed Step: {} kpc",
                step / KPC
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::UniformMagneticField,
        linalg::Vector3,
        particle::{ParticleId, ParticleState},
        units::{EEV, MPC, NANO_GAUSS},
    };

    fn candidate(id: ParticleId, energy: Float) -> Candidate {
        Candidate::new(ParticleState::new(
            id,
            energy,
            Vector3::zeros(),
            Vector3::new(1., 0., 0.),
        ))
    }

    #[test]
    fn simple_propagation_clips_proposed_step() {
        let prop = SimplePropagation::new(1., 10.).unwrap();
        let mut c = candidate(ParticleId::PROTON, EEV);
        prop.process(&mut c);
        assert_eq!(c.current_step(), 1.);
        assert_eq!(c.current.position().x, 1.);
        assert_eq!(c.next_step(), 10.);
        c.limit_next_step(5.);
        prop.process(&mut c);
        assert_eq!(c.current.position().x, 6.);
        assert_eq!(c.trajectory_length(), 6.);
        assert_eq!(c.previous.position().x, 1.);
        assert!(SimplePropagation::new(2., 1.).is_err());
    }

    #[test]
    fn inactive_candidates_are_left_alone() {
        let prop = SimplePropagation::fixed(1.).unwrap();
        let mut c = candidate(ParticleId::PROTON, EEV);
        c.set_inactive(InactiveReason::BelowEnergy);
        prop.process(&mut c);
        assert_eq!(c.trajectory_length(), 0.);
    }

    #[test]
    fn neutral_particles_go_straight() {
        let field = Arc::new(UniformMagneticField(Vector3::new(0., 0., NANO_GAUSS)));
        let prop = PropagationCK::fixed(field, MPC).unwrap();
        let mut c = candidate(ParticleId::NEUTRON, EEV);
        for _ in 0..4 {
            prop.process(&mut c);
        }
        assert_eq!(*c.current.position(), Vector3::new(4. * MPC, 0., 0.));
    }

    #[test]
    fn protons_are_deflected_and_keep_unit_heading() {
        let field = Arc::new(UniformMagneticField(Vector3::new(0., 0., NANO_GAUSS)));
        let prop = PropagationCK::new(field, 1e-4, 0.1 * KPC, 10. * MPC).unwrap();
        let mut c = candidate(ParticleId::PROTON, EEV);
        for _ in 0..20 {
            prop.process(&mut c);
        }
        let heading = c.current.direction();
        assert!((heading.norm() - 1.).abs() < 1e-9);
        assert!(heading.y.abs() > 0.);
        assert_eq!(heading.z, 0.);
        assert!(c.trajectory_length() > 0.);
    }

    #[test]
    fn zero_energy_is_inconsistent() {
        let field = Arc::new(UniformMagneticField(Vector3::new(0., 0., NANO_GAUSS)));
        let prop = PropagationCK::fixed(field, MPC).unwrap();
        let mut c = candidate(ParticleId::PROTON, 0.);
        prop.process(&mut c);
        assert_eq!(
            c.inactive_reason(),
            Some(&InactiveReason::PhysicalInconsistency)
        );
    }

    #[test]
    fn degraded_steps_are_counted_or_fatal() {
        let field = Arc::new(UniformMagneticField(Vector3::new(0., 0., 1.)));
        let mut prop = PropagationCK::new(field, 1e-12, 1., 10.).unwrap();
        let mut c = candidate(ParticleId::PROTON, 1e-10);
        prop.process(&mut c);
        assert!(c.is_degraded());
        assert!(c.is_active());

        prop.set_deactivate_on_degraded(true);
        prop.process(&mut c);
        assert_eq!(c.inactive_reason(), Some(&InactiveReason::NumericalFailure));
    }

    #[test]
    fn malformed_field_is_a_construction_error() {
        let field = Arc::new(UniformMagneticField(Vector3::new(Float::NAN, 0., 0.)));
        assert!(PropagationCK::fixed(field, 1.).is_err());
    }
}
