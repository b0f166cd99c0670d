//! Stochastic interactions with backgrounds, and the secondaries they produce

use crate::{
    candidate::{Candidate, InactiveReason},
    error::{ensure_positive, ConfigError},
    linalg::Vector3,
    module::Module,
    numeric::{relative_eq, Float},
    particle::ParticleId,
    random::RandomGenerator,
    units::EEV,
};
use std::{str::FromStr, sync::Arc};
use tracing::warn;

/// Relative tolerance of the energy bookkeeping of an interaction
const ENERGY_CONSERVATION_TOLERANCE: Float = 1e-6;

/// A particle produced by an interaction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Product {
    /// Particle type
    pub id: ParticleId,
    /// Energy (J)
    pub energy: Float,
}

/// Outcome of one interaction, as sampled by an interaction table
///
/// The remnant of the primary gets whatever energy is left once the products
/// and the invisible loss are accounted for, which makes the energy balance
/// hold by construction.
///
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionOutcome {
    /// Particle type of the primary after the interaction, `None` if destroyed
    pub remnant: Option<ParticleId>,

    /// Secondaries produced by the interaction
    pub products: Vec<Product>,

    /// Energy carried away by products which are not followed
    pub invisible_loss: Float,
}
//
impl InteractionOutcome {
    /// Energy left to the primary remnant, given the incoming energy
    pub fn remnant_energy(&self, energy: Float) -> Float {
        energy - self.products.iter().map(|p| p.energy).sum::<Float>() - self.invisible_loss
    }
}

/// Cross-section / interaction table collaborator
///
/// Outcome sampling draws from the random stream it is given, so that runs
/// are reproducible for a given seed.
///
pub trait InteractionTable: Send + Sync {
    /// Mean free path (m) of a particle, infinite if it does not interact
    fn mean_free_path(&self, id: ParticleId, energy: Float, position: &Vector3) -> Float;

    /// Sample the outcome of an interaction
    fn sample_interaction(
        &self,
        id: ParticleId,
        energy: Float,
        rng: &mut RandomGenerator,
    ) -> InteractionOutcome;
}

/// Interaction table with a constant mean free path, where the primary emits
/// one secondary carrying a fixed fraction of its energy
///
/// Another fraction may be lost to untracked products. The primary survives
/// unless the two fractions add up to one.
///
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionTable {
    mean_free_path: Float,
    secondary: ParticleId,
    fraction: Float,
    invisible_fraction: Float,
    charged_only: bool,
}
//
impl EmissionTable {
    /// Emission with given mean free path (m), product type and energy fractions
    pub fn new(
        mean_free_path: Float,
        secondary: ParticleId,
        fraction: Float,
        invisible_fraction: Float,
    ) -> Result<Self, ConfigError> {
        ensure_positive("EmissionTable", "mean_free_path", mean_free_path)?;
        if !(fraction >= 0. && invisible_fraction >= 0. && fraction + invisible_fraction <= 1.) {
            return Err(ConfigError::OutOfRange {
                module: "EmissionTable",
                parameter: "fraction",
                value: fraction + invisible_fraction,
                expected: "fractions must be non-negative and add up to at most 1",
            });
        }
        Ok(Self {
            mean_free_path,
            secondary,
            fraction,
            invisible_fraction,
            charged_only: false,
        })
    }

    /// Only let charged particles interact
    pub fn charged_only(mut self) -> Self {
        self.charged_only = true;
        self
    }
}

impl InteractionTable for EmissionTable {
    fn mean_free_path(&self, id: ParticleId, _energy: Float, _position: &Vector3) -> Float {
        if self.charged_only && id.charge_number() == 0 {
            Float::INFINITY
        } else {
            self.mean_free_path
        }
    }

    fn sample_interaction(
        &self,
        id: ParticleId,
        energy: Float,
        _rng: &mut RandomGenerator,
    ) -> InteractionOutcome {
        let destroyed = self.fraction + self.invisible_fraction >= 1.;
        InteractionOutcome {
            remnant: (!destroyed).then_some(id),
            products: vec![Product {
                id: self.secondary,
                energy: energy * self.fraction,
            }],
            invisible_loss: energy * self.invisible_fraction,
        }
    }
}

/// How statistical weights are distributed when secondaries are spawned
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WeightPolicy {
    /// Secondaries carry the weight of the primary, which keeps its own
    #[default]
    Inherit,

    /// The weight of the primary is shared between the primary remnant and
    /// the secondaries, so that the total weight of the branch is constant.
    /// An absorbed primary hands all of its weight over to the products.
    Conserve,
}

impl FromStr for WeightPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inherit" => Ok(Self::Inherit),
            "conserve" => Ok(Self::Conserve),
            _ => Err(ConfigError::UnknownValue {
                parameter: "weight_policy",
                value: s.to_owned(),
                expected: "inherit or conserve",
            }),
        }
    }
}

/// Stochastic interaction driven by an interaction table
///
/// For each step, interaction distances are drawn from an exponential
/// distribution of mean the mean free path. As long as they fit into the
/// step that was just performed, interactions happen at the corresponding
/// point of the step, and the remaining distance is sampled again. Once no
/// more interaction fits, the next step is limited to a fraction of the mean
/// free path.
///
pub struct StochasticInteraction {
    name: String,
    table: Arc<dyn InteractionTable>,
    threshold: Float,
    limit: Float,
    have_secondaries: bool,
    weight_policy: WeightPolicy,
}
//
impl StochasticInteraction {
    /// Interaction with given name, drawn from `table`
    pub fn new(name: impl Into<String>, table: Arc<dyn InteractionTable>) -> Self {
        Self {
            name: name.into(),
            table,
            threshold: 0.,
            limit: 0.1,
            have_secondaries: true,
            weight_policy: WeightPolicy::default(),
        }
    }

    /// Energy below which the interaction is not considered
    pub fn set_threshold(&mut self, threshold: Float) -> Result<(), ConfigError> {
        if !(threshold >= 0.) {
            return Err(ConfigError::OutOfRange {
                module: "StochasticInteraction",
                parameter: "threshold",
                value: threshold,
                expected: "threshold >= 0",
            });
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Largest step, as a fraction of the mean free path
    pub fn set_limit(&mut self, limit: Float) -> Result<(), ConfigError> {
        self.limit = ensure_positive("StochasticInteraction", "limit", limit)?;
        Ok(())
    }

    /// Whether products are followed (otherwise they count as invisible loss)
    pub fn set_have_secondaries(&mut self, have_secondaries: bool) {
        self.have_secondaries = have_secondaries;
    }

    /// How the weight of the parent is passed on to products
    pub fn set_weight_policy(&mut self, policy: WeightPolicy) {
        self.weight_policy = policy;
    }

    /// Energy below which the interaction is disabled (J)
    pub fn threshold(&self) -> Float {
        self.threshold
    }

    /// Apply one sampled interaction at a point of the current step
    fn perform_interaction(&self, candidate: &mut Candidate, position: Vector3) {
        let id = candidate.current.id();
        let energy = candidate.current.energy();
        let mut outcome = self
            .table
            .sample_interaction(id, energy, candidate.rng());

        // Untracked products count as invisible loss
        if !self.have_secondaries {
            let discarded: Float = outcome.products.drain(..).map(|p| p.energy).sum();
            outcome.invisible_loss += discarded;
        }

        // The products must not take more energy than what came in
        let remnant_energy = outcome.remnant_energy(energy);
        let invalid_product = outcome
            .products
            .iter()
            .any(|p| !(p.energy >= 0.) || !p.energy.is_finite());
        if !(remnant_energy >= -ENERGY_CONSERVATION_TOLERANCE * energy) || invalid_product {
            warn!(
                id = %candidate.id(),
                interaction = %self.name,
                energy,
                remnant_energy,
                "Interaction violates energy conservation"
            );
            candidate.set_inactive(InactiveReason::PhysicalInconsistency);
            return;
        }
        let remnant_energy = remnant_energy.max(0.);
        debug_assert!(relative_eq(
            remnant_energy
                + outcome.products.iter().map(|p| p.energy).sum::<Float>()
                + outcome.invisible_loss,
            energy,
            ENERGY_CONSERVATION_TOLERANCE,
        ));

        // Share out statistical weights
        let weight = candidate.weight();
        let survives = outcome.remnant.is_some();
        let num_products = outcome.products.len();
        let share = match self.weight_policy {
            WeightPolicy::Inherit => weight,
            WeightPolicy::Conserve => {
                let num_branches = num_products + usize::from(survives);
                weight / (num_branches.max(1) as Float)
            }
        };

        // Spawn the products along the current heading
        let direction = *candidate.current.direction();
        for product in outcome.products {
            let secondary = candidate.add_weighted_secondary(
                product.id,
                product.energy,
                position,
                direction,
                share,
            );
            secondary.set_property("CreatedBy", self.name.as_str());
        }

        // Update or destroy the primary
        match outcome.remnant {
            Some(remnant) => {
                candidate.current.set_id(remnant);
                candidate.current.set_energy(remnant_energy);
                if self.weight_policy == WeightPolicy::Conserve {
                    candidate.set_weight(share);
                }
            }
            None => {
                candidate.current.set_energy(0.);
                candidate.set_inactive(InactiveReason::Absorbed);
                // The products carry the whole weight of the branch
                if self.weight_policy == WeightPolicy::Conserve && num_products > 0 {
                    candidate.set_weight(0.);
                }
            }
        }
    }
}

impl Module for StochasticInteraction {
    fn process(&self, candidate: &mut Candidate) {
        // The loop runs at least once, to limit the next step
        let mut step = candidate.current_step();
        loop {
            if !candidate.is_active() {
                return;
            }
            let energy = candidate.current.energy();
            if energy < self.threshold {
                return;
            }
            let mean_free_path = self.table.mean_free_path(
                candidate.current.id(),
                energy,
                candidate.current.position(),
            );
            if !(mean_free_path > 0.) || !mean_free_path.is_finite() {
                return;
            }

            // Check if an interaction happens within the remaining step
            let distance = candidate.rng().exponential(mean_free_path);
            if step < distance {
                candidate.limit_next_step(self.limit * mean_free_path);
                return;
            }

            // Interact at the sampled point, then repeat with the rest
            step -= distance;
            let position =
                candidate.current.position() - candidate.current.direction() * step;
            self.perform_interaction(candidate, position);
        }
    }

    fn description(&self) -> String {
        format!(
            "StochasticInteraction '{}': threshold {} EeV, step limit {} mean free paths, \
             weight policy {:?}, secondaries {}",
            self.name,
            self.threshold / EEV,
            self.limit,
            self.weight_policy,
            if self.have_secondaries { "on" } else { "off" }
        )
    }
}
