//! Concrete module variants

pub mod boundary;
pub mod conditions;
pub mod energy_loss;
pub mod interaction;
pub mod observer;
pub mod propagation;
pub mod splitting;

pub use boundary::{CubicBoundary, PeriodicBox, ReflectiveBox, SphericalBoundary};
pub use conditions::{MaximumSteps, MaximumTrajectoryLength, MinimumEnergy, MinimumRigidity};
pub use energy_loss::{ConstantLossLength, ContinuousEnergyLoss, EnergyLossRate, FractionPerStep};
pub use interaction::{
    EmissionTable, InteractionOutcome, InteractionTable, Product, StochasticInteraction,
    WeightPolicy,
};
pub use observer::{LargeSphere, Observer, ObserverFeature, Point, SmallSphere};
pub use propagation::{PropagationCK, SimplePropagation};
pub use splitting::CandidateSplitting;
