//! Cosmic transport: a modular Monte Carlo propagation engine for cosmic rays
//!
//!
//! # Introduction (for the physicist)
//!
//! This library follows ultra-high-energy cosmic rays and their secondaries
//! from their sources, through magnetic fields and interactions with the
//! ambient photon backgrounds, until they reach an observer, leave the
//! simulation volume, or fall below the energy range of interest.
//!
//!
//! # Introduction (for the numerical guy)
//!
//! Charged particles are moved along their helical trajectories by an
//! adaptive Cash-Karp Runge-Kutta integrator, with step size control driven
//! by a target relative error. Interactions are drawn stochastically from
//! their mean free paths, and the next step is shortened so that rare
//! processes are sampled accurately.
//!
//!
//! # Introduction (for the computer guy)
//!
//! A simulation is a chain of modules which is applied, in order, to every
//! active candidate once per pass:
//!
//! * propagators move the candidate by one step,
//! * interactions change its energy or type and may spawn secondaries,
//! * conditions, boundaries and observers decide whether it stays active.
//!
//! Candidates of a pass are processed in parallel batches. Secondaries join
//! the population at the next pass, and candidates which become inactive are
//! delivered exactly once to the output sinks.

#![warn(missing_docs)]

pub mod candidate;
pub mod chain;
pub mod config;
pub mod error;
pub mod field;
pub mod integrator;
pub mod linalg;
pub mod module;
pub mod modules;
pub mod numeric;
pub mod output;
pub mod particle;
pub mod population;
pub mod random;
pub mod scheduling;
pub mod simulation;
pub mod source;
pub mod units;

pub use crate::{
    candidate::{Candidate, CandidateId, InactiveReason, Property, Status},
    chain::ModuleChain,
    error::ConfigError,
    module::{Condition, Flag, Module, ModuleRef},
    particle::{ParticleId, ParticleState},
    simulation::{RunSummary, Simulation, StopHandle},
};

/// We'll use eyre's type-erased result type throughout the crate
pub type Result<T> = eyre::Result<T>;
