//! Propagate a population of cosmic rays from a point source
//!
//! The run parameters are read from `propagation.cfg`. Terminated candidates
//! are written to `events.tsv`, and a summary of the run to `run.summary`.

use cosmic_transport::{
    config::Configuration,
    field::UniformMagneticField,
    linalg::Vector3,
    modules::{
        ConstantLossLength, ContinuousEnergyLoss, EmissionTable, LargeSphere, MinimumEnergy,
        Observer, PropagationCK, SphericalBoundary, StochasticInteraction,
    },
    output::{self, Column, TextOutput},
    particle::ParticleId,
    source::{self, PointSource},
    units::{EEV, KPC, MPC, NANO_GAUSS},
    ModuleChain, Result, Simulation,
};

use eyre::WrapErr;

use std::{sync::Arc, time::Instant};

use tracing::{info, level_filters::LevelFilter};

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    // ### LOGGING SETUP ###

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .with_target(false)
        .init();

    // ### CONFIGURATION READOUT ###

    let cfg = Configuration::load("propagation.cfg").wrap_err("Failed to load the configuration")?;

    // ### SIMULATION INITIALIZATION ###

    // Start the clock after configuration I/O, to avoid IO-induced timing
    // fluctuations
    let saved_time = Instant::now();

    // Build the module chain
    let chain = build_chain(&cfg).wrap_err("Failed to set up the module chain")?;
    info!("{}", chain.description());

    // Set up the run and its output
    let mut simulation = Simulation::new(chain, cfg.max_passes, cfg.seed)?;
    let events = TextOutput::create("events.tsv", Column::EVENTS_3D)
        .wrap_err("Failed to create the event output")?;
    simulation.add_sink(Arc::new(events));

    // Draw the primaries from an isotropic source at the origin
    let source = PointSource::new(cfg.particle, cfg.energy * EEV, Vector3::zeros(), None)?;
    let primaries = source::primaries(&source, cfg.num_primaries, cfg.seed);

    // ### SIMULATION EXECUTION ###

    let summary = simulation.run(primaries).wrap_err("Simulation failed")?;

    // ### RESULTS DISPLAY AND STORAGE ###

    let elapsed_time = saved_time.elapsed();
    output::dump_summary("run.summary", &summary, elapsed_time)
        .wrap_err("Failed to output the run summary")?;
    info!(
        passes = summary.passes,
        processed = summary.processed,
        elapsed_secs = elapsed_time.as_secs_f64(),
        "All done"
    );
    Ok(())
}

/// Set up the module chain described by the configuration
fn build_chain(cfg: &Configuration) -> Result<ModuleChain> {
    let field = UniformMagneticField(Vector3::new(0., 0., cfg.field * NANO_GAUSS));
    let propagation = PropagationCK::new(
        Arc::new(field),
        cfg.tolerance,
        cfg.min_step * KPC,
        cfg.max_step * MPC,
    )?;

    // Primaries radiate a fraction of their energy as photons
    let table = EmissionTable::new(
        cfg.interaction_length * MPC,
        ParticleId::PHOTON,
        cfg.emission_fraction,
        0.,
    )?
    .charged_only();
    let mut interaction = StochasticInteraction::new("PhotonEmission", Arc::new(table));
    interaction.set_threshold(cfg.min_energy * EEV)?;
    interaction.set_have_secondaries(true);
    interaction.set_weight_policy(cfg.weight_policy);

    let energy_loss =
        ContinuousEnergyLoss::new(Arc::new(ConstantLossLength::new(cfg.loss_length * MPC)?));

    let mut observer = Observer::new();
    observer
        .add(LargeSphere::new(Vector3::zeros(), cfg.observer_radius * MPC))
        .set_make_inactive(cfg.observer_inactive);

    let mut chain = ModuleChain::new();
    chain
        .add(propagation)
        .add(interaction)
        .add(energy_loss)
        .add(MinimumEnergy::new(cfg.min_energy * EEV))
        .add(observer)
        .add(SphericalBoundary::new(Vector3::zeros(), cfg.boundary_radius * MPC)?);
    Ok(chain)
}
