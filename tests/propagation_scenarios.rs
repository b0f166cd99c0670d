//! End-to-end propagation scenarios, run through the public API

use cosmic_transport::{
    field::UniformMagneticField,
    linalg::Vector3,
    modules::{
        EmissionTable, FractionPerStep, PropagationCK, SimplePropagation, SphericalBoundary,
        StochasticInteraction, WeightPolicy,
    },
    numeric::Float,
    output::ParticleCollector,
    particle::ParticleId,
    source::{self, PointSource},
    units::{EEV, KPC, MPC, NANO_GAUSS},
    Candidate, CandidateId, InactiveReason, Module, ModuleChain, ParticleState, RunSummary,
    Simulation, StopHandle,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

fn proton(energy: Float) -> Candidate {
    Candidate::new(ParticleState::new(
        ParticleId::PROTON,
        energy,
        Vector3::zeros(),
        Vector3::new(1., 0., 0.),
    ))
}

fn run(
    chain: ModuleChain,
    max_passes: usize,
    primaries: Vec<Candidate>,
) -> (RunSummary, Vec<Candidate>) {
    let collector = Arc::new(ParticleCollector::new());
    let mut simulation = Simulation::new(chain, max_passes, 1234).unwrap();
    simulation.add_sink(collector.clone());
    let summary = simulation.run(primaries).unwrap();
    let mut candidates = collector.candidates();
    candidates.sort_by_key(|c| c.id());
    (summary, candidates)
}

/// Spawns one photon from every primary in its first pass
struct SpawnOnce;
//
impl Module for SpawnOnce {
    fn process(&self, candidate: &mut Candidate) {
        if candidate.parent().is_none() && candidate.num_passes() == 1 {
            let position = *candidate.current.position();
            let direction = *candidate.current.direction();
            candidate.add_secondary(ParticleId::PHOTON, 1., position, direction);
        }
    }

    fn description(&self) -> String {
        "SpawnOnce".into()
    }
}

/// Requests the run to stop while processing a given pass
struct StopDuringPass {
    pass: usize,
    handle: Mutex<Option<StopHandle>>,
}
//
impl Module for StopDuringPass {
    fn process(&self, candidate: &mut Candidate) {
        if candidate.pass() == self.pass {
            if let Some(handle) = &*self.handle.lock().unwrap() {
                handle.stop();
            }
        }
    }

    fn description(&self) -> String {
        format!("StopDuringPass {}", self.pass)
    }
}

/// Checks that no candidate is processed twice in the same pass
#[derive(Default)]
struct PassRecorder(Mutex<HashSet<(CandidateId, usize)>>);
//
impl Module for PassRecorder {
    fn process(&self, candidate: &mut Candidate) {
        let first_visit = self
            .0
            .lock()
            .unwrap()
            .insert((candidate.id(), candidate.pass()));
        assert!(first_visit, "{} processed twice in one pass", candidate.id());
    }

    fn description(&self) -> String {
        "PassRecorder".into()
    }
}

#[test]
fn fixed_steps_with_halving_losses() {
    let mut chain = ModuleChain::new();
    chain
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(FractionPerStep::halving())
        .add(SphericalBoundary::new(Vector3::zeros(), 3.5).unwrap());
    let (summary, candidates) = run(chain, 100, vec![proton(16.)]);

    // The boundary is crossed on the 4th unit step
    assert_eq!(summary.passes, 4);
    assert_eq!(summary.normal, 1);
    assert_eq!(summary.forced, 0);
    let c = &candidates[0];
    assert_eq!(c.current.energy(), 1.);
    assert_eq!(c.num_passes(), 4);
    assert_eq!(c.trajectory_length(), 4.);
    assert_eq!(
        c.inactive_reason(),
        Some(&InactiveReason::Rejected("SphericalBoundary".into()))
    );
}

#[test]
fn pass_ceiling_force_terminates() {
    let mut chain = ModuleChain::new();
    chain
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(SphericalBoundary::new(Vector3::zeros(), Float::INFINITY).unwrap());
    let (summary, candidates) = run(chain, 7, vec![proton(1.)]);
    assert_eq!(summary.passes, 7);
    assert_eq!(summary.forced, 1);
    assert_eq!(summary.normal, 0);
    assert!(!summary.stopped);
    let c = &candidates[0];
    assert_eq!(c.num_passes(), 7);
    assert_eq!(c.inactive_reason(), Some(&InactiveReason::PassCeiling));
}

#[test]
fn secondaries_join_at_the_next_pass() {
    let recorder = Arc::new(PassRecorder::default());
    let mut chain = ModuleChain::new();
    chain
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(SpawnOnce)
        .add_shared(recorder.clone())
        .add(SphericalBoundary::new(Vector3::zeros(), 3.5).unwrap());
    let (summary, candidates) = run(chain, 100, vec![proton(5.), proton(6.)]);

    assert_eq!(summary.passes, 4);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.secondaries, 2);
    assert_eq!(candidates.len(), 4);

    // Primaries get the first identifiers, secondaries are numbered in the
    // order of their parents
    let secondaries = &candidates[2..];
    for (parent, secondary) in candidates[..2].iter().zip(secondaries) {
        assert_eq!(parent.parent(), None);
        assert_eq!(secondary.parent(), Some(parent.id()));
        assert_eq!(secondary.spawned_in_pass(), Some(0));
        assert_eq!(secondary.entered_pass(), 1);
        assert_eq!(secondary.num_passes(), 3);
        assert_eq!(secondary.created().energy(), parent.source().energy());
        assert_eq!(*secondary.created().position(), Vector3::new(1., 0., 0.));
    }

    // Primaries were seen in passes 0 to 3, secondaries in passes 1 to 3
    assert_eq!(recorder.0.lock().unwrap().len(), 2 * 4 + 2 * 3);

    // The lineage of the run outlives the population
    assert_eq!(summary.lineage.len(), 4);
    for secondary in secondaries {
        let lineage = summary.lineage.get(secondary.id()).unwrap();
        assert_eq!(lineage.parent, secondary.parent());
        assert_eq!(lineage.entered_pass, 1);
        assert_eq!(
            summary.lineage.ancestors(secondary.id()),
            vec![secondary.parent().unwrap()]
        );
    }
}

#[test]
fn stop_requested_mid_pass_lets_the_pass_finish() {
    let stopper = Arc::new(StopDuringPass {
        pass: 3,
        handle: Mutex::new(None),
    });
    let mut chain = ModuleChain::new();
    chain
        .add_shared(stopper.clone())
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(SphericalBoundary::new(Vector3::zeros(), Float::INFINITY).unwrap());
    let collector = Arc::new(ParticleCollector::new());
    let mut simulation = Simulation::new(chain, 100, 1234).unwrap();
    simulation.add_sink(collector.clone());
    *stopper.handle.lock().unwrap() = Some(simulation.stop_handle());

    let summary = simulation.run(vec![proton(1.), proton(2.)]).unwrap();
    assert!(summary.stopped);
    assert_eq!(summary.passes, 4);
    assert_eq!(summary.forced, 2);
    assert_eq!(summary.remaining, 2);

    // Both candidates went through the whole chain of the last pass
    let candidates = collector.candidates();
    assert_eq!(candidates.len(), 2);
    for c in &candidates {
        assert_eq!(c.num_passes(), 4);
        assert_eq!(c.trajectory_length(), 4.);
        assert_eq!(c.inactive_reason(), Some(&InactiveReason::Stopped));
    }
}

#[test]
fn interactions_only_happen_above_threshold() {
    let threshold = 100.;
    let table = EmissionTable::new(0.5, ParticleId::PHOTON, 0.5, 0.)
        .unwrap()
        .charged_only();
    let mut interaction = StochasticInteraction::new("Emission", Arc::new(table));
    interaction.set_threshold(threshold).unwrap();

    let mut chain = ModuleChain::new();
    chain
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(interaction)
        .add(SphericalBoundary::new(Vector3::zeros(), 20.).unwrap());
    let (summary, candidates) = run(chain, 100, vec![proton(1000.)]);

    let primary = &candidates[0];
    assert!(primary.current.energy() < threshold);
    assert!(primary.current.energy() >= threshold / 2.);

    // Every product was emitted by a parent above the threshold
    let secondaries = &candidates[1..];
    assert!(!secondaries.is_empty());
    assert_eq!(summary.secondaries, secondaries.len());
    let first_spawn = secondaries
        .iter()
        .filter_map(|c| c.spawned_in_pass())
        .min()
        .unwrap();
    assert!(first_spawn < primary.num_passes());
    for secondary in secondaries {
        assert_eq!(secondary.current.id(), ParticleId::PHOTON);
        assert!(secondary.created().energy() >= threshold);
        assert!(secondary.has_property("CreatedBy"));
    }

    // No energy was lost along the way
    let total = candidates.iter().map(|c| c.current.energy()).sum::<Float>();
    assert!((total - 1000.).abs() < 1e-9 * 1000.);
}

#[test]
fn absorbed_branches_keep_their_weight() {
    let table = EmissionTable::new(0.5, ParticleId::PHOTON, 1., 0.)
        .unwrap()
        .charged_only();
    let mut interaction = StochasticInteraction::new("Conversion", Arc::new(table));
    interaction.set_weight_policy(WeightPolicy::Conserve);

    let mut chain = ModuleChain::new();
    chain
        .add(SimplePropagation::fixed(1.).unwrap())
        .add(interaction)
        .add(SphericalBoundary::new(Vector3::zeros(), 20.).unwrap());
    let (_, candidates) = run(chain, 100, vec![proton(10.)]);

    assert_eq!(candidates.len(), 2);
    assert_eq!(
        candidates[0].inactive_reason(),
        Some(&InactiveReason::Absorbed)
    );
    let total_weight = candidates.iter().map(|c| c.weight()).sum::<Float>();
    let total_energy = candidates.iter().map(|c| c.current.energy()).sum::<Float>();
    assert_eq!(total_weight, 1.);
    assert_eq!(total_energy, 10.);
}

/// Charged particles in a field, radiating photons
fn deflected_chain(policy: WeightPolicy) -> ModuleChain {
    let field = UniformMagneticField(Vector3::new(0., 0., NANO_GAUSS));
    let table = EmissionTable::new(5. * MPC, ParticleId::PHOTON, 0.2, 0.)
        .unwrap()
        .charged_only();
    let mut interaction = StochasticInteraction::new("Emission", Arc::new(table));
    interaction.set_weight_policy(policy);

    let mut chain = ModuleChain::new();
    chain
        .add(PropagationCK::new(Arc::new(field), 1e-4, 1. * KPC, 1. * MPC).unwrap())
        .add(interaction)
        .add(SphericalBoundary::new(Vector3::zeros(), 10. * MPC).unwrap());
    chain
}

fn isotropic_primaries(count: usize) -> Vec<Candidate> {
    let source = PointSource::new(ParticleId::PROTON, 100. * EEV, Vector3::zeros(), None).unwrap();
    source::primaries(&source, count, 99)
}

#[test]
fn runs_are_reproducible() {
    let fingerprint = |candidates: &[Candidate]| {
        candidates
            .iter()
            .map(|c| {
                (
                    c.id(),
                    c.parent(),
                    c.current.id(),
                    c.current.energy(),
                    *c.current.position(),
                    c.num_passes(),
                )
            })
            .collect::<Vec<_>>()
    };
    let run_once = || {
        run(
            deflected_chain(WeightPolicy::Inherit),
            10_000,
            isotropic_primaries(150),
        )
    };
    let (summary1, out1) = run_once();
    let (summary2, out2) = run_once();
    assert_eq!(summary1, summary2);
    assert_eq!(summary1.forced, 0);
    assert_eq!(fingerprint(&out1), fingerprint(&out2));
}

#[test]
fn conserved_weights_add_up() {
    let num_primaries = 80;
    let (summary, candidates) = run(
        deflected_chain(WeightPolicy::Conserve),
        10_000,
        isotropic_primaries(num_primaries),
    );
    assert!(summary.secondaries > 0);
    let total_weight = candidates.iter().map(|c| c.weight()).sum::<Float>();
    assert!((total_weight - num_primaries as Float).abs() < 1e-6);
    for c in &candidates {
        assert!(c.weight() > 0. && c.weight() <= 1.);
    }
}
