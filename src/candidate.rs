//! This module defines the candidate, i.e. the full simulation state of one
//! propagated particle

use crate::{
    linalg::Vector3,
    numeric::Float,
    particle::{ParticleId, ParticleState},
    random::RandomGenerator,
    units::C_LIGHT,
};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

/// Run-wide unique candidate identifier
///
/// Identifiers are handed out by the population when a candidate is admitted
/// into the run, in admission order. Secondaries which have not been promoted
/// yet carry the `UNASSIGNED` placeholder.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub u64);
//
impl CandidateId {
    /// Placeholder identifier of candidates which were not admitted yet
    pub const UNASSIGNED: Self = Self(u64::MAX);

    /// Truth that this identifier was handed out by a population
    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            write!(f, "#{}", self.0)
        } else {
            write!(f, "#?")
        }
    }
}

/// Why a candidate stopped being propagated
#[derive(Clone, Debug, PartialEq)]
pub enum InactiveReason {
    /// Rejected by a condition, with the condition's flag value
    Rejected(String),

    /// Accepted by a condition (e.g. detected), with the flag value
    Accepted(String),

    /// Energy fell below the floor of a break condition
    BelowEnergy,

    /// Destroyed by an interaction, all energy went to secondaries or losses
    Absorbed,

    /// Maximum trajectory length or step count reached
    TrajectoryLimit,

    /// Still active when the run reached its maximum number of passes
    PassCeiling,

    /// Still active when the run was stopped from the outside
    Stopped,

    /// A module produced an unphysical state (e.g. negative energy)
    PhysicalInconsistency,

    /// The integrator produced a non-finite state
    NumericalFailure,

    /// Any other reason, described in words
    Custom(String),
}
//
impl InactiveReason {
    /// Truth that the run deactivated the candidate rather than a module
    pub fn is_forced(&self) -> bool {
        matches!(self, Self::PassCeiling | Self::Stopped)
    }
}

impl Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(flag) => write!(f, "rejected ({flag})"),
            Self::Accepted(flag) => write!(f, "accepted ({flag})"),
            Self::BelowEnergy => write!(f, "below minimum energy"),
            Self::Absorbed => write!(f, "absorbed"),
            Self::TrajectoryLimit => write!(f, "trajectory limit reached"),
            Self::PassCeiling => write!(f, "pass ceiling reached"),
            Self::Stopped => write!(f, "run stopped"),
            Self::PhysicalInconsistency => write!(f, "physical inconsistency"),
            Self::NumericalFailure => write!(f, "numerical failure"),
            Self::Custom(why) => write!(f, "{why}"),
        }
    }
}

/// Lifecycle status of a candidate
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    /// Eligible for the next pass
    Active,

    /// Terminal, carries the first reason it was deactivated for
    Inactive(InactiveReason),
}

/// Free-form side information attached to a candidate by modules
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    /// Yes/no marker
    Bool(bool),
    /// Integer value, e.g. a counter
    Int(i64),
    /// Real value
    Float(Float),
    /// Free text
    Text(String),
}

impl From<bool> for Property {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Property {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Float> for Property {
    fn from(x: Float) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// All information about one propagated particle
///
/// The candidate is a passive object: modules read and mutate it, the
/// scheduler moves it between passes.
///
#[derive(Clone, Debug)]
pub struct Candidate {
    // ### IDENTITY ###
    /// Run-wide identifier
    id: CandidateId,

    /// Identifier of the candidate which spawned this one (lookup only)
    parent: Option<CandidateId>,

    // ### PARTICLE STATES ###
    /// Particle state at the source
    source: ParticleState,

    /// State of the parent at the time this candidate was created
    created: ParticleState,

    /// Current particle state
    pub current: ParticleState,

    /// Particle state at the end of the previous step
    pub previous: ParticleState,

    // ### PROPAGATION BOOKKEEPING ###
    /// Distance travelled so far (m)
    trajectory_length: Float,

    /// Time elapsed since the source (s)
    time: Float,

    /// Size of the step that was just performed (m)
    current_step: Float,

    /// Proposed size of the next step (m)
    next_step: Float,

    /// Statistical weight
    weight: Float,

    /// Active or inactive, and why
    status: Status,

    /// Side information left by modules
    properties: BTreeMap<String, Property>,

    /// Secondaries spawned in the current pass, not yet promoted
    secondaries: Vec<Candidate>,

    // ### SCHEDULING BOOKKEEPING ###
    /// Pass in which this candidate was (or will be) first processed
    entered_pass: usize,

    /// Pass in which the parent spawned this candidate (secondaries only)
    spawned_in_pass: Option<usize>,

    /// Pass which is currently processing this candidate
    pass: usize,

    /// Number of passes this candidate went through
    num_passes: usize,

    /// Number of non-terminal detections by observers
    detections: usize,

    /// Number of integration steps accepted without meeting the tolerance
    degraded_steps: usize,

    /// Random stream of this candidate
    rng: RandomGenerator,
}
//
impl Candidate {
    // ### CONSTRUCTION ###

    /// Create a primary candidate, all states initialized with `state`
    pub fn new(state: ParticleState) -> Self {
        Self {
            id: CandidateId::UNASSIGNED,
            parent: None,
            source: state.clone(),
            created: state.clone(),
            current: state.clone(),
            previous: state,
            trajectory_length: 0.,
            time: 0.,
            current_step: 0.,
            next_step: 0.,
            weight: 1.,
            status: Status::Active,
            properties: BTreeMap::new(),
            secondaries: Vec::new(),
            entered_pass: 0,
            spawned_in_pass: None,
            pass: 0,
            num_passes: 0,
            detections: 0,
            degraded_steps: 0,
            rng: RandomGenerator::new(0),
        }
    }

    /// Give this candidate its run identity and random stream
    ///
    /// A candidate which already went through another run (e.g. taken out of a
    /// `ParticleCollector`) starts over as a primary of this run. It keeps its
    /// physical states and history, but not its former identity and lineage.
    ///
    pub(crate) fn admit(&mut self, id: CandidateId, run_seed: u64, entered_pass: usize) {
        if self.id.is_assigned() {
            self.parent = None;
            self.spawned_in_pass = None;
            self.num_passes = 0;
        }
        self.id = id;
        self.entered_pass = entered_pass;
        self.rng = RandomGenerator::for_stream(run_seed, id.0);
    }

    // ### SECONDARIES ###

    /// Spawn a secondary with the weight of this candidate
    ///
    /// The secondary inherits the source, trajectory length and elapsed time
    /// of this candidate, and remembers the current state as its creation
    /// context. It is only visible to the scheduler, and enters the population
    /// at the next pass.
    ///
    pub fn add_secondary(
        &mut self,
        id: ParticleId,
        energy: Float,
        position: Vector3,
        direction: Vector3,
    ) -> &mut Candidate {
        let weight = self.weight;
        self.add_weighted_secondary(id, energy, position, direction, weight)
    }

    /// Spawn a secondary with an explicit statistical weight
    pub fn add_weighted_secondary(
        &mut self,
        id: ParticleId,
        energy: Float,
        position: Vector3,
        direction: Vector3,
        weight: Float,
    ) -> &mut Candidate {
        let state = ParticleState::new(id, energy, position, direction);
        let mut secondary = Self::new(state);
        secondary.source = self.source.clone();
        secondary.created = self.current.clone();
        secondary.trajectory_length = self.trajectory_length;
        secondary.time = self.time;
        secondary.set_weight(weight);
        self.push_secondary(secondary)
    }

    /// Spawn a copy of this candidate, which will be propagated independently
    ///
    /// Used to split a candidate into statistically equivalent copies. The copy
    /// keeps the full state history but not the pending secondaries.
    ///
    pub fn add_clone(&mut self) -> &mut Candidate {
        let mut copy = Self {
            id: CandidateId::UNASSIGNED,
            secondaries: Vec::new(),
            ..self.clone()
        };
        copy.status = Status::Active;
        self.push_secondary(copy)
    }

    /// Record a freshly built secondary
    fn push_secondary(&mut self, mut secondary: Candidate) -> &mut Candidate {
        secondary.parent = Some(self.id);
        secondary.spawned_in_pass = Some(self.pass);
        secondary.entered_pass = self.pass + 1;
        secondary.next_step = self.next_step;
        self.secondaries.push(secondary);
        self.secondaries
            .last_mut()
            .expect("A secondary was just pushed")
    }

    /// Secondaries spawned during the current pass
    pub fn secondaries(&self) -> &[Candidate] {
        &self.secondaries
    }

    /// Remove pending secondaries for promotion into the population
    pub(crate) fn take_secondaries(&mut self) -> Vec<Candidate> {
        std::mem::take(&mut self.secondaries)
    }

    // ### STATUS ###

    /// Truth that the candidate takes part in the next pass
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Current status, see `inactive_reason()` for the details
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Reason of deactivation, if any
    pub fn inactive_reason(&self) -> Option<&InactiveReason> {
        match &self.status {
            Status::Active => None,
            Status::Inactive(reason) => Some(reason),
        }
    }

    /// Deactivate the candidate. Only the first reason is kept.
    ///
    /// Returns whether this call actually deactivated the candidate.
    ///
    pub fn set_inactive(&mut self, reason: InactiveReason) -> bool {
        match self.status {
            Status::Active => {
                self.status = Status::Inactive(reason);
                true
            }
            Status::Inactive(_) => false,
        }
    }

    // ### IDENTITY AND STATES ###

    /// Identifier within the current run
    pub fn id(&self) -> CandidateId {
        self.id
    }

    /// Candidate which spawned this one, for secondaries
    pub fn parent(&self) -> Option<CandidateId> {
        self.parent
    }

    /// State at the source of the primary this candidate descends from
    pub fn source(&self) -> &ParticleState {
        &self.source
    }

    /// State at which this candidate was created
    pub fn created(&self) -> &ParticleState {
        &self.created
    }

    /// Shift the current and previous positions by the same offset
    ///
    /// Used by periodic boundaries to move a candidate into another image of
    /// the simulation volume. The source and creation states are immutable and
    /// keep pointing to the first image.
    ///
    pub fn translate(&mut self, offset: &Vector3) {
        for state in [&mut self.current, &mut self.previous] {
            let position = state.position() + offset;
            state.set_position(position);
        }
    }

    // ### STEPPING ###

    /// Distance travelled since creation (m)
    pub fn trajectory_length(&self) -> Float {
        self.trajectory_length
    }

    /// Time elapsed since the source (s)
    pub fn time(&self) -> Float {
        self.time
    }

    /// Size of the last step (m)
    pub fn current_step(&self) -> Float {
        self.current_step
    }

    /// Record the step just performed, advancing length and time accordingly
    ///
    /// Only propagation modules should call this.
    ///
    pub fn set_current_step(&mut self, step: Float) {
        self.current_step = step;
        self.trajectory_length += step;
        self.time += step / C_LIGHT;
    }

    /// Proposed size of the next step (m)
    pub fn next_step(&self) -> Float {
        self.next_step
    }

    /// Propose the next step size. Only propagation modules should call this.
    pub fn set_next_step(&mut self, step: Float) {
        self.next_step = step;
    }

    /// Make sure that the next step is no longer than `step`
    pub fn limit_next_step(&mut self, step: Float) {
        self.next_step = self.next_step.min(step);
    }

    // ### WEIGHT ###

    /// Statistical weight
    pub fn weight(&self) -> Float {
        self.weight
    }

    /// Set the statistical weight. Negative weights are clamped to zero.
    pub fn set_weight(&mut self, weight: Float) {
        debug_assert!(weight >= 0., "Weights should not be negative");
        self.weight = weight.max(0.);
    }

    /// Multiply the statistical weight by a (non-negative) factor
    pub fn update_weight(&mut self, factor: Float) {
        self.set_weight(self.weight * factor);
    }

    // ### PROPERTIES ###

    /// Attach a property, replacing any former value for that key
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Truth that a property is set for this key
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Detach a property, returning its former value
    pub fn remove_property(&mut self, key: &str) -> Option<Property> {
        self.properties.remove(key)
    }

    /// All properties, ordered by key
    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    // ### SCHEDULING ###

    /// Mark the start of a new pass over this candidate
    pub(crate) fn begin_pass(&mut self, pass: usize) {
        debug_assert!(self.is_active(), "Inactive candidates must not be resubmitted");
        debug_assert!(pass >= self.entered_pass, "Candidate processed too early");
        self.pass = pass;
        self.num_passes += 1;
    }

    /// Pass in which this candidate was first processed
    pub fn entered_pass(&self) -> usize {
        self.entered_pass
    }

    /// Pass in which this candidate was spawned, for secondaries
    pub fn spawned_in_pass(&self) -> Option<usize> {
        self.spawned_in_pass
    }

    /// Pass which is currently processing (or last processed) this candidate
    pub fn pass(&self) -> usize {
        self.pass
    }

    /// Number of passes this candidate went through
    pub fn num_passes(&self) -> usize {
        self.num_passes
    }

    // ### DIAGNOSTICS ###

    /// Record a non-terminal detection by an observer
    pub fn record_detection(&mut self) {
        self.detections += 1;
    }

    /// Number of non-terminal detections
    pub fn detections(&self) -> usize {
        self.detections
    }

    /// Record an integration step which could not meet its tolerance
    pub fn record_degraded_step(&mut self) {
        self.degraded_steps += 1;
    }

    /// Number of steps integrated with degraded accuracy
    pub fn degraded_steps(&self) -> usize {
        self.degraded_steps
    }

    /// Truth that at least one step was integrated with degraded accuracy
    pub fn is_degraded(&self) -> bool {
        self.degraded_steps > 0
    }

    /// Random stream of this candidate
    pub fn rng(&mut self) -> &mut RandomGenerator {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn proton() -> Candidate {
        Candidate::new(ParticleState::new(
            ParticleId::PROTON,
            10.,
            Vector3::new(1., 2., 3.),
            Vector3::new(1., 0., 0.),
        ))
    }

    #[test]
    fn secondaries_inherit_creation_context() {
        let mut parent = proton();
        parent.admit(CandidateId(3), 1, 0);
        parent.set_current_step(5.);
        parent.current.set_position(Vector3::new(6., 2., 3.));
        parent.begin_pass(2);

        let secondary = parent.add_secondary(
            ParticleId::PHOTON,
            4.,
            Vector3::new(6., 2., 3.),
            Vector3::new(0., 1., 0.),
        );
        assert_eq!(secondary.id(), CandidateId::UNASSIGNED);
        assert_eq!(secondary.parent(), Some(CandidateId(3)));
        assert_eq!(secondary.source().position(), &Vector3::new(1., 2., 3.));
        assert_eq!(secondary.created().position(), &Vector3::new(6., 2., 3.));
        assert_eq!(secondary.current.id(), ParticleId::PHOTON);
        assert_eq!(secondary.trajectory_length(), 5.);
        assert_eq!(secondary.spawned_in_pass(), Some(2));
        assert_eq!(secondary.entered_pass(), 3);
        assert!(secondary.is_active());
        assert_eq!(parent.secondaries().len(), 1);
    }

    #[test]
    fn step_bookkeeping() {
        let mut c = proton();
        c.set_next_step(10.);
        c.limit_next_step(20.);
        assert_eq!(c.next_step(), 10.);
        c.limit_next_step(4.);
        assert_eq!(c.next_step(), 4.);
        c.set_current_step(C_LIGHT);
        c.set_current_step(C_LIGHT);
        assert_eq!(c.trajectory_length(), 2. * C_LIGHT);
        assert!((c.time() - 2.).abs() < 1e-6);
    }

    #[test]
    fn properties() {
        let mut c = proton();
        c.set_property("Rejected", "boundary");
        c.set_property("Count", 3i64);
        assert!(c.has_property("Rejected"));
        assert_eq!(c.property("Count"), Some(&Property::Int(3)));
        assert_eq!(
            c.remove_property("Rejected"),
            Some(Property::Text("boundary".into()))
        );
        assert!(!c.has_property("Rejected"));
    }

    #[test]
    fn clones_get_their_own_identity() {
        let mut c = proton();
        c.admit(CandidateId(0), 1, 0);
        c.set_weight(0.5);
        let copy = c.add_clone();
        assert_eq!(copy.id(), CandidateId::UNASSIGNED);
        assert_eq!(copy.weight(), 0.5);
        assert!(copy.secondaries().is_empty());
    }

    #[test]
    #[should_panic]
    fn identity_is_immutable() {
        let mut c = proton();
        c.admit(CandidateId(0), 1, 0);
        c.admit(CandidateId(1), 1, 0);
    }

    #[test]
    fn translation_keeps_source() {
        let mut c = proton();
        c.translate(&Vector3::new(-1., 0., 0.));
        assert_eq!(c.source().position(), &Vector3::new(1., 2., 3.));
        assert_eq!(c.previous.position(), &Vector3::new(0., 2., 3.));
        assert_eq!(c.current.position(), &Vector3::new(0., 2., 3.));
    }

    proptest! {
        #[test]
        fn first_inactive_reason_wins(first in "[a-z]{1,8}", second in "[a-z]{1,8}") {
            let mut c = proton();
            prop_assert!(c.set_inactive(InactiveReason::Custom(first.clone())));
            prop_assert!(!c.set_inactive(InactiveReason::Custom(second)));
            prop_assert!(!c.is_active());
            prop_assert_eq!(c.inactive_reason(), Some(&InactiveReason::Custom(first)));
        }

        #[test]
        fn weights_stay_non_negative(w in 0.0..10.0f64, f in 0.0..10.0f64) {
            let mut c = proton();
            c.set_weight(w as Float);
            c.update_weight(f as Float);
            prop_assert!(c.weight() >= 0.);
        }
    }
}
