//! Run-scoped candidate population
//!
//! The population owns every active candidate between passes, hands out
//! identifiers, and remembers the lineage of every candidate that was ever
//! admitted. Parents are recorded as identifiers, so that lineage queries
//! never require keeping finished candidates alive. The lineage table is
//! handed over to the caller at the end of the run, see `RunSummary`.

use crate::candidate::{Candidate, CandidateId};

/// Lineage record of an admitted candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lineage {
    /// Parent candidate, `None` for primaries
    pub parent: Option<CandidateId>,

    /// Pass in which the candidate was first processed
    pub entered_pass: usize,
}

/// Lineage of every candidate admitted into a run, indexed by identifier
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineageTable(Vec<Lineage>);
//
impl LineageTable {
    /// Number of candidates admitted into the run
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Truth that no candidate was admitted
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lineage of an admitted candidate
    pub fn get(&self, id: CandidateId) -> Option<&Lineage> {
        usize::try_from(id.0).ok().and_then(|idx| self.0.get(idx))
    }

    /// Chain of ancestors of a candidate, closest first
    pub fn ancestors(&self, id: CandidateId) -> Vec<CandidateId> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id).and_then(|l| l.parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.get(parent).and_then(|l| l.parent);
        }
        ancestors
    }

    /// Record the next admitted candidate and return its identifier
    fn push(&mut self, lineage: Lineage) -> CandidateId {
        self.0.push(lineage);
        CandidateId((self.0.len() - 1) as u64)
    }
}

/// Active candidates of a run, plus the lineage of all admitted ones
#[derive(Debug)]
pub struct Population {
    /// Seed from which candidate random streams are derived
    run_seed: u64,

    /// Candidates awaiting the next pass
    active: Vec<Candidate>,

    /// Lineage of every admitted candidate
    lineage: LineageTable,
}
//
impl Population {
    /// Empty population, candidate streams derive from `run_seed`
    pub fn new(run_seed: u64) -> Self {
        Self {
            run_seed,
            active: Vec::new(),
            lineage: LineageTable::default(),
        }
    }

    /// Admit a candidate, which will first be processed in `pass`
    ///
    /// Identifiers are handed out in admission order, which only depends on
    /// the order in which candidates are admitted. Inactive candidates (e.g.
    /// secondaries which were deactivated by their creator) are admitted but
    /// returned immediately instead of being queued.
    ///
    pub fn admit(&mut self, mut candidate: Candidate, pass: usize) -> Option<Candidate> {
        let id = CandidateId(self.lineage.len() as u64);
        candidate.admit(id, self.run_seed, pass);
        let recorded = self.lineage.push(Lineage {
            parent: candidate.parent(),
            entered_pass: pass,
        });
        debug_assert_eq!(recorded, id);
        if candidate.is_active() {
            self.active.push(candidate);
            None
        } else {
            Some(candidate)
        }
    }

    /// Queue candidates which survived a pass, they keep their identity
    pub fn requeue(&mut self, survivors: impl IntoIterator<Item = Candidate>) {
        self.active.extend(survivors.into_iter().inspect(|c| {
            debug_assert!(c.id().is_assigned() && c.is_active());
        }));
    }

    /// Take the candidates of the next pass out of the population
    pub fn take_active(&mut self) -> Vec<Candidate> {
        std::mem::take(&mut self.active)
    }

    /// Number of candidates awaiting the next pass
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Truth that no candidate awaits the next pass
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of candidates admitted so far
    pub fn num_admitted(&self) -> usize {
        self.lineage.len()
    }

    /// Lineage of all candidates admitted so far
    pub fn lineage(&self) -> &LineageTable {
        &self.lineage
    }

    /// Give up the population, keeping the lineage of the run
    pub fn into_lineage(self) -> LineageTable {
        debug_assert!(self.active.is_empty(), "Active candidates left behind");
        self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        candidate::InactiveReason,
        linalg::Vector3,
        module::tests::proton,
        particle::ParticleId,
    };

    #[test]
    fn identifiers_follow_admission_order() {
        let mut population = Population::new(42);
        assert!(population.admit(proton(1.), 0).is_none());
        assert!(population.admit(proton(2.), 0).is_none());
        let active = population.take_active();
        assert_eq!(active[0].id(), CandidateId(0));
        assert_eq!(active[1].id(), CandidateId(1));
        assert!(population.is_empty());
        assert_eq!(population.num_admitted(), 2);
    }

    #[test]
    fn lineage_of_secondaries() {
        let mut population = Population::new(42);
        population.admit(proton(1.), 0);
        let mut parent = population.take_active().pop().unwrap();
        parent.begin_pass(0);
        parent.add_secondary(ParticleId::PHOTON, 0.5, Vector3::zeros(), Vector3::new(1., 0., 0.));
        let secondary = parent.take_secondaries().pop().unwrap();
        population.admit(secondary, 1);

        let child = population.take_active().pop().unwrap();
        assert_eq!(child.id(), CandidateId(1));
        assert_eq!(child.entered_pass(), 1);
        let lineage = population.into_lineage();
        assert_eq!(
            lineage.get(child.id()),
            Some(&Lineage {
                parent: Some(CandidateId(0)),
                entered_pass: 1
            })
        );
        assert_eq!(lineage.ancestors(child.id()), vec![CandidateId(0)]);
        assert!(lineage.get(CandidateId(7)).is_none());
    }

    #[test]
    fn inactive_candidates_are_not_queued() {
        let mut population = Population::new(42);
        let mut c = proton(1.);
        c.set_inactive(InactiveReason::BelowEnergy);
        let returned = population.admit(c, 0).unwrap();
        assert_eq!(returned.id(), CandidateId(0));
        assert!(population.is_empty());
    }

    #[test]
    fn streams_depend_on_identity() {
        let mut population = Population::new(42);
        population.admit(proton(1.), 0);
        population.admit(proton(1.), 0);
        let mut active = population.take_active();
        let a = active[0].rng().random();
        let b = active[1].rng().random();
        assert_ne!(a, b);
    }

    #[test]
    fn candidates_from_another_run_start_over() {
        // Spawn a secondary in a first run
        let mut first_run = Population::new(1);
        first_run.admit(proton(1.), 0);
        let mut parent = first_run.take_active().pop().unwrap();
        parent.begin_pass(0);
        parent.add_secondary(ParticleId::PHOTON, 0.5, Vector3::zeros(), Vector3::new(1., 0., 0.));
        first_run.admit(parent.take_secondaries().pop().unwrap(), 1);
        let mut secondary = first_run.take_active().pop().unwrap();
        secondary.begin_pass(1);
        assert_eq!(secondary.id(), CandidateId(1));

        // Feed it into a second run as a primary
        let mut second_run = Population::new(2);
        assert!(second_run.admit(secondary, 0).is_none());
        let readmitted = second_run.take_active().pop().unwrap();
        assert_eq!(readmitted.id(), CandidateId(0));
        assert_eq!(readmitted.parent(), None);
        assert_eq!(readmitted.spawned_in_pass(), None);
        assert_eq!(readmitted.num_passes(), 0);
        assert_eq!(readmitted.entered_pass(), 0);
        assert_eq!(readmitted.current.energy(), 0.5);
        assert!(second_run.lineage().ancestors(CandidateId(0)).is_empty());
    }
}
