//! This module takes care of scheduling the work of one pass over the
//! candidate population, encapsulating use of multiple threads

#[cfg(feature = "multi-threading")]
mod multi_threading;
#[cfg(not(feature = "multi-threading"))]
mod sequential;

use crate::candidate::Candidate;

/// Size of the candidate batches
///
/// Candidates of a pass are grouped in batches which are processed as a
/// whole. Batch outputs are merged in batch order, which makes the outcome of
/// a pass independent of the number of threads.
///
/// This constant may need to be tuned if the cost of processing a candidate
/// changes a lot, but candidates are generally expensive enough for a small
/// hard-coded batch size to be reasonable.
///
const CANDIDATE_BATCH_SIZE: usize = 64;

/// Outcome of processing some candidates through the module chain
#[derive(Debug, Default)]
pub struct PassOutput {
    /// Candidates which are still active after the full chain
    pub survivors: Vec<Candidate>,

    /// Secondaries spawned during the pass, not admitted yet
    pub secondaries: Vec<Candidate>,

    /// Candidates which became inactive during the pass
    pub terminated: Vec<Candidate>,
}
//
impl PassOutput {
    /// Sort a processed candidate into the output, with its secondaries
    pub fn integrate(&mut self, mut candidate: Candidate) {
        self.secondaries.append(&mut candidate.take_secondaries());
        if candidate.is_active() {
            self.survivors.push(candidate);
        } else {
            self.terminated.push(candidate);
        }
    }

    /// Append the output of a later batch
    pub fn merge(&mut self, mut other: Self) {
        self.survivors.append(&mut other.survivors);
        self.secondaries.append(&mut other.secondaries);
        self.terminated.append(&mut other.terminated);
    }
}

/// Split candidates into batches, preserving their order
fn into_batches(candidates: Vec<Candidate>) -> Vec<Vec<Candidate>> {
    let mut batches = Vec::with_capacity(candidates.len() / CANDIDATE_BATCH_SIZE + 1);
    let mut candidates = candidates.into_iter().peekable();
    while candidates.peek().is_some() {
        batches.push(candidates.by_ref().take(CANDIDATE_BATCH_SIZE).collect());
    }
    batches
}

/// Run one pass in the manner that was configured at build time
///
/// Takes the candidates of the pass and a kernel which processes one batch of
/// them, and returns the merged output of all batches.
///
pub fn run_pass(
    candidates: Vec<Candidate>,
    process_batch: impl Send + Sync + Fn(Vec<Candidate>) -> PassOutput,
) -> PassOutput {
    let batches = into_batches(candidates);
    if batches.is_empty() {
        return PassOutput::default();
    }

    // ...in sequential mode
    #[cfg(not(feature = "multi-threading"))]
    {
        sequential::run_pass_impl(batches, process_batch)
    }

    // ...in multi-threaded mode
    #[cfg(feature = "multi-threading")]
    {
        multi_threading::run_pass_impl(batches, process_batch)
    }
}
