//! Sequential back-end of the pass scheduler

use crate::{candidate::Candidate, scheduling::PassOutput};

/// Process batches in sequential mode
///
/// We use batched logic even in sequential mode, in order to get the same
/// output ordering as multi-threaded runs.
///
pub fn run_pass_impl(
    batches: Vec<Vec<Candidate>>,
    process_batch: impl Send + Sync + Fn(Vec<Candidate>) -> PassOutput,
) -> PassOutput {
    // Some double-checking cannot hurt...
    assert!(!batches.is_empty(), "Must process at least one batch");

    batches
        .into_iter()
        .fold(PassOutput::default(), |mut output, batch| {
            output.merge(process_batch(batch));
            output
        })
}
