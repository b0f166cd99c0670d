//! Multi-threaded back-end of the pass scheduler

#[cfg(feature = "faster-threading")]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{candidate::Candidate, scheduling::PassOutput};

use std::sync::Mutex;

/// Process batches in multi-threaded mode
///
/// Every batch is processed by its own rayon task. This function only returns
/// once all tasks are done, which is the synchronization barrier between two
/// passes.
///
pub fn run_pass_impl(
    batches: Vec<Vec<Candidate>>,
    process_batch: impl Send + Sync + Fn(Vec<Candidate>) -> PassOutput,
) -> PassOutput {
    // Some double-checking cannot hurt...
    assert!(!batches.is_empty(), "Must process at least one batch");
    let num_batches = batches.len();

    // The outputs of parallel tasks will be aggregated...
    let accumulator = {
        // ...in a way that makes the output order reproducible
        #[cfg(not(feature = "faster-threading"))]
        {
            ReproducibleAccumulator::new(num_batches)
        }

        // ...in a way that is optimized for computational performance
        #[cfg(feature = "faster-threading")]
        {
            FastAccumulator::new(num_batches)
        }
    };

    // This function is a synchronization scope: it will only return
    // once all inner tasks have been executed
    rayon::scope(|scope| {
        for (batch_id, batch) in batches.into_iter().enumerate() {
            let accumulator_ref = &accumulator;
            let process_batch_ref = &process_batch;
            scope.spawn(move |_| {
                let output = process_batch_ref(batch);
                accumulator_ref.set_task_result(batch_id, output);
            });
        }
    });

    // Extract the results from the accumulator
    accumulator.get_merged_result()
}

/// Reproducibility-optimized output accumulation mechanism
#[cfg(not(feature = "faster-threading"))]
struct ReproducibleAccumulator {
    /// Storage for the outputs of parallel tasks
    results: Box<[Mutex<Option<PassOutput>>]>,
}
//
#[cfg(not(feature = "faster-threading"))]
impl ReproducibleAccumulator {
    /// Set up results storage for N parallel tasks
    fn new(num_tasks: usize) -> Self {
        assert!(num_tasks > 0, "There should be at least one task");
        Self {
            results: (0..num_tasks)
                .map(|_| Mutex::new(None))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Integrate the output of the n-th task
    fn set_task_result(&self, task_id: usize, result: PassOutput) {
        let mut lock = self.results[task_id]
            .lock()
            .expect("Mutex data should be valid");
        assert!(lock.is_none(), "Tasks should not report results twice");
        *lock = Some(result);
    }

    /// Merge the outputs in batch order
    fn get_merged_result(self) -> PassOutput {
        self.results
            .into_vec()
            .into_iter()
            .map(|entry| {
                entry
                    .into_inner()
                    .expect("Mutex data should be valid")
                    .expect("Result should be ready")
            })
            .fold(PassOutput::default(), |mut r1, r2| {
                r1.merge(r2);
                r1
            })
    }
}

/// Speed-optimized output accumulation mechanism
///
/// Outputs are merged in completion order, so identifiers handed out to the
/// secondaries of a pass (and thus their random streams) depend on thread
/// scheduling.
///
#[cfg(feature = "faster-threading")]
struct FastAccumulator {
    /// Storage location in which outputs will be merged out of order
    merged_result: Mutex<PassOutput>,

    /// Truth that each task has reported its output
    task_finished: Box<[AtomicBool]>,
}
//
#[cfg(feature = "faster-threading")]
impl FastAccumulator {
    /// Set up results storage for N parallel tasks
    fn new(num_tasks: usize) -> Self {
        assert!(num_tasks > 0, "There should be at least one task");
        Self {
            merged_result: Mutex::new(PassOutput::default()),
            task_finished: (0..num_tasks)
                .map(|_| AtomicBool::new(false))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Integrate the output of the n-th task
    fn set_task_result(&self, task_id: usize, result: PassOutput) {
        self.merged_result
            .lock()
            .expect("Mutex data should be valid")
            .merge(result);

        // Remember that this task has completed its work
        let was_finished = self.task_finished[task_id].swap(true, Ordering::Relaxed);
        assert!(!was_finished, "Tasks should not set their result twice");
    }

    /// Collect the merged output
    fn get_merged_result(self) -> PassOutput {
        // Check that all tasks have completed their work
        for ready in self.task_finished.into_vec().into_iter() {
            assert!(
                ready.load(Ordering::Relaxed),
                "All tasks should have completed their work"
            );
        }
        self.merged_result
            .into_inner()
            .expect("Mutex data should be valid")
    }
}
