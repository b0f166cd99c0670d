//! Run driver: repeated passes of the module chain over the population

use crate::{
    candidate::{Candidate, InactiveReason},
    chain::ModuleChain,
    error::ConfigError,
    output::Sink,
    population::{LineageTable, Population},
    scheduling::{self, PassOutput},
    Result,
};
use eyre::WrapErr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Handle to request a running simulation to stop
///
/// The request is honored between two passes. Candidates which are still
/// active at that point are force-terminated and reported.
///
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);
//
impl StopHandle {
    /// Handle which has not been triggered yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before its next pass
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Truth that a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What happened during a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of passes which were executed
    pub passes: usize,

    /// Number of distinct candidates admitted into the run
    pub processed: usize,

    /// Candidates deactivated by the modules
    pub normal: usize,

    /// Candidates deactivated by the run (pass ceiling or stop request)
    pub forced: usize,

    /// Candidates with at least one integration step of degraded accuracy
    pub degraded: usize,

    /// Secondaries admitted into the run
    pub secondaries: usize,

    /// Truth that the run was stopped from the outside
    pub stopped: bool,

    /// Candidates which were still active when the run was stopped
    pub remaining: usize,

    /// Parent and entry pass of every candidate of the run, by identifier
    pub lineage: LineageTable,
}

/// Simulation run: a module chain, its sinks, and the run parameters
pub struct Simulation {
    chain: ModuleChain,
    sinks: Vec<Arc<dyn Sink>>,
    max_passes: usize,
    seed: u64,
    stop: StopHandle,
}
//
impl Simulation {
    /// Set up a run, failing if the chain is empty or no pass is allowed
    pub fn new(
        chain: ModuleChain,
        max_passes: usize,
        seed: u64,
    ) -> std::result::Result<Self, ConfigError> {
        if chain.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        if max_passes == 0 {
            return Err(ConfigError::NotPositive {
                module: "Simulation",
                parameter: "max_passes",
                value: 0.,
            });
        }
        Ok(Self {
            chain,
            sinks: Vec::new(),
            max_passes,
            seed,
            stop: StopHandle::new(),
        })
    }

    /// Deliver every terminated candidate to a sink
    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    /// Handle which can be used to stop the run from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Module chain applied at every pass
    pub fn chain(&self) -> &ModuleChain {
        &self.chain
    }

    /// Maximal number of passes of a run
    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Propagate primary candidates and all their secondaries
    ///
    /// Per-candidate problems never make the run fail, they are recorded on
    /// the candidate. Errors only come from modules and sinks which fail to
    /// finish the run (typically output I/O errors).
    ///
    pub fn run(&self, primaries: impl IntoIterator<Item = Candidate>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut population = Population::new(self.seed);
        for candidate in primaries {
            if let Some(inactive) = population.admit(candidate, 0) {
                self.terminate(inactive, &mut summary);
            }
        }
        info!(
            primaries = population.num_admitted(),
            max_passes = self.max_passes,
            seed = self.seed,
            "Starting run"
        );
        self.chain.begin_run();

        // Apply the chain to every active candidate, pass after pass
        while !population.is_empty() && summary.passes < self.max_passes {
            if self.stop.is_stopped() {
                summary.stopped = true;
                break;
            }
            let pass = summary.passes;
            let candidates = population.take_active();
            let num_active = candidates.len();
            let chain = &self.chain;
            let output = scheduling::run_pass(candidates, |batch| {
                let mut output = PassOutput::default();
                for mut candidate in batch {
                    candidate.begin_pass(pass);
                    chain.process(&mut candidate);
                    output.integrate(candidate);
                }
                output
            });
            summary.passes += 1;

            // Synchronization barrier: promote secondaries, drain terminated
            let PassOutput {
                survivors,
                secondaries,
                terminated,
            } = output;
            let num_secondaries = secondaries.len();
            let num_terminated = terminated.len();
            population.requeue(survivors);
            for secondary in secondaries {
                summary.secondaries += 1;
                if let Some(inactive) = population.admit(secondary, pass + 1) {
                    self.terminate(inactive, &mut summary);
                }
            }
            for candidate in terminated {
                self.terminate(candidate, &mut summary);
            }
            debug!(
                pass,
                active = num_active,
                terminated = num_terminated,
                secondaries = num_secondaries,
                "Pass done"
            );
        }

        // Candidates left at this point are force-terminated
        let leftovers = population.take_active();
        if !leftovers.is_empty() {
            let reason = if summary.stopped {
                summary.remaining = leftovers.len();
                warn!(count = leftovers.len(), "Run stopped with active candidates left");
                InactiveReason::Stopped
            } else {
                warn!(
                    count = leftovers.len(),
                    max_passes = self.max_passes,
                    "Pass ceiling reached with active candidates left"
                );
                InactiveReason::PassCeiling
            };
            for mut candidate in leftovers {
                candidate.set_inactive(reason.clone());
                self.terminate(candidate, &mut summary);
            }
        }
        summary.processed = population.num_admitted();
        summary.lineage = population.into_lineage();

        // Notify the modules, then flush the sinks
        self.chain
            .end_run()
            .wrap_err("Failed to finish the module chain")?;
        for sink in &self.sinks {
            sink.finish().wrap_err("Failed to finish an output sink")?;
        }
        if summary.degraded > 0 {
            warn!(count = summary.degraded, "Some candidates had degraded accuracy");
        }
        info!(
            passes = summary.passes,
            processed = summary.processed,
            normal = summary.normal,
            forced = summary.forced,
            degraded = summary.degraded,
            secondaries = summary.secondaries,
            stopped = summary.stopped,
            "Run done"
        );
        Ok(summary)
    }

    /// Account for a terminated candidate and deliver it to the sinks
    fn terminate(&self, candidate: Candidate, summary: &mut RunSummary) {
        debug_assert!(!candidate.is_active());
        let forced = candidate.inactive_reason().map_or(false, InactiveReason::is_forced);
        if forced {
            summary.forced += 1;
        } else {
            summary.normal += 1;
        }
        if candidate.is_degraded() {
            summary.degraded += 1;
        }
        for sink in &self.sinks {
            sink.receive(&candidate);
        }
    }
}
