//! The module chain: an ordered list of modules applied to every candidate

use crate::{
    candidate::Candidate,
    module::{Module, ModuleRef},
    Result,
};
use std::sync::Arc;

/// Ordered sequence of modules, fixed for the duration of a run
///
/// The chain is shared by all workers. Every module runs on every candidate,
/// in insertion order, even after an earlier module deactivated it.
///
#[derive(Clone, Default)]
pub struct ModuleChain {
    modules: Vec<ModuleRef>,
}
//
impl ModuleChain {
    /// Start with an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module to the chain
    pub fn add(&mut self, module: impl Module + 'static) -> &mut Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Append a module which is also used elsewhere (e.g. as a condition action)
    pub fn add_shared(&mut self, module: ModuleRef) -> &mut Self {
        self.modules.push(module);
        self
    }

    /// Number of modules in the chain
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Truth that there is no module in the chain
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules, in application order
    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    /// Run every module on one candidate
    pub fn process(&self, candidate: &mut Candidate) {
        for module in &self.modules {
            module.process(candidate);
        }
    }

    /// Describe the chain, one module per line
    pub fn description(&self) -> String {
        let mut s = String::from("ModuleChain");
        for module in &self.modules {
            s += "\n  ";
            s += &module.description();
        }
        s
    }

    pub(crate) fn begin_run(&self) {
        for module in &self.modules {
            module.begin_run();
        }
    }

    /// Notify all modules that the run is over, even if some of them fail
    pub(crate) fn end_run(&self) -> Result<()> {
        let mut first_error = None;
        for (idx, module) in self.modules.iter().enumerate() {
            if let Err(e) = module.end_run() {
                first_error.get_or_insert(e.wrap_err(format!("Module #{idx} failed to end the run")));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        candidate::InactiveReason,
        module::tests::{proton, Counter},
    };
    use eyre::eyre;
    use std::sync::atomic::Ordering;

    struct Deactivate;

    impl Module for Deactivate {
        fn process(&self, candidate: &mut Candidate) {
            candidate.set_inactive(InactiveReason::Custom("test".into()));
        }

        fn description(&self) -> String {
            "Deactivate".into()
        }
    }

    struct FailingEnd;

    impl Module for FailingEnd {
        fn process(&self, _candidate: &mut Candidate) {}

        fn description(&self) -> String {
            "FailingEnd".into()
        }

        fn end_run(&self) -> Result<()> {
            Err(eyre!("flush failed"))
        }
    }

    #[test]
    fn all_modules_run_in_order() {
        let counter = Arc::new(Counter::default());
        let mut chain = ModuleChain::new();
        chain.add(Deactivate).add_shared(counter.clone());
        let mut c = proton(1.);
        chain.process(&mut c);
        assert!(!c.is_active());
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.description(), "ModuleChain\n  Deactivate\n  Counter");
    }

    #[test]
    fn end_run_reports_failures() {
        let mut chain = ModuleChain::new();
        chain.add(FailingEnd).add(Deactivate);
        assert!(chain.end_run().is_err());
    }
}
