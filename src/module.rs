//! The module abstraction: one processing step applied to candidates
//!
//! A module has a single operation, `process`, which mutates a candidate. It
//! may move it, change its energy, flag it inactive, or spawn secondaries.
//! Modules never fail on a single candidate: anything that goes wrong is
//! recorded on the candidate. Configuration problems are reported by the
//! module constructors instead.
//!
//! Modules are shared by all workers of a run, so any internal mutable state
//! (counters, output buffers) must be synchronized by the module itself.

use crate::{
    candidate::{Candidate, InactiveReason},
    Result,
};
use std::sync::Arc;

/// One processing step of the module chain
pub trait Module: Send + Sync {
    /// Process one candidate
    ///
    /// Well-behaved modules return immediately on inactive candidates, except
    /// for conditions which decide about inactivity themselves.
    ///
    fn process(&self, candidate: &mut Candidate);

    /// Human-readable description of the module and its parameters
    fn description(&self) -> String;

    /// Called once before the first pass of a run
    fn begin_run(&self) {}

    /// Called once after the last pass of a run
    fn end_run(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a module, lives as long as the run which uses it
pub type ModuleRef = Arc<dyn Module>;

/// Flag set on a candidate as a `(key, value)` property
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flag {
    /// Property key
    pub key: String,
    /// Property value
    pub value: String,
}
//
impl Flag {
    /// Flag setting property `key` to `value`
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Shared behaviour of conditions (break conditions, boundaries, observers)
///
/// A condition rejects or accepts candidates. On either outcome it may run an
/// extra action module, set a flag property, and deactivate the candidate.
/// By default, rejected candidates are flagged `Rejected` and deactivated,
/// accepted ones are left alone.
///
#[derive(Clone)]
pub struct Condition {
    reject_flag: Option<Flag>,
    accept_flag: Option<Flag>,
    make_rejected_inactive: bool,
    make_accepted_inactive: bool,
    reject_action: Option<ModuleRef>,
    accept_action: Option<ModuleRef>,
}
//
impl Condition {
    /// Default condition behaviour, flagging rejections with `value`
    pub fn new(reject_value: impl Into<String>) -> Self {
        Self {
            reject_flag: Some(Flag::new("Rejected", reject_value)),
            accept_flag: None,
            make_rejected_inactive: true,
            make_accepted_inactive: false,
            reject_action: None,
            accept_action: None,
        }
    }

    /// Flag set on rejected candidates
    pub fn set_reject_flag(&mut self, flag: Option<Flag>) -> &mut Self {
        self.reject_flag = flag;
        self
    }

    /// Flag set on accepted candidates
    pub fn set_accept_flag(&mut self, flag: Option<Flag>) -> &mut Self {
        self.accept_flag = flag;
        self
    }

    /// Whether rejected candidates are deactivated
    pub fn set_make_rejected_inactive(&mut self, deactivate: bool) -> &mut Self {
        self.make_rejected_inactive = deactivate;
        self
    }

    /// Whether accepted candidates are deactivated
    pub fn set_make_accepted_inactive(&mut self, deactivate: bool) -> &mut Self {
        self.make_accepted_inactive = deactivate;
        self
    }

    /// Run a module on every rejected candidate
    pub fn on_reject(&mut self, action: ModuleRef) -> &mut Self {
        self.reject_action = Some(action);
        self
    }

    /// Run a module on every accepted candidate
    pub fn on_accept(&mut self, action: ModuleRef) -> &mut Self {
        self.accept_action = Some(action);
        self
    }

    /// Apply the rejection outcome to a candidate
    pub fn reject(&self, candidate: &mut Candidate, reason: InactiveReason) {
        if let Some(action) = &self.reject_action {
            action.process(candidate);
        }
        if let Some(flag) = &self.reject_flag {
            candidate.set_property(flag.key.clone(), flag.value.as_str());
        }
        if self.make_rejected_inactive {
            candidate.set_inactive(reason);
        }
    }

    /// Apply the acceptance outcome to a candidate
    pub fn accept(&self, candidate: &mut Candidate) {
        if let Some(action) = &self.accept_action {
            action.process(candidate);
        }
        if let Some(flag) = &self.accept_flag {
            candidate.set_property(flag.key.clone(), flag.value.as_str());
        }
        if self.make_accepted_inactive {
            let value = self
                .accept_flag
                .as_ref()
                .map_or_else(String::new, |flag| flag.value.clone());
            candidate.set_inactive(InactiveReason::Accepted(value));
        }
    }

    /// Describe the condition behaviour, for module descriptions
    pub fn describe(&self) -> String {
        let mut s = match &self.reject_flag {
            Some(flag) => format!("Flag: '{}' -> '{}', ", flag.key, flag.value),
            None => String::new(),
        };
        s += if self.make_rejected_inactive {
            "MakeInactive: yes"
        } else {
            "MakeInactive: no"
        };
        if let Some(action) = &self.reject_action {
            s += &format!(", Action: {}", action.description());
        }
        s
    }

    pub(crate) fn begin_run(&self) {
        for action in self.reject_action.iter().chain(self.accept_action.iter()) {
            action.begin_run();
        }
    }

    pub(crate) fn end_run(&self) -> Result<()> {
        for action in self.reject_action.iter().chain(self.accept_action.iter()) {
            action.end_run()?;
        }
        Ok(())
    }
}
