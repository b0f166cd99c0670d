//! Break conditions: stop candidates which ran out of energy or budget

use crate::{
    candidate::{Candidate, InactiveReason},
    error::{ensure_positive, ConfigError},
    linalg::Vector3,
    module::{Condition, Module},
    numeric::Float,
    units::{EEV, MPC},
    Result,
};

/// Reject candidates whose energy is at or below a floor
#[derive(Clone)]
pub struct MinimumEnergy {
    min_energy: Float,
    condition: Condition,
}
//
impl MinimumEnergy {
    /// Reject candidates below `min_energy` (J)
    pub fn new(min_energy: Float) -> Self {
        Self {
            min_energy,
            condition: Condition::new("MinimumEnergy"),
        }
    }

    /// Energy threshold (J)
    pub fn min_energy(&self) -> Float {
        self.min_energy
    }

    /// Tune the rejection behaviour
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for MinimumEnergy {
    fn process(&self, candidate: &mut Candidate) {
        if candidate.is_active() && candidate.current.energy() <= self.min_energy {
            self.condition.reject(candidate, InactiveReason::BelowEnergy);
        }
    }

    fn description(&self) -> String {
        format!(
            "Minimum energy: {} EeV, {}",
            self.min_energy / EEV,
            self.condition.describe()
        )
    }

    fn begin_run(&self) {
        self.condition.begin_run()
    }

    fn end_run(&self) -> Result<()> {
        self.condition.end_run()
    }
}

/// Reject charged candidates whose rigidity E/Z falls below a floor
#[derive(Clone)]
pub struct MinimumRigidity {
    min_rigidity: Float,
    condition: Condition,
}
//
impl MinimumRigidity {
    /// Reject candidates below `min_rigidity` (V)
    pub fn new(min_rigidity: Float) -> Self {
        Self {
            min_rigidity,
            condition: Condition::new("MinimumRigidity"),
        }
    }

    /// Condition settings
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for MinimumRigidity {
    fn process(&self, candidate: &mut Candidate) {
        if candidate.is_active() && candidate.current.rigidity() < self.min_rigidity {
            self.condition.reject(candidate, InactiveReason::BelowEnergy);
        }
    }

    fn description(&self) -> String {
        format!(
            "Minimum rigidity: {} EeV, {}",
            self.min_rigidity / EEV,
            self.condition.describe()
        )
    }

    fn begin_run(&self) {
        self.condition.begin_run()
    }

    fn end_run(&self) -> Result<()> {
        self.condition.end_run()
    }
}

/// Reject candidates which travelled further than a maximum length
///
/// If observer positions are given, candidates are also rejected as soon as
/// none of the observers can be reached within the remaining length. The next
/// step is limited so that the maximum length is not overshot.
///
#[derive(Clone)]
pub struct MaximumTrajectoryLength {
    max_length: Float,
    observer_positions: Vec<Vector3>,
    condition: Condition,
}
//
impl MaximumTrajectoryLength {
    /// Reject candidates once they travelled `max_length` (m)
    pub fn new(max_length: Float) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            max_length: ensure_positive("MaximumTrajectoryLength", "max_length", max_length)?,
            observer_positions: Vec::new(),
            condition: Condition::new("MaximumTrajectoryLength"),
        })
    }

    /// Measure the remaining length as a distance to this observer too
    pub fn add_observer_position(&mut self, position: Vector3) {
        self.observer_positions.push(position);
    }

    /// Observer positions which shorten the remaining length
    pub fn observer_positions(&self) -> &[Vector3] {
        &self.observer_positions
    }

    /// Condition settings
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for MaximumTrajectoryLength {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let length = candidate.trajectory_length();
        let position = candidate.current.position();

        if !self.observer_positions.is_empty() {
            let in_range = self
                .observer_positions
                .iter()
                .any(|observer| (position - observer).norm() + length < self.max_length);
            if !in_range {
                self.condition
                    .reject(candidate, InactiveReason::TrajectoryLimit);
                return;
            }
        }

        if length >= self.max_length {
            self.condition
                .reject(candidate, InactiveReason::TrajectoryLimit);
        } else {
            candidate.limit_next_step(self.max_length - length);
        }
    }

    fn description(&self) -> String {
        let mut s = format!(
            "Maximum trajectory length: {} Mpc, {}",
            self.max_length / MPC,
            self.condition.describe()
        );
        if !self.observer_positions.is_empty() {
            s += "\n  Observer positions:";
            for position in &self.observer_positions {
                let p = position / MPC;
                s += &format!("\n    - ({}, {}, {}) Mpc", p.x, p.y, p.z);
            }
        }
        s
    }

    fn begin_run(&self) {
        self.condition.begin_run()
    }

    fn end_run(&self) -> Result<()> {
        self.condition.end_run()
    }
}

/// Reject candidates after a maximum number of passes through the chain
#[derive(Clone)]
pub struct MaximumSteps {
    max_steps: usize,
    condition: Condition,
}
//
impl MaximumSteps {
    /// Reject candidates after `max_steps` steps
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            condition: Condition::new("MaximumSteps"),
        }
    }

    /// Condition settings
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for MaximumSteps {
    fn process(&self, candidate: &mut Candidate) {
        if candidate.is_active() && candidate.num_passes() >= self.max_steps {
            self.condition
                .reject(candidate, InactiveReason::TrajectoryLimit);
        }
    }

    fn description(&self) -> String {
        format!(
            "Maximum steps: {}, {}",
            self.max_steps,
            self.condition.describe()
        )
    }

    fn begin_run(&self) {
        self.condition.begin_run()
    }

    fn end_run(&self) -> Result<()> {
        self.condition.end_run()
    }
}
