//! Observers: detect candidates reaching a region of interest

use crate::{
    candidate::{Candidate, InactiveReason},
    linalg::Vector3,
    module::{Flag, Module},
    numeric::Float,
    output::Sink,
    units::MPC,
    Result,
};
use std::sync::Arc;

/// Geometrical detection criterion of an observer
///
/// Features may limit the next step of the candidate, so that it does not
/// overshoot the detection region.
///
pub trait ObserverFeature: Send + Sync {
    /// Truth that the candidate is detected by this feature
    fn check(&self, candidate: &mut Candidate) -> bool;

    /// Summary of the settings, for logs
    fn description(&self) -> String;
}

/// Detects candidates entering a sphere
///
/// Detection happens once, on the step which crosses the surface inwards.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmallSphere {
    center: Vector3,
    radius: Float,
}
//
impl SmallSphere {
    /// Sphere of given center and radius (m)
    pub fn new(center: Vector3, radius: Float) -> Self {
        Self { center, radius }
    }
}

impl ObserverFeature for SmallSphere {
    fn check(&self, candidate: &mut Candidate) -> bool {
        let d = (candidate.current.position() - self.center).norm();
        candidate.limit_next_step((d - self.radius).abs());
        if d > self.radius {
            return false;
        }
        let d_previous = (candidate.previous.position() - self.center).norm();
        d_previous > self.radius
    }

    fn description(&self) -> String {
        format!(
            "ObserverSmallSphere: radius {} Mpc around ({}, {}, {}) Mpc",
            self.radius / MPC,
            self.center.x / MPC,
            self.center.y / MPC,
            self.center.z / MPC
        )
    }
}

/// Detects candidates leaving a sphere
///
/// Detection happens once, on the step which crosses the surface outwards.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LargeSphere {
    center: Vector3,
    radius: Float,
}
//
impl LargeSphere {
    /// Sphere of given center and radius (m)
    pub fn new(center: Vector3, radius: Float) -> Self {
        Self { center, radius }
    }
}

impl ObserverFeature for LargeSphere {
    fn check(&self, candidate: &mut Candidate) -> bool {
        let d = (candidate.current.position() - self.center).norm();
        candidate.limit_next_step((self.radius - d).abs());
        if d < self.radius {
            return false;
        }
        let d_previous = (candidate.previous.position() - self.center).norm();
        d_previous < self.radius
    }

    fn description(&self) -> String {
        format!(
            "ObserverLargeSphere: radius {} Mpc around ({}, {}, {}) Mpc",
            self.radius / MPC,
            self.center.x / MPC,
            self.center.y / MPC,
            self.center.z / MPC
        )
    }
}

/// One-dimensional observer, detects candidates reaching x <= 0
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point;

impl ObserverFeature for Point {
    fn check(&self, candidate: &mut Candidate) -> bool {
        let x = candidate.current.position().x;
        if x > 0. {
            candidate.limit_next_step(x);
            false
        } else {
            true
        }
    }

    fn description(&self) -> String {
        "ObserverPoint: observer at x = 0".into()
    }
}

/// Observer made of a conjunction of features
///
/// A candidate is detected when all features detect it. Detected candidates
/// get a flag property and have their detection count incremented. They can
/// also be forwarded to a sink, and are deactivated unless configured
/// otherwise.
///
/// When detected candidates are deactivated, the run already forwards them to
/// its own sinks, so the same sink should not be registered in both places.
///
pub struct Observer {
    features: Vec<Box<dyn ObserverFeature>>,
    flag: Flag,
    make_inactive: bool,
    sink: Option<Arc<dyn Sink>>,
}
//
impl Observer {
    /// Observer without any feature, detecting nothing until one is added
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            flag: Flag::new("Detected", "Observer"),
            make_inactive: true,
            sink: None,
        }
    }

    /// Add a detection feature
    pub fn add(&mut self, feature: impl ObserverFeature + 'static) -> &mut Self {
        self.features.push(Box::new(feature));
        self
    }

    /// Flag set on detected candidates
    pub fn set_flag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.flag = Flag::new(key, value);
        self
    }

    /// Keep detected candidates active (non-terminal observation)
    pub fn set_make_inactive(&mut self, make_inactive: bool) -> &mut Self {
        self.make_inactive = make_inactive;
        self
    }

    /// Forward every detection to a sink
    pub fn on_detection(&mut self, sink: Arc<dyn Sink>) -> &mut Self {
        self.sink = Some(sink);
        self
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Observer {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() || self.features.is_empty() {
            return;
        }
        // Every feature must get a chance to limit the next step
        let mut detected = true;
        for feature in &self.features {
            detected &= feature.check(candidate);
        }
        if !detected {
            return;
        }

        candidate.record_detection();
        candidate.set_property(self.flag.key.clone(), self.flag.value.as_str());
        if let Some(sink) = &self.sink {
            sink.receive(candidate);
        }
        if self.make_inactive {
            candidate.set_inactive(InactiveReason::Accepted(self.flag.value.clone()));
        }
    }

    fn description(&self) -> String {
        let mut s = format!(
            "Observer, flag '{}' -> '{}', MakeInactive: {}",
            self.flag.key,
            self.flag.value,
            if self.make_inactive { "yes" } else { "no" }
        );
        for feature in &self.features {
            s += "\n    ";
            s += &feature.description();
        }
        s
    }

    fn end_run(&self) -> Result<()> {
        match &self.sink {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }
}
