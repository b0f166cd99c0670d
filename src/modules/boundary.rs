//! Boundaries of the simulation volume

use crate::{
    candidate::{Candidate, InactiveReason},
    error::{ensure_positive, ConfigError},
    linalg::{self, Vector3, SPACE_DIM},
    module::{Condition, Module},
    numeric::Float,
    units::{KPC, MPC},
    Result,
};

/// Default distance by which boundaries let candidates overshoot them
const DEFAULT_MARGIN: Float = 0.1 * KPC;

/// Format a position in Mpc
fn mpc(v: &Vector3) -> String {
    let v = v / MPC;
    format!("({}, {}, {})", v.x, v.y, v.z)
}

/// Reject candidates which leave a sphere
///
/// Candidates are rejected once their distance to the center reaches the
/// radius. Unless disabled, the next step is limited so that candidates
/// do not overshoot the boundary by more than a small margin.
///
#[derive(Clone)]
pub struct SphericalBoundary {
    center: Vector3,
    radius: Float,
    limit_step: bool,
    margin: Float,
    condition: Condition,
}
//
impl SphericalBoundary {
    /// Spherical boundary, the radius may be infinite
    pub fn new(center: Vector3, radius: Float) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            center,
            radius: ensure_positive("SphericalBoundary", "radius", radius)?,
            limit_step: true,
            margin: DEFAULT_MARGIN,
            condition: Condition::new("SphericalBoundary"),
        })
    }

    /// Whether the next step is limited to the distance to the boundary
    pub fn set_limit_step(&mut self, limit_step: bool) {
        self.limit_step = limit_step;
    }

    /// Distance below which the step is no longer limited (m)
    pub fn set_margin(&mut self, margin: Float) {
        self.margin = margin;
    }

    /// Condition settings of this boundary
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for SphericalBoundary {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let distance = (candidate.current.position() - self.center).norm();
        if distance >= self.radius {
            self.condition.reject(
                candidate,
                InactiveReason::Rejected("SphericalBoundary".into()),
            );
        } else if self.limit_step {
            candidate.limit_next_step(self.radius - distance + self.margin);
        }
    }

    fn description(&self) -> String {
        format!(
            "Spherical Boundary: radius {} Mpc, around {} Mpc, {}",
            self.radius / MPC,
            mpc(&self.center),
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

/// Reject candidates which leave a cube `[origin, origin + size]^3`
#[derive(Clone)]
pub struct CubicBoundary {
    origin: Vector3,
    size: Float,
    limit_step: bool,
    margin: Float,
    condition: Condition,
}
//
impl CubicBoundary {
    /// Cube of edge `size` with its lower corner at `origin`
    pub fn new(origin: Vector3, size: Float) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            origin,
            size: ensure_positive("CubicBoundary", "size", size)?,
            limit_step: true,
            margin: DEFAULT_MARGIN,
            condition: Condition::new("CubicBoundary"),
        })
    }

    /// Whether the next step is limited to the distance to the boundary
    pub fn set_limit_step(&mut self, limit_step: bool) {
        self.limit_step = limit_step;
    }

    /// Distance below which the step is no longer limited (m)
    pub fn set_margin(&mut self, margin: Float) {
        self.margin = margin;
    }

    /// Condition settings of this boundary
    pub fn condition_mut(&mut self) -> &mut Condition {
        &mut self.condition
    }
}

impl Module for CubicBoundary {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let r = candidate.current.position() - self.origin;
        let (lo, hi) = (r.min(), r.max());
        if lo <= 0. || hi >= self.size {
            self.condition
                .reject(candidate, InactiveReason::Rejected("CubicBoundary".into()));
        } else if self.limit_step {
            candidate.limit_next_step(lo + self.margin);
            candidate.limit_next_step(self.size - hi + self.margin);
        }
    }

    fn description(&self) -> String {
        format!(
            "Cubic Boundary: origin {} Mpc, size {} Mpc, {}",
            mpc(&self.origin),
            self.size / MPC,
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

/// Check the size of a box-shaped volume
fn check_box_size(module: &'static str, size: &Vector3) -> std::result::Result<(), ConfigError> {
    for &s in size.iter() {
        ensure_positive(module, "size", s)?;
    }
    Ok(())
}

/// Periodic boundary conditions
///
/// Candidates leaving the box re-enter it from the opposite side. The current
/// and previous positions are moved together, so that the last step keeps its
/// geometry.
///
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodicBox {
    origin: Vector3,
    size: Vector3,
}
//
impl PeriodicBox {
    /// Box of given size with its lower corner at `origin`
    pub fn new(origin: Vector3, size: Vector3) -> std::result::Result<Self, ConfigError> {
        check_box_size("PeriodicBox", &size)?;
        Ok(Self { origin, size })
    }
}

impl Module for PeriodicBox {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let cell = (candidate.current.position() - self.origin).component_div(&self.size);
        let n = linalg::floor(&cell);
        if n == Vector3::zeros() {
            return;
        }
        candidate.translate(&-n.component_mul(&self.size));
    }

    fn description(&self) -> String {
        format!(
            "Periodic box: origin {} Mpc, size {} Mpc",
            mpc(&self.origin),
            mpc(&self.size)
        )
    }
}

/// Reflective boundary conditions
///
/// Candidates leaving the box are mirrored back into it and their heading is
/// flipped along the crossed axes. Current and previous states are mirrored
/// together.
///
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectiveBox {
    origin: Vector3,
    size: Vector3,
}
//
impl ReflectiveBox {
    /// Box of given size with its lower corner at `origin`
    pub fn new(origin: Vector3, size: Vector3) -> std::result::Result<Self, ConfigError> {
        check_box_size("ReflectiveBox", &size)?;
        Ok(Self { origin, size })
    }

    /// Position in cell units
    fn to_cell(&self, position: &Vector3) -> Vector3 {
        (position - self.origin).component_div(&self.size)
    }

    /// Position in space coordinates
    fn from_cell(&self, cell: &Vector3) -> Vector3 {
        cell.component_mul(&self.size) + self.origin
    }
}

impl Module for ReflectiveBox {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() {
            return;
        }
        let mut current = self.to_cell(candidate.current.position());
        let n = linalg::floor(&current);
        if n == Vector3::zeros() {
            return;
        }

        // Flip the heading along the axes crossed an odd number of times
        let flip = n.map(|k| if k.rem_euclid(2.) == 0. { 1. } else { -1. });
        let direction = candidate.current.direction().component_mul(&flip);
        candidate.current.set_direction(direction);
        let direction = candidate.previous.direction().component_mul(&flip);
        candidate.previous.set_direction(direction);

        // Mirror until the current position is back in the cell
        let mut previous = self.to_cell(candidate.previous.position());
        for axis in 0..SPACE_DIM {
            while current[axis] < 0. || current[axis] > 1. {
                let t = if current[axis] > 1. { 2. } else { 0. };
                current[axis] = t - current[axis];
                previous[axis] = t - previous[axis];
            }
        }
        candidate.current.set_position(self.from_cell(&current));
        candidate.previous.set_position(self.from_cell(&previous));
    }

    fn description(&self) -> String {
        format!(
            "Reflective box: origin {} Mpc, size {} Mpc",
            mpc(&self.origin),
            mpc(&self.size)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::tests::proton;

    fn at(x: Float, y: Float, z: Float) -> Candidate {
        let mut c = proton(1.);
        c.current.set_position(Vector3::new(x, y, z));
        c.set_next_step(100.);
        c
    }

    #[test]
    fn spherical_boundary_is_inclusive() {
        let boundary = SphericalBoundary::new(Vector3::zeros(), 10.).unwrap();
        let mut c = at(9., 0., 0.);
        boundary.process(&mut c);
        assert!(c.is_active());
        assert_eq!(c.next_step(), 1. + DEFAULT_MARGIN);
        let mut c = at(10., 0., 0.);
        boundary.process(&mut c);
        assert_eq!(
            c.inactive_reason(),
            Some(&InactiveReason::Rejected("SphericalBoundary".into()))
        );
        assert!(c.has_property("Rejected"));
    }

    #[test]
    fn infinite_sphere_never_rejects() {
        let boundary = SphericalBoundary::new(Vector3::zeros(), Float::INFINITY).unwrap();
        let mut c = at(1e30, 0., 0.);
        boundary.process(&mut c);
        assert!(c.is_active());
        assert_eq!(c.next_step(), 100.);
        assert!(SphericalBoundary::new(Vector3::zeros(), 0.).is_err());
    }

    #[test]
    fn cubic_boundary() {
        let mut boundary = CubicBoundary::new(Vector3::zeros(), 10.).unwrap();
        boundary.set_margin(0.);
        let mut c = at(2., 5., 9.);
        boundary.process(&mut c);
        assert!(c.is_active());
        assert_eq!(c.next_step(), 1.);
        let mut c = at(2., -1., 5.);
        boundary.process(&mut c);
        assert!(!c.is_active());
    }

    #[test]
    fn periodic_box_wraps_positions() {
        let boundary = PeriodicBox::new(Vector3::zeros(), Vector3::repeat(10.)).unwrap();
        let mut c = at(12., -3., 5.);
        c.previous.set_position(Vector3::new(9., -1., 5.));
        boundary.process(&mut c);
        assert_eq!(*c.current.position(), Vector3::new(2., 7., 5.));
        assert_eq!(*c.previous.position(), Vector3::new(-1., 9., 5.));
        assert_eq!(*c.source().position(), Vector3::zeros());
    }

    #[test]
    fn reflective_box_mirrors_positions_and_heading() {
        let boundary = ReflectiveBox::new(Vector3::zeros(), Vector3::repeat(8.)).unwrap();
        let mut c = at(10., 4., 4.);
        c.previous.set_position(Vector3::new(7., 4., 4.));
        boundary.process(&mut c);
        assert_eq!(*c.current.position(), Vector3::new(6., 4., 4.));
        assert_eq!(*c.previous.position(), Vector3::new(9., 4., 4.));
        assert_eq!(*c.current.direction(), Vector3::new(-1., 0., 0.));
        assert!(ReflectiveBox::new(Vector3::zeros(), Vector3::new(1., 0., 1.)).is_err());
    }
}
