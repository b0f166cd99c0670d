//! Adaptive Runge-Kutta integration of trajectories in magnetic fields
//!
//! The equation of motion of a relativistic charged particle is integrated
//! in path length `s` rather than in time. With `u` the unit heading,
//!
//! ```text
//! dx/ds = u
//! du/ds = k (u × B(x)),    k = q c / E
//! ```
//!
//! where `k` is the curvature factor of the particle (inverse of the Larmor
//! radius per unit of perpendicular field).
//!
//! Steps are computed with the embedded 4(5) Runge-Kutta method of Cash and
//! Karp. The difference between the two embedded solutions estimates the local
//! truncation error, which drives step size control.

use crate::{
    error::{ensure_positive, ConfigError},
    linalg::{unit_or_zero, Vector3},
    numeric::{clip, floats, Float},
};
use num_traits::Zero;
use prefix_num_ops::real::*;
use std::ops::{Add, AddAssign, Mul};

/// Number of stages of the Cash-Karp method
const NUM_STAGES: usize = 6;

/// Cash-Karp stage coefficients (lower triangular part of the Butcher tableau)
#[rustfmt::skip]
const CASH_KARP_A: [[Float; NUM_STAGES]; NUM_STAGES] = [
    [0., 0., 0., 0., 0., 0.],
    [1. / 5., 0., 0., 0., 0., 0.],
    [3. / 40., 9. / 40., 0., 0., 0., 0.],
    [3. / 10., -9. / 10., 6. / 5., 0., 0., 0.],
    [-11. / 54., 5. / 2., -70. / 27., 35. / 27., 0., 0.],
    [1631. / 55296., 175. / 512., 575. / 13824., 44275. / 110592., 253. / 4096., 0.],
];

/// Weights of the fifth order solution
#[rustfmt::skip]
const CASH_KARP_B: [Float; NUM_STAGES] = [
    37. / 378., 0., 250. / 621., 125. / 594., 0., 512. / 1771.,
];

/// Weights of the embedded fourth order solution
#[rustfmt::skip]
const CASH_KARP_B_STAR: [Float; NUM_STAGES] = [
    2825. / 27648., 0., 18575. / 48384., 13525. / 55296., 277. / 14336., 1. / 4.,
];

/// Order of the error estimate, sets the exponent of step rescaling
const ERROR_ORDER: Float = 5.;

/// Phase space point of a trajectory: position and heading
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhasePoint {
    /// Position (m)
    pub position: Vector3,

    /// Heading, unit length on input and output of a step
    pub direction: Vector3,
}
//
impl PhasePoint {
    /// Phase-space point at `position` heading along `direction`
    pub fn new(position: Vector3, direction: Vector3) -> Self {
        Self {
            position,
            direction,
        }
    }

    /// Truth that no coordinate is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.direction.iter()).all(|x| x.is_finite())
    }
}

impl Add for PhasePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.position + rhs.position, self.direction + rhs.direction)
    }
}

impl AddAssign for PhasePoint {
    fn add_assign(&mut self, rhs: Self) {
        self.position += rhs.position;
        self.direction += rhs.direction;
    }
}

impl Mul<Float> for PhasePoint {
    type Output = Self;

    fn mul(self, rhs: Float) -> Self {
        Self::new(self.position * rhs, self.direction * rhs)
    }
}

impl Zero for PhasePoint {
    fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    fn is_zero(&self) -> bool {
        self.position.is_zero() && self.direction.is_zero()
    }
}

/// Adaptive step size control parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepControl {
    /// Target relative error of a step
    tolerance: Float,

    /// Smallest step size (m), accepted whatever its error
    min_step: Float,

    /// Largest step size (m)
    max_step: Float,

    /// Safety factor applied to the optimal rescaling
    safety: Float,

    /// Smallest rescale factor when a step is rejected
    min_shrink: Float,

    /// Largest rescale factor of the next step after an accepted one
    max_growth: Float,
}
//
impl StepControl {
    /// Set up step control with the usual safety and rescaling limits
    pub fn new(tolerance: Float, min_step: Float, max_step: Float) -> Result<Self, ConfigError> {
        if !(tolerance > 0. && tolerance <= 1.) {
            return Err(ConfigError::InvalidTolerance {
                module: "StepControl",
                value: tolerance,
            });
        }
        ensure_positive("StepControl", "min_step", min_step)?;
        if min_step > max_step {
            return Err(ConfigError::InvertedStepBounds {
                module: "StepControl",
                min: min_step,
                max: max_step,
            });
        }
        Ok(Self {
            tolerance,
            min_step,
            max_step,
            safety: 0.95,
            min_shrink: 0.1,
            max_growth: 5.,
        })
    }

    /// Override the limits on step rescaling
    pub fn with_rescale_limits(
        mut self,
        min_shrink: Float,
        max_growth: Float,
    ) -> Result<Self, ConfigError> {
        if !(min_shrink > 0. && min_shrink < 1.) {
            return Err(ConfigError::OutOfRange {
                module: "StepControl",
                parameter: "min_shrink",
                value: min_shrink,
                expected: "0 < min_shrink < 1",
            });
        }
        if !(max_growth > 1.) {
            return Err(ConfigError::OutOfRange {
                module: "StepControl",
                parameter: "max_growth",
                value: max_growth,
                expected: "max_growth > 1",
            });
        }
        self.min_shrink = min_shrink;
        self.max_growth = max_growth;
        Ok(self)
    }

    /// Target relative error of a step
    pub fn tolerance(&self) -> Float {
        self.tolerance
    }

    /// Smallest allowed step (m)
    pub fn min_step(&self) -> Float {
        self.min_step
    }

    /// Largest allowed step (m)
    pub fn max_step(&self) -> Float {
        self.max_step
    }

    /// Optimal rescale factor for an error ratio (error / tolerance)
    fn rescale(&self, error_ratio: Float) -> Float {
        if error_ratio <= 0. {
            self.max_growth
        } else {
            self.safety * error_ratio.powf(-1. / ERROR_ORDER)
        }
    }
}

/// How step sizes are chosen
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepMode {
    /// Error-controlled step sizes
    Adaptive(StepControl),

    /// Constant step size, without error estimation
    Fixed(Float),
}
//
impl StepMode {
    /// Fixed step mode, checking the step size
    pub fn fixed(step: Float) -> Result<Self, ConfigError> {
        ensure_positive("StepMode", "step", step).map(Self::Fixed)
    }

    /// Largest step that this mode may perform
    pub fn max_step(&self) -> Float {
        match self {
            Self::Adaptive(control) => control.max_step,
            Self::Fixed(step) => *step,
        }
    }
}

/// Outcome of one integration call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepRecord {
    /// Phase point at the end of the step, heading renormalized
    pub state: PhasePoint,

    /// Size of the step which was performed (m)
    pub accepted_step: Float,

    /// Proposed size of the next step (m)
    pub next_step: Float,

    /// Relative error estimate of the accepted step
    pub error: Float,

    /// Ratio of the next step to the accepted step
    pub rescale: Float,

    /// Truth that the step was forced through without meeting the tolerance
    pub degraded: bool,
}

/// Trajectory integrator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Integrator {
    mode: StepMode,
}
//
impl Integrator {
    /// Integrator using the given step size control
    pub fn new(mode: StepMode) -> Self {
        Self { mode }
    }

    /// Step size control in use
    pub fn mode(&self) -> &StepMode {
        &self.mode
    }

    /// Advance a phase point by one step
    ///
    /// `proposed` is the step size suggested by the previous call (and
    /// possibly limited by other modules since). `curvature` is the `k = qc/E`
    /// factor of the particle, and `field` gives the magnetic field at a
    /// position. Neutral particles and field-free positions move in a
    /// straight line, without any field evaluation beyond the first.
    ///
    pub fn advance(
        &self,
        y: &PhasePoint,
        proposed: Float,
        curvature: Float,
        field: impl Fn(&Vector3) -> Vector3,
    ) -> StepRecord {
        let straight = curvature == 0.
            || !curvature.is_finite()
            || field(&y.position).norm_squared() == 0.;
        if straight {
            return self.straight_line(y, proposed);
        }

        let derivative = |p: &PhasePoint| {
            let heading = unit_or_zero(&p.direction);
            PhasePoint::new(heading, heading.cross(&field(&p.position)) * curvature)
        };

        match self.mode {
            StepMode::Fixed(step) => {
                let (out, _error) = Self::try_step(y, step, &derivative);
                Self::finish(out, step, step, 0., false)
            }
            StepMode::Adaptive(control) => self.adaptive_step(&control, y, proposed, &derivative),
        }
    }

    /// Straight-line motion, exact for any step size
    pub fn straight_line(&self, y: &PhasePoint, proposed: Float) -> StepRecord {
        let (step, next_step) = match self.mode {
            StepMode::Fixed(step) => (step, step),
            StepMode::Adaptive(control) => {
                let step = clip(proposed, control.min_step, control.max_step);
                (step, (step * control.max_growth).min(control.max_step))
            }
        };
        let state = PhasePoint::new(y.position + y.direction * step, y.direction);
        StepRecord {
            state,
            accepted_step: step,
            next_step,
            error: 0.,
            rescale: next_step / step,
            degraded: false,
        }
    }

    /// Error-controlled step: shrink until the tolerance is met, then propose
    /// a grown step for next time
    fn adaptive_step(
        &self,
        control: &StepControl,
        y: &PhasePoint,
        proposed: Float,
        derivative: &impl Fn(&PhasePoint) -> PhasePoint,
    ) -> StepRecord {
        let mut step = clip(proposed, control.min_step, control.max_step);
        loop {
            let (out, error) = Self::try_step(y, step, derivative);
            let error = Self::relative_error(y, &error);
            let ratio = error / control.tolerance;

            // Error too large: retry with a smaller step, unless we are
            // already at the minimum step, which is accepted regardless
            if ratio > 1. {
                if step <= control.min_step {
                    return Self::finish(out, step, control.min_step, error, true);
                }
                let shrunk = step * control.rescale(ratio).max(control.min_shrink);
                step = shrunk.max(control.min_step);
                continue;
            }

            // Error fine (or NaN, which the caller must detect): accept and
            // propose the next step from the error ratio
            let rescale = control.rescale(ratio).min(control.max_growth);
            let next_step = clip(step * rescale, control.min_step, control.max_step);
            return Self::finish(out, step, next_step, error, false);
        }
    }

    /// Build the record of an accepted step
    fn finish(
        mut out: PhasePoint,
        step: Float,
        next_step: Float,
        error: Float,
        degraded: bool,
    ) -> StepRecord {
        out.direction = unit_or_zero(&out.direction);
        StepRecord {
            state: out,
            accepted_step: step,
            next_step,
            error,
            rescale: next_step / step,
            degraded,
        }
    }

    /// Error of a step relative to the magnitude of the heading
    ///
    /// The heading is dimensionless and of unit norm, which makes this
    /// measure independent of the particle's energy and of the length scale.
    ///
    fn relative_error(y: &PhasePoint, error: &PhasePoint) -> Float {
        let scale = y.direction.norm().max(floats::MIN_POSITIVE);
        abs(error.direction.norm()) / scale
    }

    /// Perform one Cash-Karp step of size h
    ///
    /// Returns the fifth order solution and the difference between the fifth
    /// and fourth order solutions.
    ///
    pub fn try_step(
        y: &PhasePoint,
        h: Float,
        derivative: &impl Fn(&PhasePoint) -> PhasePoint,
    ) -> (PhasePoint, PhasePoint) {
        let mut k = [PhasePoint::zero(); NUM_STAGES];
        let mut out = *y;
        let mut error = PhasePoint::zero();
        for i in 0..NUM_STAGES {
            let mut y_n = *y;
            for j in 0..i {
                y_n += k[j] * (CASH_KARP_A[i][j] * h);
            }
            k[i] = derivative(&y_n);
            out += k[i] * (CASH_KARP_B[i] * h);
            error += k[i] * ((CASH_KARP_B[i] - CASH_KARP_B_STAR[i]) * h);
        }
        (out, error)
    }
}

/// Analytical gyration radius of a particle with curvature factor k moving
/// perpendicularly to a field of magnitude b
pub fn larmor_radius(curvature: Float, b: Float) -> Float {
    1. / abs(curvature * b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn uniform_z(b: Float) -> impl Fn(&Vector3) -> Vector3 {
        move |_| Vector3::new(0., 0., b)
    }

    fn adaptive(tolerance: Float) -> Integrator {
        Integrator::new(StepMode::Adaptive(
            StepControl::new(tolerance, 1e-3, 10.).unwrap(),
        ))
    }

    #[test]
    fn tableau_is_consistent() {
        let sum_b: Float = CASH_KARP_B.iter().sum();
        let sum_bs: Float = CASH_KARP_B_STAR.iter().sum();
        assert!((sum_b - 1.).abs() < 1e-6);
        assert!((sum_bs - 1.).abs() < 1e-6);
        for row in CASH_KARP_A.iter() {
            assert!(row.iter().all(|a| a.is_finite()));
        }
    }

    #[test]
    fn invalid_control_is_rejected() {
        assert!(StepControl::new(0., 1., 2.).is_err());
        assert!(StepControl::new(2., 1., 2.).is_err());
        assert!(StepControl::new(0.1, 3., 2.).is_err());
        assert!(StepControl::new(0.1, 0., 2.).is_err());
        assert!(StepMode::fixed(-1.).is_err());
        let control = StepControl::new(0.1, 1., 2.).unwrap();
        assert!(control.with_rescale_limits(0.5, 0.5).is_err());
        assert!(control.with_rescale_limits(1.5, 5.).is_err());
    }

    #[test]
    fn zero_field_fixed_steps_are_exact() {
        let integrator = Integrator::new(StepMode::fixed(0.5).unwrap());
        let start = PhasePoint::new(Vector3::new(1., -2., 3.), Vector3::new(1., 0., 0.));
        let mut y = start;
        for _ in 0..1000 {
            let record = integrator.advance(&y, 0., 1., uniform_z(0.));
            assert_eq!(record.accepted_step, 0.5);
            assert!(!record.degraded);
            y = record.state;
        }
        assert_eq!(y.position, Vector3::new(501., -2., 3.));
        assert_eq!(y.direction, start.direction);
    }

    #[test]
    fn circular_orbit_stays_on_circle() {
        // k = 1, B = 1 -> unit Larmor radius, centered on (0, 1, 0)
        let integrator = adaptive(1e-6);
        let mut y = PhasePoint::new(Vector3::zeros(), Vector3::new(1., 0., 0.));
        let mut step = 1e-2;
        let mut travelled = 0.;
        while travelled < 2. * floats::consts::PI {
            let record = integrator.advance(&y, step, -1., uniform_z(1.));
            travelled += record.accepted_step;
            step = record.next_step;
            y = record.state;
            let radius = (y.position - Vector3::new(0., 1., 0.)).norm();
            assert!((radius - larmor_radius(-1., 1.)).abs() < 1e-3, "radius {radius}");
            assert!((y.direction.norm() - 1.).abs() < 1e-6);
        }
    }

    #[test]
    fn step_grows_when_error_is_small() {
        let integrator = adaptive(1e-2);
        let y = PhasePoint::new(Vector3::zeros(), Vector3::new(1., 0., 0.));
        let record = integrator.advance(&y, 1e-2, 1e-3, uniform_z(1.));
        assert_eq!(record.accepted_step, 1e-2);
        assert!(record.next_step > record.accepted_step);
        assert!(record.next_step <= 5. * record.accepted_step);
    }

    #[test]
    fn minimum_step_is_forced_through() {
        let integrator = Integrator::new(StepMode::Adaptive(
            StepControl::new(1e-12, 1., 10.).unwrap(),
        ));
        let y = PhasePoint::new(Vector3::zeros(), Vector3::new(1., 0., 0.));
        let record = integrator.advance(&y, 10., 10., uniform_z(1.));
        assert_eq!(record.accepted_step, 1.);
        assert!(record.degraded);
        assert!(record.state.is_finite());
    }

    proptest! {
        #[test]
        fn straight_lines_follow_the_heading(
            dx in -1.0..1.0f64, dy in -1.0..1.0f64, dz in 0.1..1.0f64,
            step in 0.01..10.0f64, n in 1usize..50,
        ) {
            let direction = unit_or_zero(&Vector3::new(dx as Float, dy as Float, dz as Float));
            let step = step as Float;
            let integrator = Integrator::new(StepMode::Fixed(step));
            let mut y = PhasePoint::new(Vector3::zeros(), direction);
            for _ in 0..n {
                y = integrator.advance(&y, step, 0., uniform_z(1.)).state;
            }
            let expected = direction * (step * n as Float);
            let tol = 8. * floats::EPSILON * (n as Float) * step;
            prop_assert!((y.position - expected).norm() <= tol);
        }

        #[test]
        fn tighter_tolerance_never_grows_accepted_step(
            tolerance in 1e-6..1e-1f64,
            proposed in 0.001..0.3f64,
            b in 0.1..2.0f64,
        ) {
            let y = PhasePoint::new(Vector3::zeros(), Vector3::new(1., 0., 0.));
            let loose = adaptive(tolerance as Float)
                .advance(&y, proposed as Float, 1., uniform_z(b as Float));
            let tight = adaptive(tolerance as Float / 10.)
                .advance(&y, proposed as Float, 1., uniform_z(b as Float));
            prop_assert!(tight.accepted_step <= loose.accepted_step);
        }
    }
}
