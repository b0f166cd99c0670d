//! Random number generation, built on the abstractions of the "rand" crate
//!
//! Every promoted candidate owns its own generator, derived from the run seed
//! and the candidate identifier. The random draws seen by a candidate thus do
//! not depend on which worker processes it, nor on the order in which
//! candidates are processed.

use crate::{
    linalg::Vector3,
    numeric::{floats, Float},
};
use rand::{Rng, SeedableRng};

// Select random number generation engine in use
#[cfg(feature = "f32")]
type Engine = rand_xoshiro::Xoshiro128Plus;
#[cfg(not(feature = "f32"))]
type Engine = rand_xoshiro::Xoshiro256Plus;

/// Odd constant from the golden ratio, used to decorrelate stream seeds
const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Facade over the rand crate exposing the draws needed by the modules
#[derive(Clone, Debug)]
pub struct RandomGenerator {
    rng: Engine,
}
//
impl RandomGenerator {
    /// Spawn a generator from a plain seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Engine::seed_from_u64(seed),
        }
    }

    /// Spawn the generator of a given stream (candidate) of a run
    pub fn for_stream(run_seed: u64, stream: u64) -> Self {
        Self::new(run_seed ^ stream.wrapping_add(1).wrapping_mul(STREAM_MIX))
    }

    /// Generate a random floating-point number in [0, 1)
    pub fn random(&mut self) -> Float {
        self.rng.gen()
    }

    /// Generate an array of random numbers in [0, 1)
    pub fn random_array<const N: usize>(&mut self) -> [Float; N] {
        self.rng.gen()
    }

    /// Generate a random number in (0, 1], safe to take the logarithm of
    pub fn random_open_zero(&mut self) -> Float {
        1. - self.random()
    }

    /// Draw a distance from an exponential distribution of given mean
    pub fn exponential(&mut self, mean: Float) -> Float {
        -mean * self.random_open_zero().ln()
    }

    /// Draw a uniform number in [min, max)
    pub fn uniform(&mut self, min: Float, max: Float) -> Float {
        min + (max - min) * self.random()
    }

    /// Draw an isotropically distributed unit vector
    pub fn random_direction(&mut self) -> Vector3 {
        let [r1, r2] = self.random_array::<2>();
        let cos_theta = 2. * r1 - 1.;
        let sin_theta = (1. - cos_theta * cos_theta).max(0.).sqrt();
        let phi = 2. * floats::consts::PI * r2;
        Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }
}
