//! Sources of primary candidates

use crate::{
    candidate::Candidate,
    error::{ensure_positive, ConfigError},
    linalg::{unit_or_zero, Vector3},
    numeric::Float,
    particle::{ParticleId, ParticleState},
    random::RandomGenerator,
};

/// Generator of primary candidates
pub trait Source: Send + Sync {
    /// Draw one primary candidate
    fn candidate(&self, rng: &mut RandomGenerator) -> Candidate;

    /// Summary of the settings, for logs
    fn description(&self) -> String;
}

/// Point source of mono-energetic particles
///
/// Particles are emitted in a fixed direction, or isotropically if none is
/// given.
///
#[derive(Clone, Debug, PartialEq)]
pub struct PointSource {
    id: ParticleId,
    energy: Float,
    position: Vector3,
    direction: Option<Vector3>,
}
//
impl PointSource {
    /// Source of `id` particles of given energy (J) at `position` (m)
    pub fn new(
        id: ParticleId,
        energy: Float,
        position: Vector3,
        direction: Option<Vector3>,
    ) -> Result<Self, ConfigError> {
        ensure_positive("PointSource", "energy", energy)?;
        if let Some(direction) = direction {
            ensure_positive("PointSource", "direction", direction.norm())?;
        }
        Ok(Self {
            id,
            energy,
            position,
            direction: direction.map(|d| unit_or_zero(&d)),
        })
    }
}

impl Source for PointSource {
    fn candidate(&self, rng: &mut RandomGenerator) -> Candidate {
        let direction = match self.direction {
            Some(direction) => direction,
            None => rng.random_direction(),
        };
        Candidate::new(ParticleState::new(
            self.id,
            self.energy,
            self.position,
            direction,
        ))
    }

    fn description(&self) -> String {
        format!(
            "PointSource: particle {}, energy {} J, {}",
            self.id,
            self.energy,
            if self.direction.is_some() {
                "fixed direction"
            } else {
                "isotropic"
            }
        )
    }
}

/// Draw a number of primaries from a source, reproducibly for a given seed
pub fn primaries(source: &dyn Source, count: usize, seed: u64) -> Vec<Candidate> {
    let mut rng = RandomGenerator::new(seed);
    (0..count).map(|_| source.candidate(&mut rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_direction_source() {
        let source = PointSource::new(
            ParticleId::PROTON,
            1.,
            Vector3::new(1., 0., 0.),
            Some(Vector3::new(0., 2., 0.)),
        )
        .unwrap();
        let candidates = primaries(&source, 3, 5);
        assert_eq!(candidates.len(), 3);
        for c in &candidates {
            assert_eq!(*c.current.direction(), Vector3::new(0., 1., 0.));
            assert_eq!(*c.source().position(), Vector3::new(1., 0., 0.));
        }
    }

    #[test]
    fn isotropic_source_is_reproducible() {
        let source = PointSource::new(ParticleId::PROTON, 1., Vector3::zeros(), None).unwrap();
        let a = primaries(&source, 4, 9);
        let b = primaries(&source, 4, 9);
        for (ca, cb) in a.iter().zip(&b) {
            assert_eq!(ca.current.direction(), cb.current.direction());
            assert!((ca.current.direction().norm() - 1.).abs() < 1e-9);
        }
        assert_ne!(a[0].current.direction(), a[1].current.direction());
    }

    #[test]
    fn invalid_sources() {
        assert!(PointSource::new(ParticleId::PROTON, 0., Vector3::zeros(), None).is_err());
        assert!(PointSource::new(
            ParticleId::PROTON,
            1.,
            Vector3::zeros(),
            Some(Vector3::zeros())
        )
        .is_err());
    }
}
