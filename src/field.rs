//! Interfaces to the external field models
//!
//! Concrete field models (turbulent grids, galactic models...) live outside of
//! this crate. Propagation modules only need to query the field value at a
//! position, which must be deterministic for a given position.

use crate::{error::ConfigError, linalg::Vector3, numeric::Float};

/// Magnetic field model
pub trait MagneticField: Send + Sync {
    /// Field vector at a given position (T)
    fn field_at(&self, position: &Vector3) -> Vector3;

    /// Check the model before a run, a malformed model is a fatal error
    fn check(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Spatially uniform magnetic field
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformMagneticField(pub Vector3);

impl MagneticField for UniformMagneticField {
    fn field_at(&self, _position: &Vector3) -> Vector3 {
        self.0
    }

    fn check(&self) -> Result<(), ConfigError> {
        match self.0.iter().find(|b| !b.is_finite()) {
            Some(&value) => Err(ConfigError::OutOfRange {
                module: "UniformMagneticField",
                parameter: "field",
                value,
                expected: "finite",
            }),
            None => Ok(()),
        }
    }
}

/// Uniform field confined to a sphere, null outside
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphericalFieldRegion {
    center: Vector3,
    radius: Float,
    field: Vector3,
}
//
impl SphericalFieldRegion {
    /// Field `field` inside the sphere of given center and radius, zero outside
    pub fn new(center: Vector3, radius: Float, field: Vector3) -> Self {
        Self {
            center,
            radius,
            field,
        }
    }
}

impl MagneticField for SphericalFieldRegion {
    fn field_at(&self, position: &Vector3) -> Vector3 {
        if (position - self.center).norm() <= self.radius {
            self.field
        } else {
            Vector3::zeros()
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        crate::error::ensure_positive("SphericalFieldRegion", "radius", self.radius)?;
        UniformMagneticField(self.field).check()
    }
}
