//! Some shared linear algebra concepts

use crate::numeric::{floats, Float};
use nalgebra::SVector;

/// Spatial dimension
pub const SPACE_DIM: usize = 3;

/// 3-vectors of real numbers, used for positions, directions and fields
pub type Vector3 = SVector<Float, SPACE_DIM>;

/// Normalize a vector, leaving (nearly) null vectors untouched
///
/// Directions are renormalized after every integration step, and a null vector
/// there must not turn into NaNs.
///
pub fn unit_or_zero(v: &Vector3) -> Vector3 {
    let norm = v.norm();
    if norm <= floats::MIN_POSITIVE {
        *v
    } else {
        v / norm
    }
}

/// Component-wise floor of a vector
pub fn floor(v: &Vector3) -> Vector3 {
    v.map(|x| x.floor())
}
