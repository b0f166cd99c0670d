//! Basic numerical concepts used throughout the program

// Floating-point precision is configured here
/// Floating-point type used throughout the crate
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(feature = "f32")]
pub use std::f32 as floats;
/// Floating-point type used throughout the crate
#[cfg(not(feature = "f32"))]
pub type Float = f64;
#[cfg(not(feature = "f32"))]
pub use std::f64 as floats;

/// Truth that two quantities agree up to a relative tolerance
///
/// Quantities which are both (nearly) zero always agree, since there is no
/// meaningful scale to normalize their difference by.
///
pub fn relative_eq(a: Float, b: Float, rel_tol: Float) -> bool {
    let scale = a.abs().max(b.abs());
    if scale <= floats::MIN_POSITIVE {
        return true;
    }
    (a - b).abs() <= rel_tol * scale
}

/// Clamp a value into the `[min, max]` interval
///
/// Unlike `Float::clamp`, this does not panic if the interval is inverted,
/// the lower bound wins in that case.
///
pub fn clip(x: Float, min: Float, max: Float) -> Float {
    x.min(max).max(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_comparison() {
        assert!(relative_eq(1.0, 1.0 + 1e-7, 1e-6));
        assert!(!relative_eq(1.0, 1.1, 1e-3));
        assert!(relative_eq(0.0, 0.0, 1e-12));
    }

    #[test]
    fn clipping() {
        assert_eq!(clip(5.0, 1.0, 3.0), 3.0);
        assert_eq!(clip(-5.0, 1.0, 3.0), 1.0);
        assert_eq!(clip(2.0, 1.0, 3.0), 2.0);
    }
}
