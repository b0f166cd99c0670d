//! Error types
//!
//! Only construction-time problems are errors. Anything that goes wrong with
//! a single candidate during a run is recorded on that candidate instead, see
//! `candidate::InactiveReason`.

use crate::numeric::Float;
use thiserror::Error;

/// Invalid module or run parameters, detected before any candidate is processed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Integration tolerance outside of (0, 1]
    #[error("{module}: tolerance {value} is not in the (0, 1] range")]
    InvalidTolerance {
        /// Module which was being set up
        module: &'static str,
        /// Rejected value
        value: Float,
    },

    /// Minimum step larger than maximum step
    #[error("{module}: minimum step {min} exceeds maximum step {max}")]
    InvertedStepBounds {
        /// Module which was being set up
        module: &'static str,
        /// Requested minimum step (m)
        min: Float,
        /// Requested maximum step (m)
        max: Float,
    },

    /// A parameter which must be strictly positive is not
    #[error("{module}: {parameter} must be positive, got {value}")]
    NotPositive {
        /// Module which was being set up
        module: &'static str,
        /// Name of the faulty parameter
        parameter: &'static str,
        /// Rejected value
        value: Float,
    },

    /// A parameter outside of its allowed range
    #[error("{module}: {parameter} = {value} is out of range ({expected})")]
    OutOfRange {
        /// Module which was being set up
        module: &'static str,
        /// Name of the faulty parameter
        parameter: &'static str,
        /// Rejected value
        value: Float,
        /// Human-readable description of the allowed range
        expected: &'static str,
    },

    /// A textual parameter with an unknown value
    #[error("{parameter}: unknown value '{value}' (expected {expected})")]
    UnknownValue {
        /// Name of the faulty parameter
        parameter: &'static str,
        /// Rejected value
        value: String,
        /// Accepted values
        expected: &'static str,
    },

    /// A run was requested with nothing to run
    #[error("the module chain is empty")]
    EmptyChain,
}

/// Check that a parameter is strictly positive (NaN is rejected too)
pub(crate) fn ensure_positive(
    module: &'static str,
    parameter: &'static str,
    value: Float,
) -> Result<Float, ConfigError> {
    if value > 0. {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive {
            module,
            parameter,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positivity() {
        assert_eq!(ensure_positive("Test", "x", 2.), Ok(2.));
        assert!(ensure_positive("Test", "x", 0.).is_err());
        assert!(ensure_positive("Test", "x", Float::NAN).is_err());
    }

    #[test]
    fn messages_name_the_module() {
        let err = ConfigError::InvertedStepBounds {
            module: "PropagationCK",
            min: 2.,
            max: 1.,
        };
        assert!(err.to_string().starts_with("PropagationCK"));
    }
}
