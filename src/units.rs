//! SI units and physical constants
//!
//! All quantities in this crate are expressed in SI base units. Multiply by
//! these constants on input and divide by them on output.

#![allow(missing_docs)]

use crate::numeric::Float;

// Length
pub const METER: Float = 1.;
pub const KILOMETER: Float = 1e3;
pub const PARSEC: Float = 3.085_677_581e16;
pub const KPC: Float = 1e3 * PARSEC;
pub const MPC: Float = 1e6 * PARSEC;
pub const GPC: Float = 1e9 * PARSEC;

// Time
pub const SECOND: Float = 1.;

// Charge and energy
pub const ELEMENTARY_CHARGE: Float = 1.602_176_634e-19;
pub const JOULE: Float = 1.;
pub const EV: Float = ELEMENTARY_CHARGE;
pub const KEV: Float = 1e3 * EV;
pub const MEV: Float = 1e6 * EV;
pub const GEV: Float = 1e9 * EV;
pub const TEV: Float = 1e12 * EV;
pub const PEV: Float = 1e15 * EV;
pub const EEV: Float = 1e18 * EV;

// Magnetic field
pub const TESLA: Float = 1.;
pub const GAUSS: Float = 1e-4;
pub const MICRO_GAUSS: Float = 1e-6 * GAUSS;
pub const NANO_GAUSS: Float = 1e-9 * GAUSS;

// Constants
pub const C_LIGHT: Float = 299_792_458. * METER / SECOND;
