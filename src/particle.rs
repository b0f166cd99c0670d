//! This module defines the physical state of a single particle

use crate::{
    linalg::{unit_or_zero, Vector3},
    numeric::Float,
    units::ELEMENTARY_CHARGE,
};
use std::fmt::{self, Display};

/// Particle type, encoded with the PDG Monte Carlo numbering scheme
///
/// Nuclei use the 10-digit `100ZZZAAAI` convention, so that protons may be
/// spelled either as `2212` or as the (A=1, Z=1) nucleus.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(pub i32);
//
impl ParticleId {
    /// Photon
    pub const PHOTON: Self = Self(22);
    /// Electron
    pub const ELECTRON: Self = Self(11);
    /// Positron
    pub const POSITRON: Self = Self(-11);
    /// Electron neutrino
    pub const ELECTRON_NEUTRINO: Self = Self(12);
    /// Muon
    pub const MUON: Self = Self(13);
    /// Proton
    pub const PROTON: Self = Self(2212);
    /// Neutron
    pub const NEUTRON: Self = Self(2112);

    /// Build the identifier of a nucleus with mass number A and charge Z
    pub fn nucleus(a: i32, z: i32) -> Self {
        debug_assert!(a >= z && z >= 0, "Nucleus must have A >= Z >= 0");
        Self(1_000_000_000 + z * 10_000 + a * 10)
    }

    /// Truth that this is a nucleus in the 10-digit convention (or a nucleon)
    pub fn is_nucleus(self) -> bool {
        let code = self.0.abs();
        code >= 1_000_000_000 || code == 2212 || code == 2112
    }

    /// Mass number of a nucleus (0 for anything else)
    pub fn mass_number(self) -> i32 {
        match self.0.abs() {
            2212 | 2112 => 1,
            code if code >= 1_000_000_000 => (code / 10) % 1000,
            _ => 0,
        }
    }

    /// Charge number, in units of the elementary charge
    pub fn charge_number(self) -> i32 {
        let sign = self.0.signum();
        match self.0.abs() {
            2212 => sign,
            2112 => 0,
            code if code >= 1_000_000_000 => sign * ((code / 10_000) % 1000),
            // Charged leptons carry the charge opposite to the code sign
            11 | 13 | 15 => -sign,
            // Charged pions and kaons
            211 | 321 => sign,
            _ => 0,
        }
    }
}

impl Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a particle: type, energy, position and heading
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleState {
    id: ParticleId,
    energy: Float,
    position: Vector3,
    direction: Vector3,
}
//
impl ParticleState {
    /// Build a particle state. The direction is normalized on the way in.
    pub fn new(id: ParticleId, energy: Float, position: Vector3, direction: Vector3) -> Self {
        Self {
            id,
            energy,
            position,
            direction: unit_or_zero(&direction),
        }
    }

    /// Particle type
    pub fn id(&self) -> ParticleId {
        self.id
    }

    /// Change the particle type
    pub fn set_id(&mut self, id: ParticleId) {
        self.id = id;
    }

    /// Total energy (J)
    pub fn energy(&self) -> Float {
        self.energy
    }

    /// Set the total energy (J)
    pub fn set_energy(&mut self, energy: Float) {
        self.energy = energy;
    }

    /// Position (m)
    pub fn position(&self) -> &Vector3 {
        &self.position
    }

    /// Set the position (m)
    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
    }

    /// Unit vector of the momentum
    pub fn direction(&self) -> &Vector3 {
        &self.direction
    }

    /// Set the heading, normalized on the way in
    pub fn set_direction(&mut self, direction: Vector3) {
        self.direction = unit_or_zero(&direction);
    }

    /// Electric charge (C)
    pub fn charge(&self) -> Float {
        (self.id.charge_number() as Float) * ELEMENTARY_CHARGE
    }

    /// Rigidity E/Z (J per unit charge), infinite for neutral particles
    pub fn rigidity(&self) -> Float {
        let z = self.id.charge_number();
        if z == 0 {
            Float::INFINITY
        } else {
            (self.energy / (z as Float)).abs()
        }
    }
}
