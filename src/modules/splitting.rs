//! Candidate splitting, for variance reduction at high energies

use crate::{
    candidate::Candidate,
    error::{ensure_positive, ConfigError},
    module::Module,
    numeric::Float,
    units::EEV,
};

/// Split candidates into equally weighted copies when they gain energy
///
/// Each time the energy of a candidate crosses an energy bin edge upwards,
/// its weight is divided by `n_split` and `n_split - 1` copies are spawned,
/// so that the total weight is conserved. Candidates whose weight is already
/// at or below `min_weight` are not split any further.
///
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateSplitting {
    n_split: usize,
    energy_bins: Vec<Float>,
    min_weight: Float,
}
//
impl CandidateSplitting {
    /// Split in `n_split` copies at `n_bins` edges between `e_min` and `e_max`
    pub fn new(
        n_split: usize,
        e_min: Float,
        e_max: Float,
        n_bins: usize,
        min_weight: Float,
        log: bool,
    ) -> Result<Self, ConfigError> {
        ensure_positive("CandidateSplitting", "e_min", e_min)?;
        if e_min > e_max {
            return Err(ConfigError::OutOfRange {
                module: "CandidateSplitting",
                parameter: "e_max",
                value: e_max,
                expected: "e_max >= e_min",
            });
        }
        let energy_bins = (0..n_bins)
            .map(|i| {
                let i = i as Float;
                if log {
                    let span = (n_bins as Float - 1.).max(1.);
                    e_min * (e_max / e_min).powf(i / span)
                } else {
                    e_min + i * (e_max - e_min) / (n_bins as Float)
                }
            })
            .collect();
        Ok(Self {
            n_split,
            energy_bins,
            min_weight,
        })
    }

    /// Splitting adapted to a power-law spectrum E^spectral_index
    ///
    /// Candidates are split in two at energies where the expected number of
    /// particles halves, so that weights stay comparable along the spectrum.
    ///
    pub fn for_spectrum(
        spectral_index: Float,
        e_min: Float,
        n_bins: usize,
    ) -> Result<Self, ConfigError> {
        if !(spectral_index < 0.) {
            return Err(ConfigError::OutOfRange {
                module: "CandidateSplitting",
                parameter: "spectral_index",
                value: spectral_index,
                expected: "spectral_index < 0",
            });
        }
        ensure_positive("CandidateSplitting", "e_min", e_min)?;
        let ratio = (0.5 as Float).powf(1. / (spectral_index + 1.));
        let energy_bins = (1..=n_bins)
            .map(|i| e_min * ratio.powi(i as i32))
            .collect();
        Ok(Self {
            n_split: 2,
            energy_bins,
            min_weight: (0.5 as Float).powi(n_bins as i32),
        })
    }

    /// Energy bin edges (J), in increasing order
    pub fn energy_bins(&self) -> &[Float] {
        &self.energy_bins
    }

    /// Split the candidate once, for one crossed bin edge
    fn split(&self, candidate: &mut Candidate) {
        candidate.update_weight(1. / self.n_split as Float);
        let energy = candidate.current.energy();
        for _ in 1..self.n_split {
            let copy = candidate.add_clone();
            // The copy must not see the same crossing again
            copy.previous.set_energy(energy);
        }
    }
}

impl Module for CandidateSplitting {
    fn process(&self, candidate: &mut Candidate) {
        if !candidate.is_active() || self.n_split < 2 || candidate.weight() <= self.min_weight
        {
            return;
        }
        let energy = candidate.current.energy();
        let previous_energy = candidate.previous.energy();

        // Find the first edge above the previous energy, then count crossings
        let Some(first) = self.energy_bins.iter().position(|&edge| previous_energy < edge) else {
            return;
        };
        let crossed = self.energy_bins[first..]
            .iter()
            .take_while(|&&edge| energy >= edge)
            .count();
        for _ in 0..crossed {
            self.split(candidate);
        }
    }

    fn description(&self) -> String {
        format!(
            "CandidateSplitting: {} copies at {} energy edges from {} EeV, minimal weight {}",
            self.n_split,
            self.energy_bins.len(),
            self.energy_bins.first().copied().unwrap_or(0.) / EEV,
            self.min_weight
        )
    }
}
