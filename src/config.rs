//! Mechanism for loading and sharing the propagation configuration

use crate::{modules::WeightPolicy, numeric::Float, particle::ParticleId, Result};

use eyre::{ensure, eyre, Report, WrapErr};

use std::{fs::File, io::Read, str::FromStr};

/// Propagation run configuration
///
/// Energies are given in EeV, lengths in Mpc (kpc for the minimum step) and
/// the magnetic field in nG, as is customary for extragalactic propagation.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    /// Number of primary candidates to be propagated
    pub num_primaries: usize,

    /// Seed of the run, from which all random streams are derived
    pub seed: u64,

    /// Maximum number of passes over the population
    pub max_passes: usize,

    /// Particle type of the primaries (PDG code)
    pub particle: ParticleId,

    /// Energy of the primaries (EeV)
    pub energy: Float,

    /// Strength of the uniform magnetic field, along z (nG)
    pub field: Float,

    /// Target relative error of the integrator
    pub tolerance: Float,

    /// Minimum integration step (kpc)
    pub min_step: Float,

    /// Maximum integration step (Mpc)
    pub max_step: Float,

    /// Mean free path of the stochastic interaction (Mpc)
    pub interaction_length: Float,

    /// Fraction of the energy given to the secondary in an interaction
    pub emission_fraction: Float,

    /// How weights are shared with secondaries
    pub weight_policy: WeightPolicy,

    /// Continuous energy loss length (Mpc)
    pub loss_length: Float,

    /// Energy below which candidates are dropped (EeV)
    pub min_energy: Float,

    /// Radius of the simulation volume (Mpc)
    pub boundary_radius: Float,

    /// Radius of the observer sphere around the source (Mpc)
    pub observer_radius: Float,

    /// Whether detected candidates stop being propagated
    pub observer_inactive: bool,
}
//
impl Configuration {
    /// Load the configuration from a file, check it, and print it out
    pub fn load(file_name: &str) -> Result<Self> {
        // Read out the configuration file or die trying.
        let config_str = {
            let mut config_file = File::open(file_name)
                .wrap_err_with(|| format!("Could not open configuration file {file_name}"))?;
            let mut buffer = String::new();
            config_file.read_to_string(&mut buffer)?;
            buffer
        };
        let config = config_str.parse::<Self>()?;

        // Display it, this eases comparisons between runs
        config.print();
        Ok(config)
    }

    /// Display the configuration
    pub fn print(&self) {
        println!("NPRIMARIES     : {}", self.num_primaries);
        println!("SEED           : {}", self.seed);
        println!("MAXPASSES      : {}", self.max_passes);
        println!("PARTICLE       : {}", self.particle);
        println!("ENERGY   (EeV) : {}", self.energy);
        println!("FIELD     (nG) : {}", self.field);
        println!("TOLERANCE      : {}", self.tolerance);
        println!("MINSTEP  (kpc) : {}", self.min_step);
        println!("MAXSTEP  (Mpc) : {}", self.max_step);
        println!("MFP      (Mpc) : {}", self.interaction_length);
        println!("EMISSION       : {}", self.emission_fraction);
        println!("WEIGHTS        : {:?}", self.weight_policy);
        println!("LOSSLEN  (Mpc) : {}", self.loss_length);
        println!("EMIN     (EeV) : {}", self.min_energy);
        println!("RBOUND   (Mpc) : {}", self.boundary_radius);
        println!("ROBS     (Mpc) : {}", self.observer_radius);
        println!("OBSINACTIVE    : {}", self.observer_inactive);
    }
}

impl FromStr for Configuration {
    type Err = Report;

    /// Parse and check a configuration
    fn from_str(config_str: &str) -> Result<Self> {
        // We will iterate over the configuration items. In our simple config
        // file format, these should be the first non-whitespace chunk of text
        // on each line. Blank lines and comment lines are ignored.
        let mut config_iter = config_str
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|item| !item.starts_with('#'));

        // This closure fetches the next configuration item, tagging it with
        // the name of the configuration field which it is supposed to fill to
        // ease error reporting, and handling unexpected end-of-file too.
        let mut next_item = |name: &'static str| -> Result<ConfigItem> {
            config_iter
                .next()
                .map(|data| ConfigItem::new(name, data))
                .ok_or_else(|| eyre!("Missing configuration of {}", name))
        };

        // Decode the configuration items into concrete values
        let config = Configuration {
            num_primaries: next_item("num_primaries")?.parse::<usize>()?,
            seed: next_item("seed")?.parse::<u64>()?,
            max_passes: next_item("max_passes")?.parse::<usize>()?,
            particle: ParticleId(next_item("particle")?.parse::<i32>()?),
            energy: next_item("energy")?.parse::<Float>()?,
            field: next_item("field")?.parse::<Float>()?,
            tolerance: next_item("tolerance")?.parse::<Float>()?,
            min_step: next_item("min_step")?.parse::<Float>()?,
            max_step: next_item("max_step")?.parse::<Float>()?,
            interaction_length: next_item("interaction_length")?.parse::<Float>()?,
            emission_fraction: next_item("emission_fraction")?.parse::<Float>()?,
            weight_policy: next_item("weight_policy")?.parse::<WeightPolicy>()?,
            loss_length: next_item("loss_length")?.parse::<Float>()?,
            min_energy: next_item("min_energy")?.parse::<Float>()?,
            boundary_radius: next_item("boundary_radius")?.parse::<Float>()?,
            observer_radius: next_item("observer_radius")?.parse::<Float>()?,
            observer_inactive: next_item("observer_inactive")?.parse_bool()?,
        };

        // A sensible simulation must propagate at least one candidate
        ensure!(
            config.num_primaries > 0,
            "Please propagate at least one candidate"
        );
        ensure!(config.max_passes > 0, "Please allow at least one pass");

        // The observer must be inside of the simulation volume, otherwise
        // nothing could ever be detected
        ensure!(
            config.observer_radius < config.boundary_radius,
            "The observer sphere ({} Mpc) must fit in the simulation volume ({} Mpc)",
            config.observer_radius,
            config.boundary_radius
        );
        ensure!(
            config.min_energy < config.energy,
            "Primaries must start above the minimum energy"
        );

        // Module parameters are checked when the module chain is built
        Ok(config)
    }
}

/// A value from the configuration file, tagged with the struct field which it
/// is supposed to map for error reporting purposes.
struct ConfigItem<'data> {
    name: &'static str,
    data: &'data str,
}
//
impl<'data> ConfigItem<'data> {
    /// Build a config item from a struct field tag and raw iterator data
    fn new(name: &'static str, data: &'data str) -> Self {
        Self { name, data }
    }

    /// Parse this data using Rust's standard parsing logic
    fn parse<T: FromStr>(self) -> Result<T>
    where
        <T as FromStr>::Err: ::std::error::Error + Send + Sync + 'static,
    {
        self.data
            .parse::<T>()
            .wrap_err_with(|| format!("Could not parse configuration of {}", self.name))
    }

    /// Parse this data as a boolean, also accepting Fortran's bool syntax
    fn parse_bool(self) -> Result<bool> {
        match self.data.to_lowercase().as_str() {
            ".true." | "yes" => Ok(true),
            ".false." | "no" => Ok(false),
            _ => self.parse::<bool>(),
        }
    }
}
