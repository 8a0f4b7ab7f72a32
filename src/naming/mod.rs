// src/naming/mod.rs

//! File-name conventions for raw run outputs, compiled tables and
//! dark-brem event libraries.
//!
//! Raw files follow
//! `<lepton>_<material>_mA_<mass>_E_<energy>_{unscaled|scaledFrom_<from>}_run_<run>.csv`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

/// Errors raised while decoding a conventional file name.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NameError {
    /// The name does not have the expected token layout at all.
    #[error("file name {name:?} does not follow <lepton>_<material>_mA_<mass>_E_<energy>_{{unscaled|scaledFrom_<E>}}_run_<n>.csv")]
    Pattern { name: String },

    /// A token was found but could not be parsed.
    #[error("invalid {field} {value:?} in {name:?}")]
    Field {
        field: &'static str,
        value: String,
        name: String,
    },

    /// A required marker token is missing.
    #[error("no {field} token in {name:?}")]
    Missing { field: &'static str, name: String },
}

static RUN_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<lepton>[A-Za-z]+)_(?P<material>[A-Za-z0-9]+)_mA_(?P<mass>[^_]+)_E_(?P<energy>[^_]+)_(?:unscaled|scaledFrom_(?P<from>[^_]+))_run_(?P<run>[^_.]+)\.csv$",
    )
    .expect("static run-file pattern")
});

/// Metadata carried by a raw run file name.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub lepton: String,
    pub material: String,
    /// Mediator mass in GeV.
    pub mass: f64,
    /// Incident lepton energy in GeV.
    pub incident_energy: f64,
    pub scaled: bool,
    /// Equal to `incident_energy` for unscaled runs.
    pub scaled_from_energy: f64,
    pub run_number: u32,
}

impl RunParams {
    pub fn unscaled(
        lepton: &str,
        material: &str,
        mass: f64,
        energy: f64,
        run_number: u32,
    ) -> Self {
        Self {
            lepton: lepton.to_string(),
            material: material.to_string(),
            mass,
            incident_energy: energy,
            scaled: false,
            scaled_from_energy: energy,
            run_number,
        }
    }

    pub fn scaled(
        lepton: &str,
        material: &str,
        mass: f64,
        energy: f64,
        from_energy: f64,
        run_number: u32,
    ) -> Self {
        Self {
            lepton: lepton.to_string(),
            material: material.to_string(),
            mass,
            incident_energy: energy,
            scaled: true,
            scaled_from_energy: from_energy,
            run_number,
        }
    }

    /// Decode the file-name component of `path`; any directory part is ignored.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NameError> {
        let name = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::parse(name)
    }

    pub fn parse(name: &str) -> Result<Self, NameError> {
        let caps = RUN_FILE_RE.captures(name).ok_or_else(|| NameError::Pattern {
            name: name.to_string(),
        })?;

        let float = |field: &'static str, group: &str| -> Result<f64, NameError> {
            let raw = &caps[group];
            raw.parse::<f64>().map_err(|_| NameError::Field {
                field,
                value: raw.to_string(),
                name: name.to_string(),
            })
        };

        let mass = float("mA", "mass")?;
        let incident_energy = float("incident energy", "energy")?;
        let scaled_from_energy = match caps.name("from") {
            Some(_) => Some(float("scaled-from energy", "from")?),
            None => None,
        };
        let run_number = caps["run"].parse::<u32>().map_err(|_| NameError::Field {
            field: "run number",
            value: caps["run"].to_string(),
            name: name.to_string(),
        })?;

        Ok(Self {
            lepton: caps["lepton"].to_string(),
            material: caps["material"].to_string(),
            mass,
            incident_energy,
            scaled: scaled_from_energy.is_some(),
            scaled_from_energy: scaled_from_energy.unwrap_or(incident_energy),
            run_number,
        })
    }

    /// Stem shared by the raw CSV and its batch script, without extension.
    pub fn stem(&self) -> String {
        let scaling = if self.scaled {
            format!("scaledFrom_{}", float_label(self.scaled_from_energy))
        } else {
            "unscaled".to_string()
        };
        format!(
            "{}_{}_mA_{}_E_{}_{}_run_{}",
            self.lepton,
            self.material,
            float_label(self.mass),
            float_label(self.incident_energy),
            scaling,
            self.run_number
        )
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.stem())
    }
}

/// Print a float the way the campaign names files: integral values keep a
/// trailing `.0`, everything else uses the shortest round-trip form.
pub fn float_label(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Glob pattern matching every raw file of one (material, mass) partition.
pub fn raw_glob(lepton: &str, material: &str, mass: f64, scaled: bool) -> String {
    let scaling = if scaled { "scaledFrom_*" } else { "unscaled" };
    format!(
        "{}_{}_mA_{}_E_*_{}_run_*.csv",
        lepton,
        material,
        float_label(mass),
        scaling
    )
}

/// `dblib_{scaled|unscaled}_<lepton>_<material>_mA_<mass>.<ext>`
pub fn compiled_table_name(
    lepton: &str,
    material: &str,
    mass: f64,
    scaled: bool,
    extension: &str,
) -> String {
    format!(
        "dblib_{}_{}_{}_mA_{}.{}",
        if scaled { "scaled" } else { "unscaled" },
        lepton,
        material,
        float_label(mass),
        extension
    )
}

/// Parameters encoded in a dark-brem event library name such as
/// `all_mA_0.005_run_4000.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryParams {
    /// Mediator mass in GeV.
    pub mass: f64,
    pub run_number: u32,
}

impl LibraryParams {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NameError> {
        let stem = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let toks: Vec<&str> = stem.split('_').collect();

        let after = |marker: &'static str| -> Result<&str, NameError> {
            toks.iter()
                .position(|t| *t == marker)
                .and_then(|i| toks.get(i + 1))
                .copied()
                .ok_or_else(|| NameError::Missing {
                    field: marker,
                    name: stem.to_string(),
                })
        };

        let mass_tok = after("mA")?;
        let mass = mass_tok.parse::<f64>().map_err(|_| NameError::Field {
            field: "mA",
            value: mass_tok.to_string(),
            name: stem.to_string(),
        })?;
        let run_tok = after("run")?;
        let run_number = run_tok.parse::<u32>().map_err(|_| NameError::Field {
            field: "run number",
            value: run_tok.to_string(),
            name: stem.to_string(),
        })?;

        Ok(Self { mass, run_number })
    }

    /// Mediator mass in MeV, truncated the way the simulation config names
    /// its output file.
    pub fn mass_mev(&self) -> u32 {
        (self.mass * 1000.0) as u32
    }
}

/// Stem of the ROOT file produced by a signal-sample simulation run.
pub fn signal_output_stem(n_events: u64, mass_mev: u32, run_number: u32) -> String {
    format!(
        "category_signal_Nevents_{}_MaxTries_10k_mAMeV_{:04}_epsilon_0.01_minApE_4000_minPrimEatEcal_7000_run_{:04}",
        n_events, mass_mev, run_number
    )
}
