// src/config/mod.rs

//! Parameter sweep definition shared by every pipeline stage.
//!
//! All defaults reproduce the campaign the pipeline was first run for; a YAML
//! file only needs to list the keys it overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, path::PathBuf};
use tracing::debug;

use crate::derive::DeltaPhi;
use crate::hist::{HistOptions, VarSpec};

/// Target materials the dark-brem libraries are generated for.
pub const KNOWN_MATERIALS: &[&str] = &["copper", "lead", "oxygen", "silicon", "tungsten"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub lepton: String,
    pub materials: Vec<String>,
    /// Mediator masses in GeV.
    pub masses: Vec<f64>,
    pub run_number: u32,
    /// Directory holding raw per-run CSVs; scaled runs live in `<dblib_dir>/scaled`.
    pub dblib_dir: PathBuf,
    /// Directory compiled tables are written to and loaded from.
    pub table_dir: PathBuf,
    pub slurm: SlurmConfig,
    pub unscaled: UnscaledLibraryConfig,
    pub scaling: ScalingConfig,
    pub hists: HistConfig,
    pub signal: SignalConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            lepton: "electron".into(),
            materials: KNOWN_MATERIALS.iter().map(|m| m.to_string()).collect(),
            masses: vec![0.005, 0.01, 0.05, 0.1],
            run_number: 4000,
            dblib_dir: PathBuf::from("dblib"),
            table_dir: PathBuf::from("."),
            slurm: SlurmConfig::default(),
            unscaled: UnscaledLibraryConfig::default(),
            scaling: ScalingConfig::default(),
            hists: HistConfig::default(),
            signal: SignalConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Read a YAML campaign file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let cfg: Self = serde_yaml::from_reader(f)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        debug!(path = %path.display(), materials = cfg.materials.len(), masses = cfg.masses.len(), "loaded campaign config");
        Ok(cfg)
    }

    /// `load` when a path is given, the built-in campaign otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lepton.is_empty() || self.lepton.contains('_') {
            bail!("lepton {:?} must be a single non-empty token", self.lepton);
        }
        if self.materials.is_empty() {
            bail!("no materials configured");
        }
        for m in &self.materials {
            if !KNOWN_MATERIALS.contains(&m.as_str()) {
                bail!(
                    "unknown material {:?}; expected one of {:?}",
                    m,
                    KNOWN_MATERIALS
                );
            }
        }
        if self.masses.is_empty() {
            bail!("no masses configured");
        }
        if let Some(m) = self.masses.iter().find(|m| !(**m > 0.0)) {
            bail!("mass {} must be positive", m);
        }
        for pair in &self.hists.energy_pairs {
            if !(pair.base > 0.0) || pair.comparisons.iter().any(|e| !(*e > 0.0)) {
                bail!("energy pair with base {} has a non-positive energy", pair.base);
            }
        }
        for pair in &self.scaling.pairs {
            if !(pair.target > 0.0) || pair.sources.iter().any(|e| !(*e > 0.0)) {
                bail!(
                    "scaling pair with target {} has a non-positive energy",
                    pair.target
                );
            }
        }
        Ok(())
    }

    pub fn scaled_dir(&self) -> PathBuf {
        self.dblib_dir.join("scaled")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlurmConfig {
    pub partition: String,
    pub account: String,
    /// Scheduler submission command, invoked as `<submit_command> <script>`.
    pub submit_command: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            partition: "standard".into(),
            account: "ldmxuva".into(),
            submit_command: "sbatch".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnscaledLibraryConfig {
    pub run_script: PathBuf,
    /// Incident energies (GeV) to generate.
    pub energies: Vec<f64>,
    pub events_per_point: u64,
    pub output_dir: PathBuf,
}

impl Default for UnscaledLibraryConfig {
    fn default() -> Self {
        Self {
            run_script: PathBuf::from("run_db_gen_then_extract.sh"),
            energies: vec![1.0, 1.1, 1.2, 1.5],
            events_per_point: 100_000,
            output_dir: PathBuf::from("dblib"),
        }
    }
}

/// One target energy and the energies it is rescaled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPair {
    pub target: f64,
    pub sources: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub run_script: PathBuf,
    pub continue_on_fail: bool,
    pub pairs: Vec<ScalingPair>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        let pair = |target: f64, sources: &[f64]| ScalingPair {
            target,
            sources: sources.to_vec(),
        };
        Self {
            run_script: PathBuf::from("scripts/run_g4db_scale.sh"),
            continue_on_fail: false,
            pairs: vec![
                pair(1.0, &[1.1, 1.2, 1.5, 2.0, 3.0, 4.0]),
                pair(2.0, &[2.2, 2.4, 2.5, 2.6, 2.8, 3.0, 4.0]),
                pair(3.0, &[3.3, 3.6, 3.9, 4.0, 5.0, 6.0]),
                pair(4.0, &[4.2, 4.4, 4.8, 6.0, 7.0, 8.0]),
                pair(5.0, &[5.5, 6.0, 7.0, 8.0]),
                pair(
                    6.0,
                    &[6.06, 6.12, 6.18, 6.24, 6.3, 6.6, 6.9, 7.0, 7.5, 8.0],
                ),
                pair(7.0, &[7.5, 8.0]),
            ],
        }
    }
}

/// Base energy and the energies whose samples are compared against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPair {
    pub base: f64,
    pub comparisons: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistConfig {
    pub variables: Vec<VarSpec>,
    pub energy_pairs: Vec<EnergyPair>,
    pub delta_phi: DeltaPhi,
    pub output: PathBuf,
}

impl Default for HistConfig {
    fn default() -> Self {
        use std::f64::consts::PI;

        let var = |name: &str, max_x: f64, cumulative: bool| VarSpec {
            name: name.to_string(),
            options: HistOptions {
                min_x: Some(0.0),
                max_x: Some(max_x),
                cumulative,
                ..HistOptions::default()
            },
        };
        let pair = |base: f64, comparisons: &[f64]| EnergyPair {
            base,
            comparisons: comparisons.to_vec(),
        };

        Self {
            variables: vec![
                var("recoil_energy_frac", 1.0, true),
                var("ap_energy_frac", 1.0, true),
                var("recoil_theta", PI, false),
                var("ap_theta", PI, false),
                var("delta_phi", 2.0 * PI, false),
                var("angle_recoil_ap", PI, false),
            ],
            energy_pairs: vec![
                pair(1.0, &[1.1, 1.2, 1.5, 2.0, 3.0, 4.0]),
                pair(2.0, &[2.2, 2.4, 2.5, 2.6, 2.8, 3.0, 4.0]),
                pair(4.0, &[4.2, 4.4, 4.8, 6.0, 7.0, 8.0]),
                pair(
                    6.0,
                    &[6.06, 6.12, 6.18, 6.24, 6.3, 6.6, 6.9, 7.0, 7.5, 8.0],
                ),
            ],
            delta_phi: DeltaPhi::Absolute,
            output: PathBuf::from("scaling_hists.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Simulation repository checkout. Use an absolute path when jobs run
    /// from a different working directory.
    pub repo_dir: PathBuf,
    /// Launcher script, relative to `repo_dir`.
    pub run_script: PathBuf,
    /// Simulation config script, relative to `repo_dir`.
    pub config_script: PathBuf,
    /// Dark-brem event library, relative to `repo_dir`.
    pub library: PathBuf,
    pub n_events: u64,
    pub output_dir: PathBuf,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("ldmx-sim-visdecay"),
            run_script: PathBuf::from("scripts/setup_ldmx_and_fire.sh"),
            config_script: PathBuf::from("scripts/test_config.py"),
            library: PathBuf::from("all_mA_0.005_run_4000.csv"),
            n_events: 1000,
            output_dir: PathBuf::from("eat_vis_signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_campaign_is_valid() {
        let cfg = CampaignConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.materials.len(), 5);
        assert_eq!(cfg.hists.variables.len(), 6);
        assert_eq!(cfg.scaling.pairs.len(), 7);
        assert_eq!(cfg.scaled_dir(), PathBuf::from("dblib/scaled"));
    }

    #[test]
    fn yaml_overrides_only_listed_keys() -> Result<()> {
        let mut f = NamedTempFile::new()?;
        writeln!(
            f,
            r#"
materials: [lead]
masses: [0.01]
dblib_dir: /tmp/dblib
hists:
  variables:
    - name: recoil_pt
      log_x: true
  energy_pairs:
    - base: 2.0
      comparisons: [3.0]
scaling:
  continue_on_fail: true
"#
        )?;

        let cfg = CampaignConfig::load(f.path())?;
        assert_eq!(cfg.materials, vec!["lead".to_string()]);
        assert_eq!(cfg.masses, vec![0.01]);
        assert_eq!(cfg.lepton, "electron");
        assert_eq!(cfg.hists.variables[0].name, "recoil_pt");
        assert!(cfg.hists.variables[0].options.log_x);
        assert!(cfg.hists.variables[0].options.min_x.is_none());
        assert_eq!(cfg.hists.delta_phi, DeltaPhi::Absolute);
        assert!(cfg.scaling.continue_on_fail);
        assert_eq!(cfg.scaling.pairs.len(), 7);
        Ok(())
    }

    #[test]
    fn signal_repo_dir_accepts_relative_and_absolute() -> Result<()> {
        assert!(SignalConfig::default().repo_dir.is_relative());

        let mut f = NamedTempFile::new()?;
        writeln!(f, "signal:\n  repo_dir: /home/sim/ldmx-sim-visdecay")?;
        let cfg = CampaignConfig::load(f.path())?;
        assert!(cfg.signal.repo_dir.is_absolute());
        assert_eq!(cfg.signal.n_events, 1000);
        Ok(())
    }

    #[test]
    fn rejects_unknown_material_and_bad_mass() {
        let mut cfg = CampaignConfig::default();
        cfg.materials.push("unobtainium".into());
        assert!(cfg.validate().is_err());

        let mut cfg = CampaignConfig::default();
        cfg.masses = vec![0.01, -1.0];
        assert!(cfg.validate().unwrap_err().to_string().contains("-1"));
    }
}
