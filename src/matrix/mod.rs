// src/matrix/mod.rs

//! Unscaled-vs-scaled histogram comparisons over the whole campaign matrix
//! of material × mass × variable × base energy.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{info, instrument};

use crate::config::{CampaignConfig, EnergyPair};
use crate::derive::{column_f64, with_derived_columns};
use crate::hist::{compare, HistOptions, VarSpec};
use crate::naming::float_label;
use crate::table::{
    load_table,
    schema::{INCIDENT_ENERGY, SCALED_FROM_E},
    table_path, TableFormat,
};

/// Energies read back from tables are compared with this absolute tolerance (GeV).
pub const ENERGY_TOLERANCE: f64 = 1e-9;

fn same_energy(a: f64, b: f64) -> bool {
    (a - b).abs() <= ENERGY_TOLERANCE
}

/// Histograms for one (material, mass, variable, base energy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingComparison {
    pub base: Vec<f64>,
    pub edges: Vec<f64>,
    pub comparison_energies: Vec<f64>,
    /// Unscaled samples generated at each comparison energy.
    pub unscaled: Vec<Vec<f64>>,
    /// Samples scaled from each comparison energy down to the base energy.
    pub scaled: Vec<Vec<f64>>,
}

/// material → mass → variable → base energy → comparison; keys are the
/// labels used in file names. Maps iterate in label order, so numeric keys
/// such as "10.0" sort before "2.0"; parse the label to order by value.
pub type HistMatrix =
    BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, ScalingComparison>>>>;

/// A loaded table with its derived columns and energy columns pulled out.
pub struct Partition {
    batch: RecordBatch,
    incident: Vec<f64>,
    scaled_from: Vec<f64>,
}

impl Partition {
    pub fn new(batch: RecordBatch, cfg: &CampaignConfig) -> Result<Self> {
        let batch = with_derived_columns(&batch, cfg.hists.delta_phi)?;
        let incident = column_f64(&batch, INCIDENT_ENERGY)?;
        let scaled_from = column_f64(&batch, SCALED_FROM_E)?;
        Ok(Self {
            batch,
            incident,
            scaled_from,
        })
    }

    pub fn load(path: &Path, cfg: &CampaignConfig) -> Result<Self> {
        let batch = load_table(path)?;
        Self::new(batch, cfg).with_context(|| format!("preparing {}", path.display()))
    }

    fn values(&self, var: &str) -> Result<Vec<f64>> {
        column_f64(&self.batch, var)
    }

    /// Rows generated at `energy`.
    fn at_energy(&self, values: &[f64], energy: f64) -> Vec<f64> {
        values
            .iter()
            .zip(&self.incident)
            .filter(|(_, e)| same_energy(**e, energy))
            .map(|(v, _)| *v)
            .collect()
    }

    /// Rows scaled to `target` from `source`.
    fn scaled_between(&self, values: &[f64], target: f64, source: f64) -> Vec<f64> {
        values
            .iter()
            .zip(self.incident.iter().zip(&self.scaled_from))
            .filter(|(_, (e, f))| same_energy(**e, target) && same_energy(**f, source))
            .map(|(v, _)| *v)
            .collect()
    }
}

/// Compare the unscaled base sample against unscaled and scaled samples of
/// every comparison energy, all on the edges of the unscaled comparison.
pub fn compare_energies(
    unscaled: &Partition,
    scaled: &Partition,
    var: &VarSpec,
    pair: &EnergyPair,
) -> Result<ScalingComparison> {
    let unscaled_values = unscaled.values(&var.name)?;
    let scaled_values = scaled.values(&var.name)?;

    let base = unscaled.at_energy(&unscaled_values, pair.base);
    let unscaled_samples: Vec<Vec<f64>> = pair
        .comparisons
        .iter()
        .map(|e| unscaled.at_energy(&unscaled_values, *e))
        .collect();
    let from_unscaled = compare(&base, &unscaled_samples, &var.options)
        .with_context(|| format!("{} at base energy {}", var.name, pair.base))?;

    let scaled_samples: Vec<Vec<f64>> = pair
        .comparisons
        .iter()
        .map(|e| scaled.scaled_between(&scaled_values, pair.base, *e))
        .collect();
    let forced = HistOptions {
        bins: Some(from_unscaled.edges.clone()),
        ..var.options.clone()
    };
    let from_scaled = compare(&base, &scaled_samples, &forced)?;

    Ok(ScalingComparison {
        base: from_unscaled.base,
        edges: from_unscaled.edges,
        comparison_energies: pair.comparisons.clone(),
        unscaled: from_unscaled.comparisons,
        scaled: from_scaled.comparisons,
    })
}

/// Load every compiled (material, mass) pair and build all comparisons.
#[instrument(level = "info", skip(cfg))]
pub fn build_matrix(cfg: &CampaignConfig, format: TableFormat) -> Result<HistMatrix> {
    let mut matrix = HistMatrix::new();

    for material in &cfg.materials {
        let by_mass = matrix.entry(material.clone()).or_default();
        for &mass in &cfg.masses {
            let unscaled = Partition::load(&table_path(cfg, material, mass, false, format), cfg)?;
            let scaled = Partition::load(&table_path(cfg, material, mass, true, format), cfg)?;
            let by_var = by_mass.entry(float_label(mass)).or_default();

            for var in &cfg.hists.variables {
                let by_energy = by_var.entry(var.name.clone()).or_default();
                for pair in &cfg.hists.energy_pairs {
                    let cmp = compare_energies(&unscaled, &scaled, var, pair)?;
                    info!(
                        material = %material,
                        mass,
                        variable = %var.name,
                        base_energy = pair.base,
                        edges = cmp.edges.len(),
                        "built comparison"
                    );
                    by_energy.insert(float_label(pair.base), cmp);
                }
            }
        }
    }
    Ok(matrix)
}

/// Write the matrix as JSON, replacing `path`.
pub fn write_matrix(matrix: &HistMatrix, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, matrix).context("serializing histogram matrix")?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<HistMatrix> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}
