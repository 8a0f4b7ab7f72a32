// src/derive/mod.rs

//! Kinematic columns derived from the recoil lepton and the
//! center-of-momentum system of each dark-brem event.
//!
//! The mediator ("ap") four-momentum is the center-of-momentum value minus
//! the recoil value. Every derived value is a row-local function of the
//! raw columns; floating-point domain errors surface as NaN.

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, AsArray, Float64Array},
    compute::cast,
    datatypes::{DataType, Field, Float64Type, Schema},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, sync::Arc};
use tracing::debug;

use crate::table::schema::INCIDENT_ENERGY;

/// How the azimuthal separation of recoil and mediator is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaPhi {
    /// `|phi_recoil - phi_ap|`, in [0, 2π).
    #[default]
    Absolute,
    /// Minimum separation, folded into [0, π].
    Folded,
}

impl DeltaPhi {
    fn apply(&self, a: f64, b: f64) -> f64 {
        let d = (a - b).abs();
        match self {
            DeltaPhi::Absolute => d,
            DeltaPhi::Folded => d.min(2.0 * PI - d),
        }
    }
}

/// Derived columns, in the order they are appended.
pub const DERIVED_COLUMNS: &[&str] = &[
    "ap_energy",
    "ap_px",
    "ap_py",
    "ap_pz",
    "recoil_pt",
    "ap_pt",
    "recoil_phi",
    "ap_phi",
    "recoil_theta",
    "ap_theta",
    "recoil_energy_frac",
    "ap_energy_frac",
    "delta_phi",
    "angle_recoil_ap",
];

/// Read any numeric column as f64, nulls as NaN.
pub fn column_f64(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let col = batch
        .column_by_name(name)
        .with_context(|| format!("missing column {name}"))?;
    let col = cast(col, &DataType::Float64).with_context(|| format!("casting {name} to f64"))?;
    Ok(col
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

struct FourMomentum {
    energy: Vec<f64>,
    px: Vec<f64>,
    py: Vec<f64>,
    pz: Vec<f64>,
}

impl FourMomentum {
    fn load(batch: &RecordBatch, prefix: &str) -> Result<Self> {
        Ok(Self {
            energy: column_f64(batch, &format!("{prefix}_energy"))?,
            px: column_f64(batch, &format!("{prefix}_px"))?,
            py: column_f64(batch, &format!("{prefix}_py"))?,
            pz: column_f64(batch, &format!("{prefix}_pz"))?,
        })
    }

    fn minus(&self, other: &Self) -> Self {
        let sub = |a: &[f64], b: &[f64]| -> Vec<f64> { a.iter().zip(b).map(|(x, y)| x - y).collect() };
        Self {
            energy: sub(&self.energy, &other.energy),
            px: sub(&self.px, &other.px),
            py: sub(&self.py, &other.py),
            pz: sub(&self.pz, &other.pz),
        }
    }

    fn pt(&self) -> Vec<f64> {
        self.px.iter().zip(&self.py).map(|(x, y)| x.hypot(*y)).collect()
    }

    fn phi(&self) -> Vec<f64> {
        self.px.iter().zip(&self.py).map(|(x, y)| y.atan2(*x)).collect()
    }
}

/// Compute every derived column for `batch`.
pub fn derived_columns(batch: &RecordBatch, delta_phi: DeltaPhi) -> Result<Vec<(&'static str, Vec<f64>)>> {
    let cm = FourMomentum::load(batch, "centerMomentum")?;
    let recoil = FourMomentum::load(batch, "recoil")?;
    let incident = column_f64(batch, INCIDENT_ENERGY)?;
    let ap = cm.minus(&recoil);

    let recoil_pt = recoil.pt();
    let ap_pt = ap.pt();
    let recoil_phi = recoil.phi();
    let ap_phi = ap.phi();
    let theta = |pt: &[f64], pz: &[f64]| -> Vec<f64> {
        pt.iter().zip(pz).map(|(t, z)| t.atan2(*z)).collect()
    };
    let frac = |e: &[f64]| -> Vec<f64> { e.iter().zip(&incident).map(|(e, i)| e / i).collect() };

    let recoil_theta = theta(&recoil_pt, &recoil.pz);
    let ap_theta = theta(&ap_pt, &ap.pz);
    let recoil_energy_frac = frac(&recoil.energy);
    let ap_energy_frac = frac(&ap.energy);
    let dphi: Vec<f64> = recoil_phi
        .iter()
        .zip(&ap_phi)
        .map(|(r, a)| delta_phi.apply(*r, *a))
        .collect();

    // |p|^2 = pt^2 + pz^2; acos may see |x| slightly above 1 and give NaN
    let angle: Vec<f64> = (0..batch.num_rows())
        .map(|i| {
            let dot = ap.px[i] * recoil.px[i] + ap.py[i] * recoil.py[i] + ap.pz[i] * recoil.pz[i];
            let norm = ((ap_pt[i].powi(2) + ap.pz[i].powi(2))
                * (recoil_pt[i].powi(2) + recoil.pz[i].powi(2)))
            .sqrt();
            (dot / norm).acos()
        })
        .collect();

    Ok(vec![
        ("ap_energy", ap.energy),
        ("ap_px", ap.px),
        ("ap_py", ap.py),
        ("ap_pz", ap.pz),
        ("recoil_pt", recoil_pt),
        ("ap_pt", ap_pt),
        ("recoil_phi", recoil_phi),
        ("ap_phi", ap_phi),
        ("recoil_theta", recoil_theta),
        ("ap_theta", ap_theta),
        ("recoil_energy_frac", recoil_energy_frac),
        ("ap_energy_frac", ap_energy_frac),
        ("delta_phi", dphi),
        ("angle_recoil_ap", angle),
    ])
}

/// Return `batch` with the derived columns appended. Existing columns of the
/// same name are replaced.
pub fn with_derived_columns(batch: &RecordBatch, delta_phi: DeltaPhi) -> Result<RecordBatch> {
    let derived = derived_columns(batch, delta_phi)?;

    let schema = batch.schema();
    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + derived.len());
    let mut cols: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    for (field, col) in schema.fields().iter().zip(batch.columns()) {
        if DERIVED_COLUMNS.contains(&field.name().as_str()) {
            continue;
        }
        fields.push(field.as_ref().clone());
        cols.push(col.clone());
    }
    for (name, values) in derived {
        fields.push(Field::new(name, DataType::Float64, false));
        cols.push(Arc::new(Float64Array::from(values)));
    }

    let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), cols)
        .context("building batch with derived columns")?;
    let nan_angles = out
        .column_by_name("angle_recoil_ap")
        .map(|c| c.as_primitive::<Float64Type>().values().iter().filter(|v| v.is_nan()).count())
        .unwrap_or(0);
    debug!(rows = out.num_rows(), nan_angles, "derived kinematic columns");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    fn event_batch(rows: &[[f64; 9]]) -> RecordBatch {
        let names = [
            "centerMomentum_energy",
            "centerMomentum_px",
            "centerMomentum_py",
            "centerMomentum_pz",
            "recoil_energy",
            "recoil_px",
            "recoil_py",
            "recoil_pz",
            "incident_energy",
        ];
        let fields: Vec<Field> = names
            .iter()
            .map(|n| Field::new(*n, DataType::Float64, true))
            .collect();
        let cols: Vec<ArrayRef> = (0..names.len())
            .map(|c| Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r[c]))) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).unwrap()
    }

    fn get(batch: &RecordBatch, name: &str) -> Vec<f64> {
        column_f64(batch, name).unwrap()
    }

    #[test]
    fn transverse_momentum_and_angles() {
        let batch = event_batch(&[[4.0, 5.0, 4.0, 0.0, 2.0, 3.0, 4.0, 0.0, 4.0]]);
        let out = with_derived_columns(&batch, DeltaPhi::Absolute).unwrap();

        assert!((get(&out, "recoil_pt")[0] - 5.0).abs() < TOL);
        assert!((get(&out, "ap_pt")[0] - 2.0).abs() < TOL);
        assert_eq!(get(&out, "ap_px")[0], 2.0);
        assert_eq!(get(&out, "ap_py")[0], 0.0);
        assert!((get(&out, "recoil_theta")[0] - PI / 2.0).abs() < TOL);
        assert!((get(&out, "recoil_phi")[0] - 4.0f64.atan2(3.0)).abs() < TOL);
        assert_eq!(get(&out, "ap_phi")[0], 0.0);
        assert!((get(&out, "delta_phi")[0] - 4.0f64.atan2(3.0)).abs() < TOL);
        assert!((get(&out, "recoil_energy_frac")[0] - 0.5).abs() < TOL);
        assert!((get(&out, "ap_energy_frac")[0] - 0.5).abs() < TOL);
        // ap = (2, 0, 0), recoil = (3, 4, 0): cos = 6 / 10
        assert!((get(&out, "angle_recoil_ap")[0] - 0.6f64.acos()).abs() < TOL);

        assert_eq!(out.num_columns(), batch.num_columns() + DERIVED_COLUMNS.len());
    }

    #[test]
    fn delta_phi_conventions_across_the_branch_cut() {
        // recoil phi just below +pi, ap phi just above -pi
        let batch = event_batch(&[[1.0, -2.0, 0.0, 1.0, 0.5, -1.0, 0.01, 0.5, 8.0]]);
        let abs = get(&with_derived_columns(&batch, DeltaPhi::Absolute).unwrap(), "delta_phi")[0];
        let folded = get(&with_derived_columns(&batch, DeltaPhi::Folded).unwrap(), "delta_phi")[0];
        assert!(abs > 6.2 && abs < 2.0 * PI);
        assert!(folded < 0.03);
        assert!((abs + folded - 2.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn degenerate_momentum_gives_nan_not_error() {
        let batch = event_batch(&[[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]]);
        let out = with_derived_columns(&batch, DeltaPhi::Absolute).unwrap();
        assert!(get(&out, "angle_recoil_ap")[0].is_nan());
    }

    #[test]
    fn rederiving_replaces_columns() {
        let batch = event_batch(&[[4.0, 5.0, 4.0, 0.0, 2.0, 3.0, 4.0, 0.0, 4.0]]);
        let once = with_derived_columns(&batch, DeltaPhi::Absolute).unwrap();
        let twice = with_derived_columns(&once, DeltaPhi::Folded).unwrap();
        assert_eq!(once.num_columns(), twice.num_columns());
    }

    #[test]
    fn missing_raw_column_is_reported() {
        let schema = Schema::new(vec![Field::new("recoil_px", DataType::Float64, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float64Array::from(vec![1.0])) as ArrayRef],
        )
        .unwrap();
        let err = with_derived_columns(&batch, DeltaPhi::Absolute).unwrap_err();
        assert!(err.to_string().contains("centerMomentum_energy"));
    }
}
