// src/table/compile.rs

use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray},
    compute::concat_batches,
    csv::ReaderBuilder,
    datatypes::Schema,
    record_batch::RecordBatch,
};
use glob::glob;
use std::{
    fs::File,
    path::PathBuf,
    sync::Arc,
};
use tracing::{debug, info, instrument};

use super::schema::{
    check_partition, infer_csv_schema, needs_incident_energy, tagged_schema, unify_schemas,
};
use super::{table_path, write_table, TableFormat};
use crate::config::CampaignConfig;
use crate::naming::{raw_glob, RunParams};

const CSV_BATCH_SIZE: usize = 64 * 1024;

/// What one partition compile produced.
#[derive(Debug, Clone)]
pub struct PartitionSummary {
    pub material: String,
    pub mass: f64,
    pub scaled: bool,
    pub files: usize,
    pub rows: usize,
    pub output: PathBuf,
}

/// Expand a glob pattern into the matching paths, in glob order.
fn matching_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob(pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        paths.push(entry.with_context(|| format!("reading match of {pattern}"))?);
    }
    Ok(paths)
}

/// Append the run metadata columns to one raw batch.
fn tag_batch(
    batch: &RecordBatch,
    params: &RunParams,
    add_energy: bool,
    schema: &Arc<Schema>,
) -> Result<RecordBatch> {
    let n = batch.num_rows();
    let mut cols: Vec<ArrayRef> = batch.columns().to_vec();
    if add_energy {
        cols.push(Arc::new(Float64Array::from(vec![params.incident_energy; n])));
    }
    cols.push(Arc::new(StringArray::from(vec![params.lepton.as_str(); n])));
    cols.push(Arc::new(StringArray::from(vec![params.material.as_str(); n])));
    cols.push(Arc::new(Float64Array::from(vec![params.mass; n])));
    cols.push(Arc::new(BooleanArray::from(vec![params.scaled; n])));
    cols.push(Arc::new(Float64Array::from(vec![params.scaled_from_energy; n])));
    cols.push(Arc::new(Int64Array::from(vec![params.run_number as i64; n])));

    RecordBatch::try_new(schema.clone(), cols).context("building tagged batch")
}

/// Read every file, tag its rows with the metadata in its name, and
/// concatenate in the given order. Any bad name or unreadable file aborts.
pub fn compile_files(paths: &[PathBuf]) -> Result<RecordBatch> {
    if paths.is_empty() {
        bail!("no input files to compile");
    }

    let mut schemas = Vec::with_capacity(paths.len());
    let mut params = Vec::with_capacity(paths.len());
    for path in paths {
        params.push(RunParams::from_path(path)?);
        schemas.push((path.as_path(), infer_csv_schema(path)?));
    }
    let raw = Arc::new(unify_schemas(&schemas)?);
    let add_energy = needs_incident_energy(&raw);
    let out_schema = Arc::new(tagged_schema(&raw));

    let mut batches = Vec::new();
    for (path, run) in paths.iter().zip(&params) {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = ReaderBuilder::new(raw.clone())
            .with_header(true)
            .with_batch_size(CSV_BATCH_SIZE)
            .build(file)
            .with_context(|| format!("creating CSV reader for {}", path.display()))?;

        let mut rows = 0;
        for batch in reader {
            let batch = batch.with_context(|| format!("reading CSV {}", path.display()))?;
            rows += batch.num_rows();
            batches.push(tag_batch(&batch, run, add_energy, &out_schema)?);
        }
        debug!(file = %path.display(), rows, "read raw file");
    }

    concat_batches(&out_schema, &batches).context("concatenating compiled batches")
}

/// Compile one (material, mass, scaled) partition into a single table file.
#[instrument(level = "info", skip(cfg))]
pub fn compile_partition(
    cfg: &CampaignConfig,
    material: &str,
    mass: f64,
    scaled: bool,
    format: TableFormat,
) -> Result<PartitionSummary> {
    let dir = if scaled {
        cfg.scaled_dir()
    } else {
        cfg.dblib_dir.clone()
    };
    let pattern = dir
        .join(raw_glob(&cfg.lepton, material, mass, scaled))
        .to_string_lossy()
        .into_owned();

    let paths = matching_files(&pattern)?;
    if paths.is_empty() {
        bail!("no raw files match {}", pattern);
    }
    for path in &paths {
        check_partition(
            path,
            &RunParams::from_path(path)?,
            &cfg.lepton,
            material,
            mass,
            scaled,
        )?;
    }

    let batch = compile_files(&paths)
        .with_context(|| format!("compiling {} files matching {}", paths.len(), pattern))?;
    let output = table_path(cfg, material, mass, scaled, format);
    let bytes = write_table(&batch, &output, format)?;

    info!(
        files = paths.len(),
        rows = batch.num_rows(),
        bytes,
        output = %output.display(),
        "compiled partition"
    );
    Ok(PartitionSummary {
        material: material.to_string(),
        mass,
        scaled,
        files: paths.len(),
        rows: batch.num_rows(),
        output,
    })
}

/// Compile the unscaled and scaled tables of every configured (material, mass).
pub fn compile_campaign(cfg: &CampaignConfig, format: TableFormat) -> Result<Vec<PartitionSummary>> {
    let mut out = Vec::new();
    for material in &cfg.materials {
        for &mass in &cfg.masses {
            out.push(compile_partition(cfg, material, mass, false, format)?);
            out.push(compile_partition(cfg, material, mass, true, format)?);
        }
    }
    Ok(out)
}
