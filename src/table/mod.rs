// src/table/mod.rs

//! Compiled dark-brem tables: one columnar file per
//! (material, mass, scaled/unscaled) partition.

pub mod compile;
pub mod schema;

use anyhow::{bail, Context, Result};
use arrow::{
    compute::concat_batches,
    datatypes::SchemaRef,
    ipc::{reader::FileReader, writer::FileWriter},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::config::CampaignConfig;
use crate::naming::compiled_table_name;

pub use compile::{compile_campaign, compile_files, compile_partition, PartitionSummary};

/// On-disk format of a compiled table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// Arrow IPC file (Feather v2).
    #[default]
    Feather,
    Parquet,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Feather => "feather",
            TableFormat::Parquet => "parquet",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("feather") | Some("arrow") | Some("ipc") => Some(TableFormat::Feather),
            Some("parquet") => Some(TableFormat::Parquet),
            _ => None,
        }
    }
}

/// Location of a compiled partition inside `cfg.table_dir`.
pub fn table_path(
    cfg: &CampaignConfig,
    material: &str,
    mass: f64,
    scaled: bool,
    format: TableFormat,
) -> PathBuf {
    cfg.table_dir.join(compiled_table_name(
        &cfg.lepton,
        material,
        mass,
        scaled,
        format.extension(),
    ))
}

/// Write `batch` to `path`, replacing any existing file. Returns bytes on disk.
pub fn write_table(batch: &RecordBatch, path: &Path, format: TableFormat) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating table directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("creating table {}", path.display()))?;

    match format {
        TableFormat::Feather => {
            let mut writer = FileWriter::try_new(BufWriter::new(file), &batch.schema())
                .context("creating IPC writer")?;
            writer.write(batch).context("writing IPC batch")?;
            writer.finish().context("finishing IPC file")?;
        }
        TableFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
                .context("creating parquet writer")?;
            writer.write(batch).context("writing parquet batch")?;
            writer.close().context("closing parquet writer")?;
        }
    }

    let size = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    debug!(path = %path.display(), rows = batch.num_rows(), bytes = size, "wrote table");
    Ok(size)
}

/// Read a compiled table (format chosen by extension) into a single batch.
pub fn load_table(path: &Path) -> Result<RecordBatch> {
    let Some(format) = TableFormat::from_path(path) else {
        bail!("unrecognised table extension: {}", path.display());
    };
    let file = File::open(path).with_context(|| format!("opening table {}", path.display()))?;

    let (schema, batches): (SchemaRef, Vec<RecordBatch>) = match format {
        TableFormat::Feather => {
            let reader = FileReader::try_new(file, None)
                .with_context(|| format!("reading IPC header of {}", path.display()))?;
            let schema = reader.schema();
            let batches = reader
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("reading IPC batches of {}", path.display()))?;
            (schema, batches)
        }
        TableFormat::Parquet => {
            let builder = ParquetRecordBatchReaderBuilder::try_new(file)
                .with_context(|| format!("reading parquet metadata of {}", path.display()))?;
            let schema = builder.schema().clone();
            let batches = builder
                .build()?
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("reading parquet batches of {}", path.display()))?;
            (schema, batches)
        }
    };

    let batch = concat_batches(&schema, &batches)
        .with_context(|| format!("concatenating batches of {}", path.display()))?;
    debug!(path = %path.display(), rows = batch.num_rows(), "loaded table");
    Ok(batch)
}
