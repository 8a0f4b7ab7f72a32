// src/table/schema.rs

use anyhow::{bail, Context, Result};
use arrow::{
    csv::reader::Format,
    datatypes::{DataType, Field, Schema},
};
use std::{fs::File, path::Path};
use tracing::trace;

use crate::naming::RunParams;

/// Column names appended to every compiled row, in order.
pub const LEPTON: &str = "lepton";
pub const TARGET: &str = "target";
pub const MASS: &str = "mA";
pub const SCALED: &str = "scaled";
pub const SCALED_FROM_E: &str = "scaled_from_E";
pub const RUN_NUMBER: &str = "run_number";
/// Normally written by the simulation; only added when a raw file lacks it.
pub const INCIDENT_ENERGY: &str = "incident_energy";

/// Infer column types of one raw CSV from its header and values.
pub fn infer_csv_schema(path: &Path) -> Result<Schema> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (schema, records) = Format::default()
        .with_header(true)
        .infer_schema(&mut f, None)
        .with_context(|| format!("inferring schema of {}", path.display()))?;
    trace!(path = %path.display(), records, columns = schema.fields().len(), "inferred schema");
    Ok(schema)
}

/// Smallest type both sides can be read as.
fn widen(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (x, y) if x == y => x.clone(),
        (DataType::Null, x) | (x, DataType::Null) => x.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

/// Merge per-file schemas into one read schema. Every file must carry the
/// same header names in the same order.
pub fn unify_schemas(schemas: &[(&Path, Schema)]) -> Result<Schema> {
    let Some((first_path, first)) = schemas.first() else {
        bail!("no schemas to unify");
    };

    let mut types: Vec<DataType> = first
        .fields()
        .iter()
        .map(|f| f.data_type().clone())
        .collect();

    for (path, schema) in &schemas[1..] {
        let names: Vec<&String> = schema.fields().iter().map(|f| f.name()).collect();
        let expected: Vec<&String> = first.fields().iter().map(|f| f.name()).collect();
        if names != expected {
            bail!(
                "header of {} ({:?}) differs from {} ({:?})",
                path.display(),
                names,
                first_path.display(),
                expected
            );
        }
        for (ty, field) in types.iter_mut().zip(schema.fields()) {
            *ty = widen(ty, field.data_type());
        }
    }

    let fields: Vec<Field> = first
        .fields()
        .iter()
        .zip(types)
        .map(|(f, ty)| {
            // all-empty columns are read as floats so they concatenate with real data
            let ty = if ty == DataType::Null { DataType::Float64 } else { ty };
            Field::new(f.name(), ty, true)
        })
        .collect();
    Ok(Schema::new(fields))
}

/// Output schema: raw columns followed by the run metadata columns.
pub fn tagged_schema(raw: &Schema) -> Schema {
    let mut fields: Vec<Field> = raw.fields().iter().map(|f| f.as_ref().clone()).collect();
    if needs_incident_energy(raw) {
        fields.push(Field::new(INCIDENT_ENERGY, DataType::Float64, false));
    }
    fields.extend([
        Field::new(LEPTON, DataType::Utf8, false),
        Field::new(TARGET, DataType::Utf8, false),
        Field::new(MASS, DataType::Float64, false),
        Field::new(SCALED, DataType::Boolean, false),
        Field::new(SCALED_FROM_E, DataType::Float64, false),
        Field::new(RUN_NUMBER, DataType::Int64, false),
    ]);
    Schema::new(fields)
}

pub fn needs_incident_energy(raw: &Schema) -> bool {
    raw.field_with_name(INCIDENT_ENERGY).is_err()
}

/// Sanity check that a file's metadata belongs to the partition being compiled.
pub fn check_partition(
    path: &Path,
    params: &RunParams,
    lepton: &str,
    material: &str,
    mass: f64,
    scaled: bool,
) -> Result<()> {
    if params.lepton != lepton
        || params.material != material
        || params.mass != mass
        || params.scaled != scaled
    {
        bail!(
            "{} does not belong to partition {}/{}/mA {}/{}",
            path.display(),
            lepton,
            material,
            mass,
            if scaled { "scaled" } else { "unscaled" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn schema(cols: &[(&str, DataType)]) -> Schema {
        Schema::new(
            cols.iter()
                .map(|(n, t)| Field::new(*n, t.clone(), true))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn widens_int_to_float_and_null_to_float() {
        let a = PathBuf::from("a.csv");
        let b = PathBuf::from("b.csv");
        let merged = unify_schemas(&[
            (
                a.as_path(),
                schema(&[("x", DataType::Int64), ("y", DataType::Null)]),
            ),
            (
                b.as_path(),
                schema(&[("x", DataType::Float64), ("y", DataType::Null)]),
            ),
        ])
        .unwrap();
        assert_eq!(merged.field(0).data_type(), &DataType::Float64);
        assert_eq!(merged.field(1).data_type(), &DataType::Float64);
    }

    #[test]
    fn mismatched_headers_name_the_file() {
        let a = PathBuf::from("a.csv");
        let b = PathBuf::from("b.csv");
        let err = unify_schemas(&[
            (a.as_path(), schema(&[("x", DataType::Int64)])),
            (b.as_path(), schema(&[("z", DataType::Int64)])),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("b.csv"));
    }

    #[test]
    fn incident_energy_only_added_when_missing() {
        let with = schema(&[("incident_energy", DataType::Float64)]);
        let without = schema(&[("recoil_px", DataType::Float64)]);
        assert_eq!(tagged_schema(&with).fields().len(), 1 + 6);
        assert_eq!(tagged_schema(&without).fields().len(), 1 + 7);
        assert!(tagged_schema(&without)
            .field_with_name(INCIDENT_ENERGY)
            .is_ok());
    }
}
