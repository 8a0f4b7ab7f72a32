use arrow::array::{Array, BooleanArray, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use dblib_scaling::derive::column_f64;
use dblib_scaling::table::{
    load_table,
    schema::{INCIDENT_ENERGY, LEPTON, MASS, RUN_NUMBER, SCALED, SCALED_FROM_E, TARGET},
};
use std::collections::BTreeSet;
use std::{env, path::Path, process::exit};

fn main() {
    // Expect exactly one CLI argument: path to a compiled table.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <TABLE_FILE>", args[0]);
        exit(1);
    }
    if let Err(e) = inspect_table(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Load a compiled table and print its schema, row count and run metadata.
fn inspect_table(path: &Path) -> anyhow::Result<()> {
    let batch = load_table(path)?;
    let file_size_disk = std::fs::metadata(path)?.len();

    println!("=== Table: {} ===", path.display());
    println!("Total rows:        {}", batch.num_rows());
    println!("Columns:           {}", batch.num_columns());
    println!("File-size on disk: {} bytes", file_size_disk);
    println!();

    println!("=== Schema ===");
    for field in batch.schema().fields() {
        println!(
            "- {:<24} | {:<10} | nullable: {}",
            field.name(),
            format!("{:?}", field.data_type()),
            field.is_nullable()
        );
    }
    println!();

    println!("=== Run metadata ===");
    print_distinct_strings(&batch, LEPTON);
    print_distinct_strings(&batch, TARGET);
    print_distinct_floats(&batch, MASS)?;
    print_distinct_floats(&batch, INCIDENT_ENERGY)?;
    print_distinct_floats(&batch, SCALED_FROM_E)?;

    if let Some(col) = batch
        .column_by_name(SCALED)
        .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
    {
        println!("{:<16} {} of {} rows", SCALED, col.true_count(), col.len());
    }
    if let Some(col) = batch
        .column_by_name(RUN_NUMBER)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    {
        let runs: BTreeSet<i64> = col.iter().flatten().collect();
        println!("{:<16} {:?}", RUN_NUMBER, runs);
    }
    Ok(())
}

fn print_distinct_strings(batch: &RecordBatch, name: &str) {
    let Some(col) = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    else {
        println!("{:<16} <missing>", name);
        return;
    };
    let values: BTreeSet<&str> = col.iter().flatten().collect();
    println!("{:<16} {:?}", name, values);
}

/// Distinct values with row counts, in ascending order.
fn print_distinct_floats(batch: &RecordBatch, name: &str) -> anyhow::Result<()> {
    if batch.column_by_name(name).is_none() {
        println!("{:<16} <missing>", name);
        return Ok(());
    }
    let mut values = column_f64(batch, name)?;
    values.sort_by(f64::total_cmp);

    let mut counts: Vec<(f64, usize)> = Vec::new();
    for v in values {
        match counts.last_mut() {
            Some((last, n)) if *last == v => *n += 1,
            _ => counts.push((v, 1)),
        }
    }
    let rendered: Vec<String> = counts.iter().map(|(v, n)| format!("{v} ({n})")).collect();
    println!("{:<16} {}", name, rendered.join(", "));
    Ok(())
}
