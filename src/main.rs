use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dblib_scaling::{
    batch::{self, SystemRunner},
    config::CampaignConfig,
    matrix::{build_matrix, write_matrix},
    naming::{signal_output_stem, LibraryParams},
    table::{compile_campaign, TableFormat},
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dblib")]
#[command(about = "Dark-brem event library generation, compilation and scaling validation")]
struct Cli {
    /// Campaign YAML; built-in campaign when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Compiled table format
    #[arg(long, value_enum, global = true, default_value_t = TableFormat::Feather)]
    format: TableFormat,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile raw per-run CSVs into one table per (material, mass, scaled)
    Compile,
    /// Build the unscaled-vs-scaled histogram matrix from compiled tables
    Hists {
        /// Output JSON; defaults to `hists.output` from the config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write (and submit) unscaled library generation jobs
    GenUnscaled {
        /// Write scripts without submitting
        #[arg(long)]
        dry_run: bool,
    },
    /// Write (and submit) the signal sample simulation job
    GenSignal {
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every configured library rescaling in sequence
    Scale,
    /// Print the parameters a signal run derives from a library name
    SignalParams {
        /// Dark-brem event library
        db_event_lib: PathBuf,
        /// Number of events to simulate
        #[arg(default_value_t = 20000)]
        n_events: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = CampaignConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Compile => {
            let summaries = compile_campaign(&cfg, cli.format)?;
            let rows: usize = summaries.iter().map(|s| s.rows).sum();
            info!(tables = summaries.len(), rows, "compile finished");
        }
        Command::Hists { output } => {
            let matrix = build_matrix(&cfg, cli.format)?;
            let path = output.unwrap_or_else(|| cfg.hists.output.clone());
            write_matrix(&matrix, &path)?;
            info!(path = %path.display(), materials = matrix.len(), "wrote histogram matrix");
        }
        Command::GenUnscaled { dry_run } => {
            let n = batch::generate_unscaled(&cfg, &SystemRunner, dry_run)?;
            info!(jobs = n, dry_run, "unscaled library jobs done");
        }
        Command::GenSignal { dry_run } => {
            let n = batch::generate_signal(&cfg, &SystemRunner, dry_run)?;
            info!(jobs = n, dry_run, "signal jobs done");
        }
        Command::Scale => {
            let summary = batch::perform_scalings(&cfg, &SystemRunner)?;
            if summary.failed > 0 {
                error!(failed = summary.failed, attempted = summary.attempted, "some scalings failed");
            }
        }
        Command::SignalParams {
            db_event_lib,
            n_events,
        } => {
            let lib = LibraryParams::from_path(&db_event_lib)
                .with_context(|| format!("reading {}", db_event_lib.display()))?;
            println!("mA (MeV):    {}", lib.mass_mev());
            println!("run number:  {}", lib.run_number);
            println!(
                "output file: {}.root",
                signal_output_stem(n_events, lib.mass_mev(), lib.run_number)
            );
        }
    }
    Ok(())
}
