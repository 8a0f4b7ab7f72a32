// src/batch/mod.rs

//! Slurm job scripts for the simulation stages that produce raw runs and
//! signal samples, plus their submission.

pub mod runner;
pub mod scaling;

pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use scaling::{perform_scalings, scaling_runs, ScalingRun, ScalingSummary};

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::config::{CampaignConfig, SlurmConfig};
use crate::naming::{float_label, signal_output_stem, LibraryParams, RunParams};

/// Throughput of the slowest library-generation node.
pub const UNSCALED_EVENTS_PER_HOUR: u64 = 80_000;
pub const UNSCALED_MEM_MB: u32 = 1000;
pub const SIGNAL_EVENTS_PER_HOUR: u64 = 1000;
pub const SIGNAL_MEM_MB: u32 = 4000;

/// Wall-clock hours for `events` at `per_hour`, rounded up, never zero.
pub fn estimate_hours(events: u64, per_hour: u64) -> u64 {
    events.div_ceil(per_hour.max(1)).max(1)
}

/// `#SBATCH` preamble of a job script.
#[derive(Debug, Clone, PartialEq)]
pub struct SlurmHeader {
    pub ntasks: u32,
    pub mem_mb: u32,
    pub partition: String,
    pub account: String,
    pub hours: u64,
    pub output: PathBuf,
    pub error: PathBuf,
}

impl SlurmHeader {
    fn new(slurm: &SlurmConfig, mem_mb: u32, hours: u64, log_dir: &Path, stem: &str) -> Self {
        Self {
            ntasks: 1,
            mem_mb,
            partition: slurm.partition.clone(),
            account: slurm.account.clone(),
            hours,
            output: log_dir.join(format!("slurm_{stem}.out")),
            error: log_dir.join(format!("slurm_{stem}.err")),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "#!/bin/bash\n\n\
             #SBATCH --ntasks={}\n\
             #SBATCH --mem={}\n\
             #SBATCH --partition={}\n\
             #SBATCH --account={}\n\
             #SBATCH --time={:02}:00:00\n\
             #SBATCH --output={}\n\
             #SBATCH --error={}\n\n",
            self.ntasks,
            self.mem_mb,
            self.partition,
            self.account,
            self.hours,
            self.output.display(),
            self.error.display()
        )
    }
}

/// A rendered script and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobScript {
    pub path: PathBuf,
    pub text: String,
}

impl JobScript {
    pub fn write(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(&self.path, &self.text)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Generation of one unscaled raw run at a single (material, mass, energy).
#[derive(Debug, Clone, PartialEq)]
pub struct UnscaledLibraryJob {
    pub run: RunParams,
    pub events: u64,
    pub run_script: PathBuf,
    pub output_dir: PathBuf,
}

impl UnscaledLibraryJob {
    pub fn render(&self, slurm: &SlurmConfig) -> JobScript {
        let stem = self.run.stem();
        let slurm_dir = self.output_dir.join("slurm");
        let hours = estimate_hours(self.events, UNSCALED_EVENTS_PER_HOUR);
        let mut text = SlurmHeader::new(slurm, UNSCALED_MEM_MB, hours, &slurm_dir, &stem).render();
        text.push_str(&format!(
            "{} {} {} {} {} {} {}",
            self.run_script.display(),
            self.run.run_number,
            self.run.material,
            float_label(self.run.mass),
            float_label(self.run.incident_energy),
            self.events,
            self.output_dir.display()
        ));
        JobScript {
            path: slurm_dir.join(format!("{stem}.slurm")),
            text,
        }
    }
}

/// Every unscaled generation job of the campaign, material-major.
pub fn unscaled_jobs(cfg: &CampaignConfig) -> Vec<UnscaledLibraryJob> {
    let u = &cfg.unscaled;
    let mut jobs = Vec::new();
    for material in &cfg.materials {
        for &mass in &cfg.masses {
            for &energy in &u.energies {
                jobs.push(UnscaledLibraryJob {
                    run: RunParams::unscaled(&cfg.lepton, material, mass, energy, cfg.run_number),
                    events: u.events_per_point,
                    run_script: u.run_script.clone(),
                    output_dir: u.output_dir.clone(),
                });
            }
        }
    }
    jobs
}

/// Full detector simulation driven by a prebuilt dark-brem event library.
///
/// `run_script`, `config_script` and `library` are relative to `repo_dir`;
/// the simulation writes its ROOT file into `repo_dir`, and the job moves it
/// to `output_dir` afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSampleJob {
    pub repo_dir: PathBuf,
    pub run_script: PathBuf,
    pub config_script: PathBuf,
    pub library: PathBuf,
    pub n_events: u64,
    pub output_dir: PathBuf,
}

impl SignalSampleJob {
    pub fn from_config(cfg: &CampaignConfig) -> Self {
        let s = &cfg.signal;
        Self {
            repo_dir: s.repo_dir.clone(),
            run_script: s.run_script.clone(),
            config_script: s.config_script.clone(),
            library: s.library.clone(),
            n_events: s.n_events,
            output_dir: s.output_dir.clone(),
        }
    }

    /// Name of the ROOT file the simulation produces, without extension.
    pub fn output_stem(&self) -> Result<String> {
        let lib = LibraryParams::from_path(&self.library)?;
        Ok(signal_output_stem(self.n_events, lib.mass_mev(), lib.run_number))
    }

    pub fn render(&self, slurm: &SlurmConfig) -> Result<JobScript> {
        let stem = self
            .output_stem()
            .with_context(|| format!("reading parameters of library {}", self.library.display()))?;
        let slurm_dir = self.output_dir.join("slurm");
        let hours = estimate_hours(self.n_events, SIGNAL_EVENTS_PER_HOUR);
        let mut text = SlurmHeader::new(slurm, SIGNAL_MEM_MB, hours, &slurm_dir, &stem).render();
        let repo = self.repo_dir.display();
        text.push_str(&format!(
            "{}/{} {} {} {} {}\n",
            repo,
            self.run_script.display(),
            repo,
            self.config_script.display(),
            self.library.display(),
            self.n_events
        ));
        text.push_str(&format!("mv {}/{}.root {}", repo, stem, self.output_dir.display()));
        Ok(JobScript {
            path: slurm_dir.join(format!("{stem}.slurm")),
            text,
        })
    }
}

/// Write `script` and hand it to the scheduler. A non-zero exit is an error
/// carrying the scheduler's stderr.
#[instrument(level = "debug", skip(script, runner), fields(path = %script.path.display()))]
pub fn submit(script: &JobScript, runner: &dyn CommandRunner, submit_command: &str) -> Result<CommandOutput> {
    script.write()?;
    let out = runner.run(submit_command, &[script.path.display().to_string()])?;
    if !out.success() {
        bail!(
            "{} {} exited with {:?}: {}",
            submit_command,
            script.path.display(),
            out.status,
            out.stderr.trim()
        );
    }
    info!(script = %script.path.display(), response = out.stdout.trim(), "submitted");
    Ok(out)
}

/// Write every script and, unless `dry_run`, submit each in turn. Stops at
/// the first failed submission. Returns the number of scripts handled.
pub fn submit_all(
    scripts: &[JobScript],
    runner: &dyn CommandRunner,
    slurm: &SlurmConfig,
    dry_run: bool,
) -> Result<usize> {
    for script in scripts {
        if dry_run {
            script.write()?;
            info!(script = %script.path.display(), "wrote (dry run)");
        } else {
            submit(script, runner, &slurm.submit_command)?;
        }
    }
    Ok(scripts.len())
}

/// `gen-unscaled`: one job per (material, mass, energy).
#[instrument(skip(cfg, runner))]
pub fn generate_unscaled(cfg: &CampaignConfig, runner: &dyn CommandRunner, dry_run: bool) -> Result<usize> {
    let scripts: Vec<JobScript> = unscaled_jobs(cfg)
        .iter()
        .map(|j| j.render(&cfg.slurm))
        .collect();
    submit_all(&scripts, runner, &cfg.slurm, dry_run)
}

/// `gen-signal`: the single configured signal sample.
#[instrument(skip(cfg, runner))]
pub fn generate_signal(cfg: &CampaignConfig, runner: &dyn CommandRunner, dry_run: bool) -> Result<usize> {
    let script = SignalSampleJob::from_config(cfg).render(&cfg.slurm)?;
    submit_all(&[script], runner, &cfg.slurm, dry_run)
}
