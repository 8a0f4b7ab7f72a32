// src/batch/scaling.rs

use anyhow::{bail, Result};
use tracing::{error, info, instrument, warn};

use super::runner::CommandRunner;
use crate::config::CampaignConfig;
use crate::naming::float_label;

/// One synchronous rescaling of a library from `from_energy` to `to_energy`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingRun {
    pub run_number: u32,
    pub material: String,
    pub mass: f64,
    pub from_energy: f64,
    pub to_energy: f64,
}

impl ScalingRun {
    /// `<run> <material> <mass> <from> <to>`
    pub fn args(&self) -> Vec<String> {
        vec![
            self.run_number.to_string(),
            self.material.clone(),
            float_label(self.mass),
            float_label(self.from_energy),
            float_label(self.to_energy),
        ]
    }
}

/// Sweep order: material, mass, target energy, source energy.
pub fn scaling_runs(cfg: &CampaignConfig) -> Vec<ScalingRun> {
    let mut runs = Vec::new();
    for material in &cfg.materials {
        for &mass in &cfg.masses {
            for pair in &cfg.scaling.pairs {
                for &from_energy in &pair.sources {
                    runs.push(ScalingRun {
                        run_number: cfg.run_number,
                        material: material.clone(),
                        mass,
                        from_energy,
                        to_energy: pair.target,
                    });
                }
            }
        }
    }
    runs
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalingSummary {
    pub attempted: usize,
    pub failed: usize,
}

/// Run every scaling of the campaign. The first failure aborts the sweep
/// unless `scaling.continue_on_fail` is set, in which case failures are
/// counted and the sweep carries on.
#[instrument(skip_all, fields(continue_on_fail = cfg.scaling.continue_on_fail))]
pub fn perform_scalings(cfg: &CampaignConfig, runner: &dyn CommandRunner) -> Result<ScalingSummary> {
    let script = cfg.scaling.run_script.display().to_string();
    let runs = scaling_runs(cfg);
    let mut summary = ScalingSummary::default();

    for run in &runs {
        let args = run.args();
        info!(command = %format!("{} {}", script, args.join(" ")), "scaling");
        summary.attempted += 1;

        let out = match runner.run(&script, &args) {
            Ok(out) => out,
            Err(e) if cfg.scaling.continue_on_fail => {
                warn!(error = %e, "could not start scaling");
                summary.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        if out.success() {
            continue;
        }

        summary.failed += 1;
        if !cfg.scaling.continue_on_fail {
            error!(status = ?out.status, stderr = out.stderr.trim(), "scaling failed; aborting");
            bail!(
                "{} {} exited with {:?} ({} of {} scalings left unrun)",
                script,
                args.join(" "),
                out.status,
                runs.len() - summary.attempted,
                runs.len()
            );
        }
        warn!(status = ?out.status, stderr = out.stderr.trim(), "scaling failed; continuing");
    }

    info!(attempted = summary.attempted, failed = summary.failed, "scalings done");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::super::runner::fake::FakeRunner;
    use super::*;
    use crate::config::ScalingPair;

    fn small_campaign(continue_on_fail: bool) -> CampaignConfig {
        let mut cfg = CampaignConfig::default();
        cfg.materials = vec!["lead".into(), "oxygen".into()];
        cfg.masses = vec![0.005];
        cfg.scaling.continue_on_fail = continue_on_fail;
        cfg.scaling.pairs = vec![ScalingPair {
            target: 7.0,
            sources: vec![7.5, 8.0],
        }];
        cfg
    }

    #[test]
    fn sweep_covers_every_combination_in_order() {
        let runs = scaling_runs(&CampaignConfig::default());
        // 5 materials, 4 masses, 41 source energies
        assert_eq!(runs.len(), 5 * 4 * 41);
        assert_eq!(
            runs[0].args(),
            vec!["4000", "copper", "0.005", "1.1", "1.0"]
        );
    }

    #[test]
    fn all_runs_pass() {
        let runner = FakeRunner::default();
        let summary = perform_scalings(&small_campaign(false), &runner).unwrap();
        assert_eq!(summary, ScalingSummary { attempted: 4, failed: 0 });

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].0, "scripts/run_g4db_scale.sh");
        assert_eq!(calls[3].1, vec!["4000", "oxygen", "0.005", "8.0", "7.0"]);
    }

    #[test]
    fn failure_aborts_remaining_runs() {
        let runner = FakeRunner::with_codes(&[0, 2]);
        let err = perform_scalings(&small_campaign(false), &runner).unwrap_err();
        assert_eq!(runner.calls.borrow().len(), 2);
        assert!(err.to_string().contains("2 of 4"));
    }

    #[test]
    fn continue_on_fail_counts_failures() {
        let runner = FakeRunner::with_codes(&[1, 0, 1]);
        let summary = perform_scalings(&small_campaign(true), &runner).unwrap();
        assert_eq!(runner.calls.borrow().len(), 4);
        assert_eq!(summary, ScalingSummary { attempted: 4, failed: 2 });
    }
}
