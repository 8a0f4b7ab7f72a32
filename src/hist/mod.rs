// src/hist/mod.rs

//! Shape comparison of one base sample against several comparison samples
//! on shared bin edges.

pub mod binning;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use binning::{auto_edges, fill, validate_edges};

/// Per-variable histogram settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistOptions {
    /// Lower range bound; data minimum minus 5% of the data range when unset.
    pub min_x: Option<f64>,
    /// Upper range bound; data maximum plus 5% of the data range when unset.
    pub max_x: Option<f64>,
    /// Explicit linear bin edges. Range options are ignored when set.
    pub bins: Option<Vec<f64>>,
    /// Choose bin edges in log space.
    pub log_x: bool,
    /// Report running sums (empirical CDF) instead of per-bin fractions.
    pub cumulative: bool,
}

/// A variable to histogram and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSpec {
    pub name: String,
    #[serde(flatten)]
    pub options: HistOptions,
}

/// Histograms of one `compare` call. Every histogram has `edges.len() - 1` bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub base: Vec<f64>,
    /// Always in linear units, even for `log_x`.
    pub edges: Vec<f64>,
    /// Same order as the comparison samples passed in.
    pub comparisons: Vec<Vec<f64>>,
}

fn finite_range<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Edges derived from the samples: range over base and comparisons, bin
/// width from the base sample alone.
fn shared_edges<S: AsRef<[f64]>>(
    base: &[f64],
    comparisons: &[S],
    opts: &HistOptions,
) -> Result<Vec<f64>> {
    if base.is_empty() {
        bail!("cannot derive bin edges from an empty base sample");
    }
    let all = base
        .iter()
        .chain(comparisons.iter().flat_map(|s| s.as_ref().iter()));
    let Some((min_val, max_val)) = finite_range(all) else {
        bail!("no finite values to derive bin edges from");
    };

    let pad = 0.05 * (max_val - min_val);
    let min_x = opts.min_x.unwrap_or(min_val - pad);
    let max_x = opts.max_x.unwrap_or(max_val + pad);
    if !(min_x <= max_x) {
        bail!("histogram range [{}, {}] is empty", min_x, max_x);
    }

    if opts.log_x {
        if min_x <= 0.0 {
            bail!("log binning needs a positive lower bound, got {}", min_x);
        }
        let logs: Vec<f64> = base.iter().map(|v| v.ln()).collect();
        let mut edges: Vec<f64> = auto_edges(&logs, min_x.ln(), max_x.ln())
            .into_iter()
            .map(f64::exp)
            .collect();
        if min_x < max_x {
            let last = edges.len() - 1;
            edges[0] = min_x;
            edges[last] = max_x;
        }
        Ok(edges)
    } else {
        Ok(auto_edges(base, min_x, max_x))
    }
}

/// Fraction of `sample` in each bin; bins sum to 1 when every value is in range.
fn normalized(sample: &[f64], edges: &[f64]) -> Vec<f64> {
    if sample.is_empty() {
        return vec![0.0; edges.len() - 1];
    }
    fill(sample, edges, 1.0 / sample.len() as f64)
}

fn accumulate(hist: &mut [f64]) {
    let mut total = 0.0;
    for v in hist.iter_mut() {
        total += *v;
        *v = total;
    }
}

/// Histogram `base` and each comparison sample on the same edges, each
/// normalised by its own size.
pub fn compare<S: AsRef<[f64]>>(
    base: &[f64],
    comparisons: &[S],
    opts: &HistOptions,
) -> Result<Comparison> {
    let edges = match &opts.bins {
        Some(bins) => {
            validate_edges(bins)?;
            bins.clone()
        }
        None => shared_edges(base, comparisons, opts)?,
    };

    for (i, s) in comparisons.iter().enumerate() {
        if s.as_ref().is_empty() {
            warn!(index = i, "empty comparison sample; histogram is all zeros");
        }
    }

    let mut base_hist = normalized(base, &edges);
    let mut comp_hists: Vec<Vec<f64>> = comparisons
        .iter()
        .map(|s| normalized(s.as_ref(), &edges))
        .collect();

    if opts.cumulative {
        accumulate(&mut base_hist);
        comp_hists.iter_mut().for_each(|h| accumulate(h));
    }

    trace!(
        edges = edges.len(),
        base = base.len(),
        comparisons = comp_hists.len(),
        "compared samples"
    );
    Ok(Comparison {
        base: base_hist,
        edges,
        comparisons: comp_hists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn ramp(n: usize, lo: f64, hi: f64) -> Vec<f64> {
        (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn histograms_sum_to_one_regardless_of_size() {
        let base = ramp(200, 0.0, 1.0);
        let comps = vec![ramp(7, 0.2, 0.9), ramp(3000, 0.0, 0.5)];
        let opts = HistOptions {
            min_x: Some(0.0),
            max_x: Some(1.0),
            ..Default::default()
        };
        let cmp = compare(&base, &comps, &opts).unwrap();

        assert!((cmp.base.iter().sum::<f64>() - 1.0).abs() < TOL);
        for h in &cmp.comparisons {
            assert!((h.iter().sum::<f64>() - 1.0).abs() < TOL);
            assert_eq!(h.len(), cmp.edges.len() - 1);
        }
        assert_eq!(cmp.base.len(), cmp.edges.len() - 1);
        assert_eq!(cmp.comparisons.len(), 2);
    }

    #[test]
    fn cumulative_is_monotone_and_ends_at_one() {
        let base = ramp(500, 0.0, 1.0);
        let comps = vec![ramp(50, 0.3, 0.6)];
        let opts = HistOptions {
            min_x: Some(0.0),
            max_x: Some(1.0),
            cumulative: true,
            ..Default::default()
        };
        let cmp = compare(&base, &comps, &opts).unwrap();
        for h in std::iter::once(&cmp.base).chain(&cmp.comparisons) {
            assert!(h.windows(2).all(|w| w[0] <= w[1]));
            assert!((h[h.len() - 1] - 1.0).abs() < TOL);
        }
    }

    #[test]
    fn unbounded_range_is_padded_by_five_percent() {
        let base = ramp(11, 0.0, 10.0);
        let comps = vec![ramp(5, 5.0, 20.0)];
        let cmp = compare(&base, &comps, &HistOptions::default()).unwrap();
        assert!((cmp.edges[0] - -1.0).abs() < TOL);
        assert!((cmp.edges[cmp.edges.len() - 1] - 21.0).abs() < TOL);
    }

    #[test]
    fn explicit_bins_are_used_verbatim() {
        let bins = vec![0.0, 0.25, 0.5, 1.0];
        let opts = HistOptions {
            bins: Some(bins.clone()),
            min_x: Some(-100.0),
            ..Default::default()
        };
        let cmp = compare(&[0.1, 0.3, 0.3, 0.9], &[vec![1.0]], &opts).unwrap();
        assert_eq!(cmp.edges, bins);
        assert_eq!(cmp.base, vec![0.25, 0.5, 0.25]);
        assert_eq!(cmp.comparisons[0], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn out_of_range_values_reduce_the_total() {
        let opts = HistOptions {
            min_x: Some(0.0),
            max_x: Some(1.0),
            ..Default::default()
        };
        let cmp = compare(&[0.5, 2.0], &[] as &[Vec<f64>], &opts).unwrap();
        assert!((cmp.base.iter().sum::<f64>() - 0.5).abs() < TOL);
    }

    #[test]
    fn log_binning_returns_linear_edges() {
        let base = vec![1.0, 3.0, 10.0, 30.0, 100.0];
        let opts = HistOptions {
            min_x: Some(1.0),
            max_x: Some(100.0),
            log_x: true,
            ..Default::default()
        };
        let cmp = compare(&base, &[vec![2.0, 50.0]], &opts).unwrap();
        assert_eq!(cmp.edges[0], 1.0);
        assert_eq!(cmp.edges[cmp.edges.len() - 1], 100.0);
        // equal ratios between successive edges
        let ratios: Vec<f64> = cmp.edges.windows(2).map(|w| w[1] / w[0]).collect();
        assert!(ratios.windows(2).all(|r| (r[0] - r[1]).abs() < 1e-9));
        assert!((cmp.base.iter().sum::<f64>() - 1.0).abs() < TOL);
        assert!((cmp.comparisons[0].iter().sum::<f64>() - 1.0).abs() < TOL);
    }

    #[test]
    fn log_binning_rejects_non_positive_bound() {
        let opts = HistOptions {
            min_x: Some(0.0),
            max_x: Some(1.0),
            log_x: true,
            ..Default::default()
        };
        assert!(compare(&[0.5], &[] as &[Vec<f64>], &opts).is_err());
    }

    #[test]
    fn empty_samples() {
        assert!(compare(&[], &[vec![1.0]], &HistOptions::default()).is_err());

        let cmp = compare(&[1.0, 2.0], &[Vec::<f64>::new()], &HistOptions::default()).unwrap();
        assert!(cmp.comparisons[0].iter().all(|v| *v == 0.0));

        let opts = HistOptions {
            bins: Some(vec![0.0, 1.0]),
            ..Default::default()
        };
        let cmp = compare(&[], &[vec![0.5]], &opts).unwrap();
        assert_eq!(cmp.base, vec![0.0]);
        assert_eq!(cmp.comparisons[0], vec![1.0]);
    }

    #[test]
    fn nan_values_are_ignored_for_range() {
        let base = vec![0.0, f64::NAN, 1.0];
        let cmp = compare(&base, &[] as &[Vec<f64>], &HistOptions::default()).unwrap();
        assert!(cmp.edges.iter().all(|e| e.is_finite()));
        // NaN still counts towards the sample size
        assert!((cmp.base.iter().sum::<f64>() - 2.0 / 3.0).abs() < TOL);
    }
}
