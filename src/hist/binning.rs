// src/hist/binning.rs

use anyhow::{bail, Result};

/// Automatic binning never yields more edges than this.
pub const MAX_AUTO_EDGES: usize = 50;

/// `n_bins + 1` evenly spaced edges from `lo` to `hi`, endpoints exact.
pub fn linspace(lo: f64, hi: f64, n_bins: usize) -> Vec<f64> {
    let step = (hi - lo) / n_bins as f64;
    let mut edges: Vec<f64> = (0..=n_bins).map(|i| lo + step * i as f64).collect();
    edges[n_bins] = hi;
    edges
}

/// Linear-interpolation percentile of sorted data, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let below = pos.floor() as usize;
    let above = pos.ceil() as usize;
    let frac = pos - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * frac
}

/// Bin count picked by the `auto` estimator over the values inside
/// `[lo, hi]`: the narrower of the Freedman–Diaconis and Sturges widths,
/// Sturges alone when the interquartile range is zero.
pub fn auto_bin_count(data: &[f64], lo: f64, hi: f64) -> usize {
    let mut kept: Vec<f64> = data
        .iter()
        .copied()
        .filter(|v| *v >= lo && *v <= hi)
        .collect();
    if kept.is_empty() {
        return 1;
    }
    kept.sort_by(f64::total_cmp);

    let n = kept.len() as f64;
    let ptp = kept[kept.len() - 1] - kept[0];
    let sturges = ptp / (n.log2() + 1.0);
    let iqr = percentile(&kept, 0.75) - percentile(&kept, 0.25);
    let fd = 2.0 * iqr * n.powf(-1.0 / 3.0);

    let width = if fd > 0.0 { fd.min(sturges) } else { sturges };
    if width > 0.0 {
        let bins = ((hi - lo) / width).ceil();
        if bins >= usize::MAX as f64 {
            usize::MAX
        } else {
            (bins as usize).max(1)
        }
    } else {
        1
    }
}

/// Automatic equal-width edges over `[lo, hi]`, falling back to
/// `MAX_AUTO_EDGES` edges when the estimator asks for more.
pub fn auto_edges(data: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
    let mut n_bins = auto_bin_count(data, lo, hi);
    if n_bins.saturating_add(1) > MAX_AUTO_EDGES {
        n_bins = MAX_AUTO_EDGES;
    }
    linspace(lo, hi, n_bins)
}

/// Edges must be finite, strictly increasing and describe at least one bin.
pub fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        bail!("need at least two bin edges, got {}", edges.len());
    }
    if edges.iter().any(|e| !e.is_finite()) {
        bail!("bin edges must be finite");
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        bail!("bin edges must be strictly increasing");
    }
    Ok(())
}

/// Sum `weight` per bin. Bins are half-open except the last, which also
/// takes values equal to the upper edge; anything else (including NaN) is
/// dropped.
pub fn fill(sample: &[f64], edges: &[f64], weight: f64) -> Vec<f64> {
    let last = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[last]);
    let mut counts = vec![0.0; last];
    for &v in sample {
        if !(v >= lo && v <= hi) {
            continue;
        }
        let bin = if v == hi {
            last - 1
        } else {
            edges.partition_point(|e| *e <= v) - 1
        };
        counts[bin] += weight;
    }
    counts
}
