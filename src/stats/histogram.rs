use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Equal-width histogram; every bin is half-open except the last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bins: usize,
    pub bin_edges: Vec<f64>,
    pub frequencies: Vec<usize>,
    pub bin_width: f64,
}

/// Sturges' rule, clamped to `[min_bins, max_bins]`
pub fn sturges_bins(n: usize, min_bins: usize, max_bins: usize) -> usize {
    let raw = ((n.max(1) as f64).log2() + 1.0).ceil() as usize;
    raw.clamp(min_bins, max_bins)
}

/// Bin `values` into a Sturges-sized histogram.
///
/// A constant sample gets the range `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], min_bins: usize, max_bins: usize) -> Result<Histogram> {
    if values.is_empty() {
        return Err(PipelineError::ComputationError(
            "histogram of an empty sample".to_string(),
        ));
    }

    let bins = sturges_bins(values.len(), min_bins, max_bins);
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut bin_edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
    bin_edges[bins] = hi;

    let mut frequencies = vec![0usize; bins];
    for &v in values {
        let idx = if v >= hi {
            bins - 1
        } else {
            (((v - lo) / width) as usize).min(bins - 1)
        };
        frequencies[idx] += 1;
    }

    Ok(Histogram {
        bins,
        bin_edges,
        frequencies,
        bin_width: width,
    })
}
