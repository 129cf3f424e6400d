//! Outlier filter on the reference-minus-target magnitude difference.
//!
//! True matches cluster tightly around a near-constant photometric offset
//! between the two systems; spurious matches scatter widely. The band is fitted
//! once over the final population and never re-fitted.

use serde::Serialize;
use tracing::info;

use crate::error::{CrossMatchError, Result};
use crate::star::{ReferenceStar, TargetStar};

use super::MatchCandidate;

/// Population (divide-by-N) mean and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopulationStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl PopulationStats {
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(CrossMatchError::EmptyPopulation);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Ok(Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

/// Closed interval `[mean - k*sigma, mean + k*sigma]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MagnitudeBand {
    pub lower: f64,
    pub upper: f64,
}

impl MagnitudeBand {
    pub fn new(stats: &PopulationStats, sigma_multiplier: f64) -> Self {
        let half_width = sigma_multiplier * stats.std_dev;
        Self {
            lower: stats.mean - half_width,
            upper: stats.mean + half_width,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone)]
pub struct OutlierOutcome {
    pub candidates: Vec<MatchCandidate>,
    pub stats: PopulationStats,
    pub band: MagnitudeBand,
    pub removed: usize,
}

/// `reference_magnitude - target_magnitude` for one candidate.
pub fn magnitude_diff(
    candidate: &MatchCandidate,
    reference: &[ReferenceStar],
    targets: &[TargetStar],
) -> f64 {
    reference[candidate.reference_index].magnitude - targets[candidate.target_index].magnitude
}

/// Keep candidates whose magnitude difference lies within
/// `sigma_multiplier` population standard deviations of the mean.
pub fn filter_magnitude_outliers(
    candidates: Vec<MatchCandidate>,
    reference: &[ReferenceStar],
    targets: &[TargetStar],
    sigma_multiplier: f64,
) -> Result<OutlierOutcome> {
    let diffs: Vec<f64> = candidates
        .iter()
        .map(|c| magnitude_diff(c, reference, targets))
        .collect();
    let stats = PopulationStats::from_values(&diffs)?;
    let band = MagnitudeBand::new(&stats, sigma_multiplier);
    info!(
        "Mag diffs mean, sd: [{:.3}, {:.4}], band [{:.3}, {:.3}]",
        stats.mean, stats.std_dev, band.lower, band.upper
    );

    let before = candidates.len();
    let kept: Vec<MatchCandidate> = candidates
        .into_iter()
        .zip(diffs)
        .filter(|(_, d)| band.contains(*d))
        .map(|(c, _)| c)
        .collect();

    info!("Length after mag diff outlier removal: {}", kept.len());
    Ok(OutlierOutcome {
        removed: before - kept.len(),
        candidates: kept,
        stats,
        band,
    })
}
