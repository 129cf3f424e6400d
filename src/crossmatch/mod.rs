//! Epoch-corrected one-to-one cross-match of a reference catalog against a
//! target catalog.
//!
//! Stages, in order:
//!
//! 1. **Ingestion checks**: reject non-finite records and duplicate ids.
//! 2. **Epoch projection**: move reference positions forward by
//!    `epoch_offset_years` of proper motion.
//! 3. **Spatial index**: bin projected positions for k-NN queries.
//! 4. **Match resolver**: accept a target's nearest reference star only if it is
//!    close enough and its second-nearest is far enough ([`resolve`]).
//! 5. **Duplicate eliminator**: drop every claim on a contested reference star
//!    ([`dedup`]).
//! 6. **Outlier filter**: keep matches inside a K-sigma band of the magnitude
//!    difference ([`outlier`]).
//!
//! Structural failures (empty catalog, fewer than two reference stars, nothing
//! left for the statistics) abort the run with an error naming the stage.

pub mod dedup;
pub mod outlier;
pub mod output;
pub mod resolve;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalogs::{dedup_by_id, CatalogEntry};
use crate::error::{CrossMatchError, Result};
use crate::star::{ReferenceStar, Star, TargetStar};
use crate::starcatalog::{StarCatalog, MAX_NSIDE};

pub use dedup::{eliminate_duplicates, DedupOutcome};
pub use outlier::{filter_magnitude_outliers, MagnitudeBand, OutlierOutcome, PopulationStats};
pub use output::{write_associations, write_associations_to_file, ASSOCIATION_COLUMNS};
pub use resolve::{decide, resolve_matches, MatchDecision, ResolveOutcome};

// ── Configuration ───────────────────────────────────────────────────────────

/// Tunable thresholds of the cross-match.
///
/// The defaults are the empirically chosen values for Gaia DR2 against the
/// TESS target lists; they are not expected to carry over to other catalog
/// pairs unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossMatchConfig {
    /// Years of proper motion applied to reference positions. Default 5.0.
    pub epoch_offset_years: f64,
    /// Largest accepted nearest-neighbour distance, arcsec. Default 1.0.
    pub max_match_distance_arcsec: f64,
    /// Smallest accepted second-nearest-neighbour distance, arcsec. Default 3.0.
    pub min_disambiguation_distance_arcsec: f64,
    /// Half-width of the magnitude-difference band in standard deviations.
    /// Default 4.0.
    pub outlier_sigma_multiplier: f64,
    /// HEALPix-style nside of the spatial index, at most
    /// [`MAX_NSIDE`](crate::starcatalog::MAX_NSIDE). Default 64.
    pub catalog_nside: u32,
}

impl Default for CrossMatchConfig {
    fn default() -> Self {
        Self {
            epoch_offset_years: 5.0,
            max_match_distance_arcsec: 1.0,
            min_disambiguation_distance_arcsec: 3.0,
            outlier_sigma_multiplier: 4.0,
            catalog_nside: 64,
        }
    }
}

impl CrossMatchConfig {
    /// Load a configuration from a JSON file. Fields left out keep their
    /// defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CrossMatchConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("max_match_distance_arcsec", self.max_match_distance_arcsec),
            (
                "min_disambiguation_distance_arcsec",
                self.min_disambiguation_distance_arcsec,
            ),
            ("outlier_sigma_multiplier", self.outlier_sigma_multiplier),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(CrossMatchError::InvalidConfig(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        if !self.epoch_offset_years.is_finite() {
            return Err(CrossMatchError::InvalidConfig(format!(
                "epoch_offset_years must be finite, got {}",
                self.epoch_offset_years
            )));
        }
        if self.catalog_nside == 0 || self.catalog_nside > MAX_NSIDE {
            return Err(CrossMatchError::InvalidConfig(format!(
                "catalog_nside must be in 1..={MAX_NSIDE}, got {}",
                self.catalog_nside
            )));
        }
        Ok(())
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// A target paired with its nearest reference star.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub target_id: u64,
    pub reference_id: u64,
    pub angular_distance_arcsec: f64,
    /// Row of the target in the target table passed to the resolver.
    pub target_index: usize,
    /// Row of the reference star in the reference table (and the index).
    pub reference_index: usize,
}

/// One row of the final association table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub reference_id: u64,
    pub target_id: u64,
    pub angular_distance_arcsec: f64,
    pub reference_ra: f64,
    pub reference_dec: f64,
    pub reference_pm_ra: f64,
    pub reference_pm_dec: f64,
    pub reference_magnitude: f64,
    /// Empty in the CSV when the reference catalog has no value.
    pub reference_parallax: Option<f64>,
    pub reference_parallax_error: Option<f64>,
    pub reference_l: Option<f64>,
    pub reference_b: Option<f64>,
    pub target_ra: f64,
    pub target_dec: f64,
    pub target_magnitude: f64,
    pub magnitude_diff: f64,
}

impl AssociationRecord {
    fn join(candidate: &MatchCandidate, reference: &ReferenceStar, target: &TargetStar) -> Self {
        Self {
            reference_id: reference.id,
            target_id: target.id,
            angular_distance_arcsec: candidate.angular_distance_arcsec,
            reference_ra: reference.ra,
            reference_dec: reference.dec,
            reference_pm_ra: reference.pm_ra,
            reference_pm_dec: reference.pm_dec,
            reference_magnitude: reference.magnitude,
            reference_parallax: reference.parallax,
            reference_parallax_error: reference.parallax_error,
            reference_l: reference.l,
            reference_b: reference.b,
            target_ra: target.ra,
            target_dec: target.dec,
            target_magnitude: target.magnitude,
            magnitude_diff: reference.magnitude - target.magnitude,
        }
    }
}

/// Per-stage counts of one run, so attrition can be traced to a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossMatchDiagnostics {
    pub reference_records: usize,
    pub reference_malformed: usize,
    pub reference_duplicates: usize,
    pub target_records: usize,
    pub target_malformed: usize,
    pub target_duplicates: usize,
    /// Reference stars in the spatial index.
    pub indexed_reference_stars: usize,
    /// Targets queried against the index.
    pub queried_targets: usize,
    pub accepted: usize,
    pub rejected_too_far: usize,
    pub rejected_ambiguous: usize,
    pub mean_distance_arcsec: Option<f64>,
    pub contested_references: usize,
    pub duplicate_claims_removed: usize,
    pub after_duplicate_elimination: usize,
    pub magnitude_diff: Option<PopulationStats>,
    pub magnitude_band: Option<MagnitudeBand>,
    pub outliers_removed: usize,
    pub final_matches: usize,
}

/// Association table plus the diagnostics of the run that produced it.
#[derive(Debug, Clone)]
pub struct CrossMatchOutput {
    pub associations: Vec<AssociationRecord>,
    pub diagnostics: CrossMatchDiagnostics,
}

// ── Pipeline ────────────────────────────────────────────────────────────────

/// Keep finite, first-seen-unique records. Returns survivors plus the
/// malformed and duplicate counts.
fn admit<T, F>(records: &[T], catalog: &str, validate: F) -> (Vec<T>, usize, usize)
where
    T: Clone + CatalogEntry,
    F: Fn(&T, usize) -> Result<()>,
{
    let mut malformed = 0usize;
    let mut valid = Vec::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        match validate(record, row) {
            Ok(()) => valid.push(record.clone()),
            Err(e) => {
                debug!("Dropping {} record {}: {}", catalog, record.id(), e);
                malformed += 1;
            }
        }
    }
    let (kept, duplicates) = dedup_by_id(valid);
    (kept, malformed, duplicates)
}

/// Run the full cross-match over two in-memory tables.
///
/// Inputs are not modified. Output rows follow target order, so identical
/// inputs produce identical tables.
pub fn cross_match(
    reference: &[ReferenceStar],
    targets: &[TargetStar],
    config: &CrossMatchConfig,
) -> Result<CrossMatchOutput> {
    config.validate()?;

    let mut diag = CrossMatchDiagnostics {
        reference_records: reference.len(),
        target_records: targets.len(),
        ..Default::default()
    };

    let (reference, malformed, duplicates) = admit(reference, "reference", ReferenceStar::validate);
    diag.reference_malformed = malformed;
    diag.reference_duplicates = duplicates;
    let (targets, malformed, duplicates) = admit(targets, "target", TargetStar::validate);
    diag.target_malformed = malformed;
    diag.target_duplicates = duplicates;
    info!(
        "Reference stars: {} ({} malformed, {} duplicates dropped)",
        reference.len(),
        diag.reference_malformed,
        diag.reference_duplicates
    );
    info!(
        "Target stars: {} ({} malformed, {} duplicates dropped)",
        targets.len(),
        diag.target_malformed,
        diag.target_duplicates
    );

    info!(
        "Projecting reference positions by {} years of proper motion",
        config.epoch_offset_years
    );
    let projected: Vec<Star> = reference
        .iter()
        .map(|r| r.project(config.epoch_offset_years))
        .collect();

    let index = StarCatalog::new(config.catalog_nside, projected)?;
    diag.indexed_reference_stars = index.len();
    info!(
        "Built spatial index over {} reference stars with nside={}",
        index.len(),
        index.nside()
    );

    diag.queried_targets = targets.len();
    let resolved = resolve_matches(&index, &targets, config)?;
    diag.accepted = resolved.candidates.len();
    diag.rejected_too_far = resolved.rejected_too_far;
    diag.rejected_ambiguous = resolved.rejected_ambiguous;
    diag.mean_distance_arcsec = resolved.mean_distance_arcsec();

    let deduped = eliminate_duplicates(resolved.candidates);
    diag.contested_references = deduped.contested_references;
    diag.duplicate_claims_removed = deduped.removed;
    diag.after_duplicate_elimination = deduped.candidates.len();

    let filtered = filter_magnitude_outliers(
        deduped.candidates,
        &reference,
        &targets,
        config.outlier_sigma_multiplier,
    )?;
    diag.magnitude_diff = Some(filtered.stats);
    diag.magnitude_band = Some(filtered.band);
    diag.outliers_removed = filtered.removed;

    let associations: Vec<AssociationRecord> = filtered
        .candidates
        .iter()
        .map(|c| {
            AssociationRecord::join(c, &reference[c.reference_index], &targets[c.target_index])
        })
        .collect();
    diag.final_matches = associations.len();
    info!("Cross-match complete: {} associations", associations.len());

    Ok(CrossMatchOutput {
        associations,
        diagnostics: diag,
    })
}
