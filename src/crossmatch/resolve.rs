//! Match resolver: 2-NN query per target with an absolute proximity threshold
//! and a disambiguation threshold on the second-nearest neighbour.

use rayon::prelude::*;
use tracing::info;

use crate::error::{CrossMatchError, Result};
use crate::star::TargetStar;
use crate::StarCatalog;

use super::{CrossMatchConfig, MatchCandidate};

/// Neighbours queried per target: the candidate plus its closest rival.
pub const NEIGHBOURS_PER_TARGET: usize = 2;

/// Outcome of the accept/reject test for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Accepted,
    /// Nearest reference star is beyond `max_match_distance_arcsec`.
    TooFar,
    /// Second-nearest reference star is closer than
    /// `min_disambiguation_distance_arcsec`.
    Ambiguous,
}

/// Apply both thresholds to the distances (arcsec) of the two nearest
/// reference stars.
pub fn decide(nearest_arcsec: f64, second_arcsec: f64, config: &CrossMatchConfig) -> MatchDecision {
    if nearest_arcsec > config.max_match_distance_arcsec {
        MatchDecision::TooFar
    } else if second_arcsec < config.min_disambiguation_distance_arcsec {
        MatchDecision::Ambiguous
    } else {
        MatchDecision::Accepted
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Accepted candidates, in target order.
    pub candidates: Vec<MatchCandidate>,
    pub rejected_too_far: usize,
    pub rejected_ambiguous: usize,
}

impl ResolveOutcome {
    /// Mean angular distance of the accepted candidates, if any.
    pub fn mean_distance_arcsec(&self) -> Option<f64> {
        if self.candidates.is_empty() {
            return None;
        }
        let sum: f64 = self.candidates.iter().map(|c| c.angular_distance_arcsec).sum();
        Some(sum / self.candidates.len() as f64)
    }
}

/// Resolve every target against the index.
///
/// Queries run on the rayon pool against the shared, immutable index. Results
/// are gathered in target order so the output does not depend on scheduling.
pub fn resolve_matches(
    index: &StarCatalog,
    targets: &[TargetStar],
    config: &CrossMatchConfig,
) -> Result<ResolveOutcome> {
    if index.len() < NEIGHBOURS_PER_TARGET {
        return Err(CrossMatchError::InsufficientCandidates {
            requested: NEIGHBOURS_PER_TARGET,
            available: index.len(),
        });
    }

    let decisions: Vec<(MatchDecision, Option<MatchCandidate>)> = targets
        .par_iter()
        .enumerate()
        .map(|(target_index, target)| {
            let nn = index.query_knn(target.ra, target.dec, NEIGHBOURS_PER_TARGET)?;
            let nearest = nn[0].distance_arcsec();
            let decision = decide(nearest, nn[1].distance_arcsec(), config);
            let candidate = (decision == MatchDecision::Accepted).then(|| MatchCandidate {
                target_id: target.id,
                reference_id: index.stars()[nn[0].index].id,
                angular_distance_arcsec: nearest,
                target_index,
                reference_index: nn[0].index,
            });
            Ok((decision, candidate))
        })
        .collect::<Result<_>>()?;

    let mut outcome = ResolveOutcome::default();
    for (decision, candidate) in decisions {
        match decision {
            MatchDecision::Accepted => outcome.candidates.extend(candidate),
            MatchDecision::TooFar => outcome.rejected_too_far += 1,
            MatchDecision::Ambiguous => outcome.rejected_ambiguous += 1,
        }
    }

    info!(
        "Matched {} targets out of {} ({} too far, {} ambiguous)",
        outcome.candidates.len(),
        targets.len(),
        outcome.rejected_too_far,
        outcome.rejected_ambiguous
    );
    if let Some(mean) = outcome.mean_distance_arcsec() {
        info!("Mean angular distance: {:.3} arcsec", mean);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star::{Star, ARCSEC_PER_DEGREE};

    const AS: f64 = 1.0 / ARCSEC_PER_DEGREE;

    fn star(id: u64, ra_deg: f64, dec_deg: f64) -> Star {
        Star {
            id,
            ra_deg,
            dec_deg,
            mag: 10.0,
        }
    }

    fn target(id: u64, ra: f64, dec: f64) -> TargetStar {
        TargetStar {
            id,
            ra,
            dec,
            magnitude: 9.5,
        }
    }

    #[test]
    fn disambiguation_boundary() {
        let config = CrossMatchConfig::default();
        assert_eq!(decide(0.9, 2.9, &config), MatchDecision::Ambiguous);
        assert_eq!(decide(0.9, 3.1, &config), MatchDecision::Accepted);
        assert_eq!(decide(1.1, 30.0, &config), MatchDecision::TooFar);
        // both thresholds are inclusive
        assert_eq!(decide(1.0, 3.0, &config), MatchDecision::Accepted);
    }

    #[test]
    fn resolves_against_index_geometry() {
        // Target 100 sits 0.9" from star 1 and 2.9" from star 2 -> ambiguous.
        // Target 200 sits 0.9" from star 3 and 3.1" from star 4 -> accepted.
        // Target 300 is 5" from everything near it -> too far.
        let index = StarCatalog::new(
            64,
            vec![
                star(1, 10.0, 0.9 * AS),
                star(2, 10.0, -2.9 * AS),
                star(3, 20.0, 0.9 * AS),
                star(4, 20.0, -3.1 * AS),
                star(5, 30.0, 5.0 * AS),
                star(6, 30.0, -15.0 * AS),
            ],
        )
        .unwrap();
        let targets = vec![
            target(100, 10.0, 0.0),
            target(200, 20.0, 0.0),
            target(300, 30.0, 0.0),
        ];

        let outcome = resolve_matches(&index, &targets, &CrossMatchConfig::default()).unwrap();
        assert_eq!(outcome.rejected_ambiguous, 1);
        assert_eq!(outcome.rejected_too_far, 1);
        assert_eq!(outcome.candidates.len(), 1);

        let c = &outcome.candidates[0];
        assert_eq!((c.target_id, c.reference_id), (200, 3));
        assert_eq!((c.target_index, c.reference_index), (1, 2));
        assert!((c.angular_distance_arcsec - 0.9).abs() < 1e-6);
        assert!((outcome.mean_distance_arcsec().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn single_reference_star_fails_fast() {
        let index = StarCatalog::new(8, vec![star(1, 0.0, 0.0)]).unwrap();
        let err = resolve_matches(&index, &[target(1, 0.0, 0.0)], &CrossMatchConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CrossMatchError::InsufficientCandidates {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn candidates_follow_target_order() {
        let stars: Vec<Star> = (0..50).map(|i| star(i, i as f64 * 0.5, 10.0)).collect();
        let index = StarCatalog::new(32, stars).unwrap();
        let targets: Vec<TargetStar> = (0..50)
            .rev()
            .map(|i| target(1000 + i, i as f64 * 0.5, 10.0 + 0.2 * AS))
            .collect();
        let outcome = resolve_matches(&index, &targets, &CrossMatchConfig::default()).unwrap();
        assert_eq!(outcome.candidates.len(), 50);
        let ref_ids: Vec<u64> = outcome.candidates.iter().map(|c| c.reference_id).collect();
        let expected: Vec<u64> = (0..50).rev().collect();
        assert_eq!(ref_ids, expected);
    }
}
