//! Duplicate eliminator.
//!
//! A reference star claimed as nearest neighbour by more than one target is
//! ambiguous at the catalog level; every claim on it is dropped rather than
//! arbitrated.

use std::collections::HashSet;

use tracing::info;

use crate::aggregate::count_by_key;

use super::MatchCandidate;

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Surviving candidates, in their original order.
    pub candidates: Vec<MatchCandidate>,
    /// Reference ids that were claimed more than once.
    pub contested_references: usize,
    /// Candidates dropped because their reference id was contested.
    pub removed: usize,
}

/// Drop every candidate whose `reference_id` appears more than once.
///
/// Must see the complete candidate set; running it on a partial set would
/// miss claims made from other partitions.
pub fn eliminate_duplicates(candidates: Vec<MatchCandidate>) -> DedupOutcome {
    let contested: HashSet<u64> = count_by_key(&candidates, |c| c.reference_id)
        .into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|(id, _)| id)
        .collect();

    let before = candidates.len();
    let survivors: Vec<MatchCandidate> = candidates
        .into_iter()
        .filter(|c| !contested.contains(&c.reference_id))
        .collect();

    let outcome = DedupOutcome {
        removed: before - survivors.len(),
        contested_references: contested.len(),
        candidates: survivors,
    };
    info!(
        "Length after removal of reference duplicates: {} ({} candidates on {} contested reference stars dropped)",
        outcome.candidates.len(),
        outcome.removed,
        outcome.contested_references
    );
    outcome
}
