//! Catalog ingestion: CSV readers for the reference (Gaia) and target (TESS)
//! catalogs.
//!
//! Rows with a missing, unparseable or non-finite required field are rejected
//! and counted, never coerced. Records are deduplicated by id with the first
//! occurrence winning.

pub mod gaia;
pub mod tess;

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::star::{ReferenceStar, TargetStar};

pub use gaia::{load_reference_catalog, load_reference_catalog_from_file};
pub use tess::{load_target_catalog, load_target_catalogs_from_files};

/// Row counts gathered while loading one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Data rows read, including rejected ones.
    pub rows: usize,
    /// Rows rejected because a required field was missing or not finite.
    pub malformed: usize,
    /// Valid rows dropped because their id was already seen.
    pub duplicates: usize,
}

impl LoadStats {
    /// Rows that survived validation and deduplication.
    pub fn accepted(&self) -> usize {
        self.rows - self.malformed - self.duplicates
    }

    fn merge(&mut self, other: &LoadStats) {
        self.rows += other.rows;
        self.malformed += other.malformed;
        self.duplicates += other.duplicates;
    }
}

/// A validated, deduplicated catalog plus the counts that describe how it was
/// obtained.
#[derive(Debug, Clone)]
pub struct LoadedCatalog<T> {
    pub records: Vec<T>,
    pub stats: LoadStats,
}

/// Anything with a catalog identifier.
pub trait CatalogEntry {
    fn id(&self) -> u64;
}

impl CatalogEntry for ReferenceStar {
    fn id(&self) -> u64 {
        self.id
    }
}

impl CatalogEntry for TargetStar {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Drop records whose id has already been seen. Returns the survivors, in
/// their original order, and the number dropped.
pub fn dedup_by_id<T: CatalogEntry>(records: Vec<T>) -> (Vec<T>, usize) {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<T> = records.into_iter().filter(|r| seen.insert(r.id())).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Open a CSV stream, discarding `skip_lines` preamble lines first.
/// Lines starting with `#` are ignored and fields are trimmed.
pub(crate) fn csv_reader<R: Read>(rdr: R, skip_lines: usize) -> Result<csv::Reader<BufReader<R>>> {
    let mut buf = BufReader::new(rdr);
    let mut line = String::new();
    for _ in 0..skip_lines {
        line.clear();
        if buf.read_line(&mut line)? == 0 {
            break;
        }
    }
    Ok(csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(buf))
}

/// Deserialize every row of `rdr` as `Raw` and convert it with `convert`.
///
/// Rows that fail to deserialize or convert are counted as malformed; only
/// I/O failures abort the read.
pub(crate) fn read_rows<R, Raw, T, F>(
    rdr: &mut csv::Reader<R>,
    catalog: &'static str,
    convert: F,
) -> Result<(Vec<T>, LoadStats)>
where
    R: Read,
    Raw: DeserializeOwned,
    F: Fn(Raw, usize) -> Result<T>,
{
    let mut records = Vec::new();
    let mut stats = LoadStats::default();
    for (row, result) in rdr.deserialize::<Raw>().enumerate() {
        stats.rows += 1;
        let converted = match result {
            Ok(raw) => convert(raw, row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => Err(e.into()),
        };
        match converted {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!("Rejected {} row {}: {}", catalog, row, e);
                stats.malformed += 1;
            }
        }
    }
    Ok((records, stats))
}

/// Deduplicate by id and fold the dropped count into `stats`.
pub(crate) fn finish<T: CatalogEntry>(records: Vec<T>, mut stats: LoadStats) -> LoadedCatalog<T> {
    let (records, duplicates) = dedup_by_id(records);
    stats.duplicates += duplicates;
    LoadedCatalog { records, stats }
}

/// Concatenate several partially loaded catalogs (before deduplication).
pub(crate) fn concat<T>(parts: Vec<(Vec<T>, LoadStats)>) -> (Vec<T>, LoadStats) {
    let mut all = Vec::new();
    let mut stats = LoadStats::default();
    for (records, part_stats) in parts {
        all.extend(records);
        stats.merge(&part_stats);
    }
    (all, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: u64, magnitude: f64) -> TargetStar {
        TargetStar {
            id,
            ra: 1.0,
            dec: 2.0,
            magnitude,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let (kept, dropped) = dedup_by_id(vec![
            target(5, 1.0),
            target(3, 2.0),
            target(5, 3.0),
            target(3, 4.0),
            target(9, 5.0),
        ]);
        assert_eq!(dropped, 2);
        let summary: Vec<(u64, f64)> = kept.iter().map(|t| (t.id, t.magnitude)).collect();
        assert_eq!(summary, vec![(5, 1.0), (3, 2.0), (9, 5.0)]);
    }

    #[test]
    fn accepted_is_rows_minus_rejections() {
        let stats = LoadStats {
            rows: 10,
            malformed: 2,
            duplicates: 3,
        };
        assert_eq!(stats.accepted(), 5);
    }
}
