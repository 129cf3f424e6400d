//! Target catalog reader (TESS target lists).
//!
//! Expected columns: `id, ra, dec, magnitude`. The TESS target-list names
//! `TICID, RA, Dec, Tmag` (and `tess_ra`, `tess_dec`) are accepted as aliases.
//! The per-sector target lists published by the mission carry a short text
//! preamble and overlap each other; several files can be concatenated and are
//! deduplicated as one table.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{CrossMatchError, Result};
use crate::star::TargetStar;

use super::{concat, csv_reader, finish, read_rows, LoadStats, LoadedCatalog};

#[derive(Debug, Deserialize)]
struct TargetCsvRecord {
    #[serde(
        alias = "TICID",
        alias = "ticid",
        alias = "TIC",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    id: Option<u64>,
    #[serde(
        alias = "RA",
        alias = "tess_ra",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    ra: Option<f64>,
    #[serde(
        alias = "Dec",
        alias = "DEC",
        alias = "tess_dec",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    dec: Option<f64>,
    #[serde(alias = "Tmag", default, deserialize_with = "csv::invalid_option")]
    magnitude: Option<f64>,
}

impl TargetCsvRecord {
    fn into_star(self, row: usize) -> Result<TargetStar> {
        let missing = |field| CrossMatchError::MalformedRecord {
            catalog: "target",
            row,
            field,
        };
        let star = TargetStar {
            id: self.id.ok_or_else(|| missing("id"))?,
            ra: self.ra.ok_or_else(|| missing("ra"))?,
            dec: self.dec.ok_or_else(|| missing("dec"))?,
            magnitude: self.magnitude.ok_or_else(|| missing("magnitude"))?,
        };
        star.validate(row)?;
        Ok(star)
    }
}

fn read_targets<R: Read>(rdr: R, skip_lines: usize) -> Result<(Vec<TargetStar>, LoadStats)> {
    let mut csv_rdr = csv_reader(rdr, skip_lines)?;
    read_rows(&mut csv_rdr, "target", TargetCsvRecord::into_star)
}

/// Read a single target catalog from any CSV stream.
pub fn load_target_catalog<R: Read>(rdr: R, skip_lines: usize) -> Result<LoadedCatalog<TargetStar>> {
    let (records, stats) = read_targets(rdr, skip_lines)?;
    let loaded = finish(records, stats);
    log_loaded(&loaded);
    Ok(loaded)
}

/// Read and concatenate several target-list files, in order, then deduplicate
/// the combined table by TIC id.
pub fn load_target_catalogs_from_files<P: AsRef<Path>>(
    paths: &[P],
    skip_lines: usize,
) -> Result<LoadedCatalog<TargetStar>> {
    let mut parts = Vec::with_capacity(paths.len());
    for path in paths {
        info!("Loading target list from {}", path.as_ref().display());
        let file = std::fs::File::open(path)?;
        parts.push(read_targets(file, skip_lines)?);
    }
    let (records, stats) = concat(parts);
    let loaded = finish(records, stats);
    log_loaded(&loaded);
    Ok(loaded)
}

fn log_loaded(loaded: &LoadedCatalog<TargetStar>) {
    info!(
        "Loaded {} target stars ({} rows, {} malformed, {} duplicate ids)",
        loaded.records.len(),
        loaded.stats.rows,
        loaded.stats.malformed,
        loaded.stats.duplicates
    );
}
