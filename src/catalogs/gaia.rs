//! Reference catalog reader (Gaia DR2 style).
//!
//! Expected columns: `id, ra, dec, pm_ra, pm_dec, magnitude`. The Gaia archive
//! names `source_id, pmra, pmdec, phot_g_mean_mag` are accepted as aliases.
//! `parallax, parallax_error, l, b` are optional and passed through to the
//! association table; any other columns are ignored.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{CrossMatchError, Result};
use crate::star::ReferenceStar;

use super::{csv_reader, finish, read_rows, LoadedCatalog};

#[derive(Debug, Deserialize)]
struct ReferenceCsvRecord {
    #[serde(alias = "source_id", default, deserialize_with = "csv::invalid_option")]
    id: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    ra: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    dec: Option<f64>,
    #[serde(alias = "pmra", default, deserialize_with = "csv::invalid_option")]
    pm_ra: Option<f64>,
    #[serde(alias = "pmdec", default, deserialize_with = "csv::invalid_option")]
    pm_dec: Option<f64>,
    #[serde(
        alias = "phot_g_mean_mag",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    magnitude: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    parallax: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    parallax_error: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    b: Option<f64>,
}

impl ReferenceCsvRecord {
    fn into_star(self, row: usize) -> Result<ReferenceStar> {
        let missing = |field| CrossMatchError::MalformedRecord {
            catalog: "reference",
            row,
            field,
        };
        let star = ReferenceStar {
            id: self.id.ok_or_else(|| missing("id"))?,
            ra: self.ra.ok_or_else(|| missing("ra"))?,
            dec: self.dec.ok_or_else(|| missing("dec"))?,
            pm_ra: self.pm_ra.ok_or_else(|| missing("pm_ra"))?,
            pm_dec: self.pm_dec.ok_or_else(|| missing("pm_dec"))?,
            magnitude: self.magnitude.ok_or_else(|| missing("magnitude"))?,
            parallax: finite(self.parallax),
            parallax_error: finite(self.parallax_error),
            l: finite(self.l),
            b: finite(self.b),
        };
        star.validate(row)?;
        Ok(star)
    }
}

/// Optional pass-through columns: blank, unparseable or non-finite becomes
/// `None` without rejecting the row.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Read a reference catalog from any CSV stream.
///
/// Stars without proper motion are rejected rather than treated as stationary.
pub fn load_reference_catalog<R: Read>(
    rdr: R,
    skip_lines: usize,
) -> Result<LoadedCatalog<ReferenceStar>> {
    let mut csv_rdr = csv_reader(rdr, skip_lines)?;
    let (records, stats) = read_rows(&mut csv_rdr, "reference", ReferenceCsvRecord::into_star)?;
    let loaded = finish(records, stats);
    info!(
        "Loaded {} reference stars ({} rows, {} malformed, {} duplicate ids)",
        loaded.records.len(),
        loaded.stats.rows,
        loaded.stats.malformed,
        loaded.stats.duplicates
    );
    Ok(loaded)
}

pub fn load_reference_catalog_from_file<P: AsRef<Path>>(
    path: P,
    skip_lines: usize,
) -> Result<LoadedCatalog<ReferenceStar>> {
    info!("Loading reference catalog from {}", path.as_ref().display());
    let file = std::fs::File::open(path)?;
    load_reference_catalog(file, skip_lines)
}
