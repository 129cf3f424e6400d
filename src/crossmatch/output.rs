//! Association table writer.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::Result;

use super::AssociationRecord;

/// Header row, in [`AssociationRecord`] field order.
pub const ASSOCIATION_COLUMNS: [&str; 16] = [
    "reference_id",
    "target_id",
    "angular_distance_arcsec",
    "reference_ra",
    "reference_dec",
    "reference_pm_ra",
    "reference_pm_dec",
    "reference_magnitude",
    "reference_parallax",
    "reference_parallax_error",
    "reference_l",
    "reference_b",
    "target_ra",
    "target_dec",
    "target_magnitude",
    "magnitude_diff",
];

/// Write the association table as CSV. The header is always written, even
/// for an empty table.
pub fn write_associations<W: Write>(writer: W, records: &[AssociationRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(ASSOCIATION_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_associations_to_file<P: AsRef<Path>>(
    path: P,
    records: &[AssociationRecord],
) -> Result<()> {
    let file = std::fs::File::create(&path)?;
    write_associations(std::io::BufWriter::new(file), records)?;
    info!(
        "Wrote {} associations to {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(())
}
