//! Error type shared by every stage of the cross-match pipeline.
//!
//! Per-record problems (`MalformedRecord`) are normally caught at ingestion,
//! logged and counted; the remaining variants are structural and abort a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrossMatchError {
    #[error("spatial index: cannot build an index over an empty reference catalog")]
    EmptyCatalog,

    #[error(
        "spatial index: {requested} nearest neighbours requested but only {available} stars are indexed"
    )]
    InsufficientCandidates { requested: usize, available: usize },

    #[error("{catalog} catalog row {row}: field `{field}` is missing or not finite")]
    MalformedRecord {
        catalog: &'static str,
        row: usize,
        field: &'static str,
    },

    #[error("spatial index: query position ({ra_deg}, {dec_deg}) is not finite")]
    NonFiniteQuery { ra_deg: f64, dec_deg: f64 },

    #[error("outlier filter: no candidates survived duplicate elimination, magnitude statistics are undefined")]
    EmptyPopulation,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrossMatchError>;
