//! # xmatch
//!
//! Epoch-corrected, one-to-one **cross-match of a reference star catalog against
//! a target catalog**, written in Rust.
//!
//! Given a reference catalog with proper motions (Gaia DR2) and a target
//! catalog observed at a later epoch (the TESS target lists), `xmatch` finds,
//! for every target, the single reference star that is unambiguously the same
//! physical object, and writes the resulting association table.
//!
//! ## Pipeline
//!
//! 1. **Epoch projection**: reference positions are moved forward by a fixed
//!    number of years of proper motion
//! 2. **Spatial index**: projected positions are binned on the sphere for fast
//!    k-nearest-neighbour queries
//! 3. **Match resolution**: a target is matched to its nearest reference star
//!    only if that star is within 1″ and the second-nearest is at least 3″ away
//! 4. **Duplicate elimination**: every claim on a reference star claimed by more
//!    than one target is dropped
//! 5. **Outlier filtering**: matches whose reference-minus-target magnitude lies
//!    outside a 4σ band around the population mean are dropped
//!
//! ## Example
//!
//! ```no_run
//! use xmatch::catalogs::{load_reference_catalog_from_file, load_target_catalogs_from_files};
//! use xmatch::crossmatch::{cross_match, write_associations_to_file, CrossMatchConfig};
//!
//! let reference = load_reference_catalog_from_file("data/gaia.csv", 0).unwrap();
//! let targets = load_target_catalogs_from_files(&["data/sector1.csv"], 5).unwrap();
//!
//! let config = CrossMatchConfig::default();
//! let output = cross_match(&reference.records, &targets.records, &config).unwrap();
//! println!("{} associations", output.associations.len());
//! write_associations_to_file("crossmatch.csv", &output.associations).unwrap();
//! ```
//!
//! The [`summary`] module builds the companion per-target table of TCE counts
//! and TOI comment flags.

pub mod aggregate;
pub mod catalogs;
pub mod comments;
pub mod crossmatch;
pub mod error;
pub mod star;
pub mod starcatalog;
pub mod summary;

pub use crossmatch::{cross_match, AssociationRecord, CrossMatchConfig, CrossMatchOutput};
pub use error::{CrossMatchError, Result};
pub use star::*;
pub use starcatalog::*;
