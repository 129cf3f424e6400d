//! Spatial star catalog optimized for cone searches and exact k-nearest-neighbour
//! queries over angular distance.
//!
//! `StarCatalog` stores stars in a HEALPix-style spherical binning:
//! latitude is partitioned into `3 * nside` bins in `z = sin(dec)`, and
//! longitude into `4 * nside` bins in right ascension, for a total of
//! `12 * nside^2` equal-area cells. Each cell maps to a compact slice of star
//! indices.
//!
//! Cone query flow:
//! 1. Compute the cells intersecting the cone around a pointing direction.
//! 2. Scan only stars in those cells.
//! 3. Apply exact great-circle filtering.
//!
//! k-NN queries run cone queries with a radius that starts at a few arcseconds
//! (or half a cell, if smaller) and doubles until at least `k` stars are inside. Every star outside the cone is
//! farther than every star inside it, so the first `k` hits (sorted by
//! distance, then by index) are the exact answer.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::Vector3;

use crate::error::{CrossMatchError, Result};
use crate::star::{radec_deg_to_uvec, Star, ARCSEC_PER_DEGREE};

/// Cells are selected with this much slack (radians) so that rounding in
/// `sin`/`asin` never drops a boundary star.
const CELL_SELECTION_PAD_RAD: f64 = 1e-9;

/// First k-NN search radius: 4 arcsec, just above the usual disambiguation
/// distance, so a 2-NN query in a crowded field only scans a handful of stars.
const KNN_INITIAL_RADIUS_RAD: f64 = 4.0 / (ARCSEC_PER_DEGREE * 180.0) * PI;

/// Largest accepted `nside`: 12 * 1024^2 cells, about 3.4 arcmin each.
pub const MAX_NSIDE: u32 = 1024;

/// A neighbour returned by [`StarCatalog::query_knn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index into [`StarCatalog::stars`].
    pub index: usize,
    /// Great-circle distance in radians.
    pub distance_rad: f64,
}

impl Neighbor {
    pub fn distance_arcsec(&self) -> f64 {
        self.distance_rad.to_degrees() * ARCSEC_PER_DEGREE
    }
}

#[derive(Debug, Clone)]
pub struct StarCatalog {
    nside: u32,
    n_lat: u32,
    n_lon: u32,
    stars: Vec<Star>,
    star_vectors: Vec<Vector3<f64>>,
    cell_offsets: Vec<u32>,
    star_indices: Vec<u32>,
}

impl StarCatalog {
    /// Build a catalog and spatial index from owned stars.
    ///
    /// `nside` controls resolution and must be greater than zero.
    /// Star order is preserved and defines the tie-break order of queries.
    pub fn new(nside: u32, stars: Vec<Star>) -> Result<Self> {
        if nside == 0 {
            return Err(CrossMatchError::InvalidConfig(
                "catalog_nside must be > 0".to_string(),
            ));
        }
        if stars.is_empty() {
            return Err(CrossMatchError::EmptyCatalog);
        }
        for (row, star) in stars.iter().enumerate() {
            if !star.ra_deg.is_finite() {
                return Err(CrossMatchError::MalformedRecord {
                    catalog: "reference",
                    row,
                    field: "ra",
                });
            }
            if !star.dec_deg.is_finite() {
                return Err(CrossMatchError::MalformedRecord {
                    catalog: "reference",
                    row,
                    field: "dec",
                });
            }
        }

        let (n_lat, n_lon, n_cells) = Self::grid_for_nside(nside)?;

        let star_vectors: Vec<Vector3<f64>> = stars.iter().map(|s| s.uvec()).collect();
        let star_cells: Vec<u32> = star_vectors
            .iter()
            .map(|v| Self::cell_for_uvec(n_lat, n_lon, v))
            .collect();

        // Counting sort of star indices by cell; within a cell, construction order.
        let mut cell_offsets = vec![0u32; n_cells + 1];
        for &cell in &star_cells {
            cell_offsets[cell as usize + 1] += 1;
        }
        for cell in 0..n_cells {
            cell_offsets[cell + 1] += cell_offsets[cell];
        }
        let mut next_slot: Vec<u32> = cell_offsets[..n_cells].to_vec();
        let mut star_indices = vec![0u32; stars.len()];
        for (star_idx, &cell) in star_cells.iter().enumerate() {
            let slot = &mut next_slot[cell as usize];
            star_indices[*slot as usize] = star_idx as u32;
            *slot += 1;
        }

        Ok(Self {
            nside,
            n_lat,
            n_lon,
            stars,
            star_vectors,
            cell_offsets,
            star_indices,
        })
    }

    /// Latitude bins, longitude bins and total cells for `nside`.
    fn grid_for_nside(nside: u32) -> Result<(u32, u32, usize)> {
        if nside > MAX_NSIDE {
            return Err(CrossMatchError::InvalidConfig(format!(
                "catalog_nside must be <= {MAX_NSIDE}, got {nside}"
            )));
        }
        let too_large =
            || CrossMatchError::InvalidConfig(format!("catalog_nside {nside} is too large"));
        let n_lat = nside.checked_mul(3).ok_or_else(too_large)?;
        let n_lon = nside.checked_mul(4).ok_or_else(too_large)?;
        let n_cells = n_lat.checked_mul(n_lon).ok_or_else(too_large)?;
        Ok((n_lat, n_lon, n_cells as usize))
    }

    /// Return the index resolution parameter.
    pub fn nside(&self) -> u32 {
        self.nside
    }

    /// Return the total number of stars in the catalog.
    pub fn len(&self) -> usize {
        self.stars.len()
    }

    /// Always `false` for a successfully built catalog; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Return all catalog stars in construction order.
    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    /// Approximate angular size of one cell, in radians.
    fn cell_scale_rad(&self) -> f64 {
        (4.0 * PI / (self.n_lat * self.n_lon) as f64).sqrt()
    }

    /// Query stars within an angular radius of a position.
    ///
    /// Input coordinates are in degrees, `radius_rad` in radians.
    /// Returns indices into [`Self::stars`], ascending.
    pub fn query_indices(&self, ra_deg: f64, dec_deg: f64, radius_rad: f64) -> Vec<usize> {
        let dir = radec_deg_to_uvec(ra_deg, dec_deg);
        let mut hits = self.cone_neighbors(&dir, radius_rad.clamp(0.0, PI));
        hits.sort_unstable_by_key(|n| n.index);
        hits.into_iter().map(|n| n.index).collect()
    }

    /// Query stars within an angular radius of a position.
    /// Returns references to matching stars.
    pub fn query_stars(&self, ra_deg: f64, dec_deg: f64, radius_rad: f64) -> Vec<&Star> {
        self.query_indices(ra_deg, dec_deg, radius_rad)
            .into_iter()
            .map(|idx| &self.stars[idx])
            .collect()
    }

    /// Find the `k` stars nearest to a position by great-circle distance.
    ///
    /// Returns exactly `k` neighbours, ascending by distance, ties broken by
    /// construction order.
    pub fn query_knn(&self, ra_deg: f64, dec_deg: f64, k: usize) -> Result<Vec<Neighbor>> {
        if k > self.len() {
            return Err(CrossMatchError::InsufficientCandidates {
                requested: k,
                available: self.len(),
            });
        }
        if !ra_deg.is_finite() || !dec_deg.is_finite() {
            return Err(CrossMatchError::NonFiniteQuery { ra_deg, dec_deg });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let dir = radec_deg_to_uvec(ra_deg, dec_deg);
        let mut radius = KNN_INITIAL_RADIUS_RAD.min(0.5 * self.cell_scale_rad());
        loop {
            let mut hits = self.cone_neighbors(&dir, radius);
            if hits.len() >= k || radius >= PI {
                hits.sort_unstable_by(|a, b| {
                    a.distance_rad
                        .total_cmp(&b.distance_rad)
                        .then(a.index.cmp(&b.index))
                });
                hits.truncate(k);
                return Ok(hits);
            }
            radius = (radius * 2.0).min(PI);
        }
    }

    /// All stars within `radius` of the unit vector `dir`, unordered.
    fn cone_neighbors(&self, dir: &Vector3<f64>, radius: f64) -> Vec<Neighbor> {
        let mut out = Vec::new();
        let select_radius = (radius + CELL_SELECTION_PAD_RAD).min(PI);

        let dec_center = dir.z.clamp(-1.0, 1.0).asin();
        let z_min = (dec_center - select_radius).max(-FRAC_PI_2).sin();
        let z_max = (dec_center + select_radius).min(FRAC_PI_2).sin();

        let lon_bins = self.lon_bins_for_cone(dir, dec_center, select_radius);

        for lat_bin in Self::z_bin_range(self.n_lat, z_min, z_max) {
            for &lon_bin in &lon_bins {
                self.collect_cell_matches(lat_bin, lon_bin, dir, radius, &mut out);
            }
        }
        out
    }

    /// Longitude bins overlapping a cone, deduplicated.
    fn lon_bins_for_cone(&self, dir: &Vector3<f64>, dec_center: f64, radius: f64) -> Vec<u32> {
        // Cone reaches a pole: every longitude is involved.
        if dec_center.abs() + radius >= FRAC_PI_2 {
            return (0..self.n_lon).collect();
        }
        let half_span = (radius.sin() / dec_center.cos()).clamp(-1.0, 1.0).asin();
        let lon_step = TAU / self.n_lon as f64;
        let half_span = half_span + lon_step;
        if 2.0 * half_span >= TAU {
            return (0..self.n_lon).collect();
        }

        let phi = wrap_angle(dir.y.atan2(dir.x));
        let start = wrap_angle(phi - half_span);
        let end = wrap_angle(phi + half_span);
        let start_bin = Self::phi_to_lon_bin(self.n_lon, start);
        let end_bin = Self::phi_to_lon_bin(self.n_lon, end);

        let mut bins: Vec<u32> = if start <= end {
            (start_bin..=end_bin).collect()
        } else {
            (start_bin..self.n_lon).chain(0..=end_bin).collect()
        };
        bins.sort_unstable();
        bins.dedup();
        bins
    }

    fn collect_cell_matches(
        &self,
        lat_bin: u32,
        lon_bin: u32,
        dir: &Vector3<f64>,
        radius: f64,
        out: &mut Vec<Neighbor>,
    ) {
        let cell = (lat_bin * self.n_lon + lon_bin) as usize;
        let start = self.cell_offsets[cell] as usize;
        let end = self.cell_offsets[cell + 1] as usize;

        for flat_idx in start..end {
            let star_idx = self.star_indices[flat_idx] as usize;
            let distance_rad = angular_distance(dir, &self.star_vectors[star_idx]);
            if distance_rad <= radius {
                out.push(Neighbor {
                    index: star_idx,
                    distance_rad,
                });
            }
        }
    }

    fn z_bin_range(n_lat: u32, z_min: f64, z_max: f64) -> std::ops::RangeInclusive<u32> {
        let start = Self::z_to_lat_bin(n_lat, z_min);
        let end = Self::z_to_lat_bin(n_lat, z_max);
        start..=end
    }

    fn cell_for_uvec(n_lat: u32, n_lon: u32, v: &Vector3<f64>) -> u32 {
        let phi = wrap_angle(v.y.atan2(v.x));
        let lat_bin = Self::z_to_lat_bin(n_lat, v.z);
        let lon_bin = Self::phi_to_lon_bin(n_lon, phi);
        lat_bin * n_lon + lon_bin
    }

    fn z_to_lat_bin(n_lat: u32, z: f64) -> u32 {
        let u = ((z.clamp(-1.0, 1.0) + 1.0) * 0.5).clamp(0.0, 1.0);
        let idx = (u * n_lat as f64).floor() as u32;
        idx.min(n_lat - 1)
    }

    fn phi_to_lon_bin(n_lon: u32, phi: f64) -> u32 {
        let u = (phi / TAU).clamp(0.0, 1.0);
        let idx = (u * n_lon as f64).floor() as u32;
        idx.min(n_lon - 1)
    }
}

/// Great-circle distance between two unit vectors, in radians.
///
/// Uses `atan2(|a x b|, a . b)`, which stays accurate for sub-arcsecond
/// separations where `acos` of the dot product loses most of its digits.
pub fn angular_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

fn wrap_angle(theta_rad: f64) -> f64 {
    let w = theta_rad.rem_euclid(TAU);
    if w >= TAU {
        0.0
    } else {
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star(id: u64, ra_deg: f64, dec_deg: f64) -> Star {
        Star {
            id,
            ra_deg,
            dec_deg,
            mag: 10.0,
        }
    }

    fn arcsec(a: f64) -> f64 {
        (a / ARCSEC_PER_DEGREE).to_radians()
    }

    #[test]
    fn cone_query_finds_nearby_stars() {
        let stars = vec![star(1, 0.0, 0.0), star(2, 2.0, 1.0), star(3, 40.0, -10.0)];

        let index = StarCatalog::new(8, stars).unwrap();
        let hits = index.query_stars(0.5, 0.25, 3.0_f64.to_radians());
        let mut ids: Vec<u64> = hits.iter().map(|s| s.id).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn cone_query_handles_ra_wraparound() {
        let stars = vec![star(10, 359.0, 0.0), star(11, 1.0, 0.0), star(12, 180.0, 0.0)];

        let index = StarCatalog::new(8, stars).unwrap();
        let hits = index.query_stars(0.0, 0.0, 3.0_f64.to_radians());
        let mut ids: Vec<u64> = hits.iter().map(|s| s.id).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let err = StarCatalog::new(16, Vec::new()).unwrap_err();
        assert!(matches!(err, CrossMatchError::EmptyCatalog));
    }

    #[test]
    fn zero_nside_is_rejected() {
        let err = StarCatalog::new(0, vec![star(1, 0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, CrossMatchError::InvalidConfig(_)));
    }

    #[test]
    fn oversized_nside_is_rejected_without_allocating() {
        for nside in [MAX_NSIDE + 1, 40_000, u32::MAX] {
            let err = StarCatalog::new(nside, vec![star(1, 0.0, 0.0)]).unwrap_err();
            assert!(matches!(err, CrossMatchError::InvalidConfig(_)), "nside {nside}");
        }
        let index = StarCatalog::new(MAX_NSIDE, vec![star(1, 0.0, 0.0), star(2, 0.0, 0.001)]).unwrap();
        assert_eq!(index.query_knn(0.0, 0.0, 2).unwrap()[1].index, 1);
    }

    #[test]
    fn non_finite_star_is_rejected() {
        let err = StarCatalog::new(16, vec![star(1, 0.0, 0.0), star(2, f64::NAN, 0.0)]).unwrap_err();
        assert!(matches!(
            err,
            CrossMatchError::MalformedRecord { row: 1, field: "ra", .. }
        ));
    }

    #[test]
    fn knn_rejects_k_larger_than_population() {
        let index = StarCatalog::new(4, vec![star(1, 10.0, 10.0)]).unwrap();
        let err = index.query_knn(10.0, 10.0, 2).unwrap_err();
        assert!(matches!(
            err,
            CrossMatchError::InsufficientCandidates {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn knn_rejects_non_finite_query() {
        let index = StarCatalog::new(4, vec![star(1, 10.0, 10.0)]).unwrap();
        assert!(matches!(
            index.query_knn(f64::NAN, 0.0, 1),
            Err(CrossMatchError::NonFiniteQuery { .. })
        ));
    }

    #[test]
    fn knn_returns_sorted_exact_neighbours() {
        // Offsets along the meridian are exact great-circle distances.
        let stars = vec![
            star(1, 50.0, 20.0 + 2.0 / 3600.0),
            star(2, 50.0, 20.0 - 0.5 / 3600.0),
            star(3, 50.0, 20.0 + 10.0 / 3600.0),
            star(4, 230.0, -20.0),
        ];
        let index = StarCatalog::new(64, stars).unwrap();
        let nn = index.query_knn(50.0, 20.0, 3).unwrap();
        let ids: Vec<u64> = nn.iter().map(|n| index.stars()[n.index].id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!((nn[0].distance_arcsec() - 0.5).abs() < 1e-6);
        assert!((nn[1].distance_arcsec() - 2.0).abs() < 1e-6);
        assert!((nn[2].distance_arcsec() - 10.0).abs() < 1e-6);

        // Far away star is only reachable after the radius has grown a lot
        let all = index.query_knn(50.0, 20.0, 4).unwrap();
        assert_eq!(all[3].index, 3);
    }

    #[test]
    fn knn_breaks_ties_by_construction_order() {
        let d = 1.0 / 3600.0;
        // Mirror images about the equator are exactly equidistant from (0, 0).
        let stars = vec![star(9, 0.0, 5.0 * d), star(8, 0.0, d), star(7, 0.0, -d)];
        let index = StarCatalog::new(32, stars).unwrap();
        let nn = index.query_knn(0.0, 0.0, 2).unwrap();
        assert_eq!(nn[0].distance_rad, nn[1].distance_rad);
        assert_eq!(nn[0].index, 1);
        assert_eq!(nn[1].index, 2);
    }

    #[test]
    fn knn_near_pole_and_across_ra_wrap() {
        let stars = vec![
            star(1, 10.0, 89.9999),
            star(2, 190.0, 89.9999),
            star(3, 359.9999, 0.0),
            star(4, 0.0001, 0.0),
        ];
        let index = StarCatalog::new(16, stars).unwrap();

        // Two stars straddling the pole are equidistant from it.
        let nn = index.query_knn(0.0, 90.0, 2).unwrap();
        let mut idx = vec![nn[0].index, nn[1].index];
        idx.sort_unstable();
        assert_eq!(idx, vec![0, 1]);
        assert!((nn[0].distance_rad - nn[1].distance_rad).abs() < arcsec(1e-3));

        let nn = index.query_knn(0.0, 0.0, 2).unwrap();
        let mut idx = vec![nn[0].index, nn[1].index];
        idx.sort_unstable();
        assert_eq!(idx, vec![2, 3]);
        assert!((nn[0].distance_arcsec() - 0.36).abs() < 1e-3);
    }

    #[test]
    fn knn_matches_brute_force() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let stars: Vec<Star> = (0..2000)
            .map(|i| {
                let ra = rng.random_range(0.0..360.0);
                let z: f64 = rng.random_range(-1.0..1.0);
                star(i, ra, z.asin().to_degrees())
            })
            .collect();
        let index = StarCatalog::new(8, stars.clone()).unwrap();

        for _ in 0..200 {
            let ra = rng.random_range(0.0..360.0);
            let z: f64 = rng.random_range(-1.0..1.0);
            let dec = z.asin().to_degrees();
            let q = radec_deg_to_uvec(ra, dec);

            let mut expected: Vec<(f64, usize)> = stars
                .iter()
                .enumerate()
                .map(|(i, s)| (angular_distance(&q, &s.uvec()), i))
                .collect();
            expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let got = index.query_knn(ra, dec, 5).unwrap();
            let got_idx: Vec<usize> = got.iter().map(|n| n.index).collect();
            let exp_idx: Vec<usize> = expected.iter().take(5).map(|e| e.1).collect();
            assert_eq!(got_idx, exp_idx);
        }
    }

    #[test]
    fn knn_in_crowded_field_starts_small_and_stays_exact() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // ~20000 stars inside half a degree, roughly 7" apart on average.
        let mut rng = StdRng::seed_from_u64(3);
        let stars: Vec<Star> = (0..20_000)
            .map(|i| {
                star(
                    i,
                    120.0 + rng.random_range(-0.25..0.25),
                    -60.0 + rng.random_range(-0.25..0.25),
                )
            })
            .collect();
        let index = StarCatalog::new(64, stars.clone()).unwrap();

        let dir = radec_deg_to_uvec(120.0, -60.0);
        let first_pass = index.cone_neighbors(&dir, KNN_INITIAL_RADIUS_RAD);
        assert!(first_pass.len() < 20, "{} stars in first cone", first_pass.len());

        for _ in 0..50 {
            let ra = 120.0 + rng.random_range(-0.2..0.2);
            let dec = -60.0 + rng.random_range(-0.2..0.2);
            let q = radec_deg_to_uvec(ra, dec);
            let mut expected: Vec<(f64, usize)> = stars
                .iter()
                .enumerate()
                .map(|(i, s)| (angular_distance(&q, &s.uvec()), i))
                .collect();
            expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let got: Vec<usize> = index.query_knn(ra, dec, 2).unwrap().iter().map(|n| n.index).collect();
            assert_eq!(got, vec![expected[0].1, expected[1].1]);
        }
    }

    #[test]
    fn cone_query_agrees_with_brute_force_at_high_resolution() {
        let stars: Vec<Star> = (0..360)
            .map(|i| star(i, i as f64, -60.0 + (i % 120) as f64))
            .collect();
        let index = StarCatalog::new(128, stars.clone()).unwrap();
        let radius = 12.0_f64.to_radians();
        let q = radec_deg_to_uvec(100.0, 5.0);

        let expected: Vec<usize> = stars
            .iter()
            .enumerate()
            .filter(|(_, s)| angular_distance(&q, &s.uvec()) <= radius)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(index.query_indices(100.0, 5.0, radius), expected);
    }
}
