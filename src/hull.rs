//! Convex crown polygons with plausibility filtering.
//!
//! For every non-noise cluster, in label order:
//! 1. ≤ 3 points → dropped (no hull with area),
//! 2. convex hull over XY, ring kept in hull order,
//! 3. density `n / area ≤ min_density` → dropped,
//! 4. `area ≥ max_area` → dropped (secondary pass only),
//! 5. otherwise a [`CrownPolygon`] with mean attributes is emitted.
//!
//! A group failing a check is never evaluated against later ones.

use std::collections::BTreeMap;

use log::debug;

use crate::geometry::{convex_hull, Ring, Vertex};
use crate::labels::ClusterLabel;
use crate::point::Sample;

/// Groups of this size or smaller cannot form a hull with area.
pub const MIN_HULL_POINTS: usize = 3;

/// Index of a polygon in the table produced by [`build_crowns`].
pub type PolygonId = usize;

/// Which plausibility checks apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullFilter {
    pub min_density: f64,
    pub max_area: Option<f64>,
}

impl HullFilter {
    /// Initial pass over density clusters: no area ceiling.
    pub fn primary(min_density: f64) -> Self {
        Self {
            min_density,
            max_area: None,
        }
    }

    /// Pass over fused sub-crown labels.
    pub fn secondary(min_density: f64, max_area: Option<f64>) -> Self {
        Self {
            min_density,
            max_area,
        }
    }
}

/// Why a group did not become a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooFewPoints(usize),
    Degenerate,
    TooSparse { density: f64 },
    TooLarge { area: f64 },
}

/// A crown footprint derived from one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CrownPolygon {
    pub id: PolygonId,
    /// Label of the cluster the polygon was built from.
    pub cluster: ClusterLabel,
    pub ring: Ring,
    pub area: f64,
    pub n_points: usize,
    pub mean_z: f64,
    pub mean_hag: f64,
    pub mean_normal: [f64; 3],
    pub mean_coplanar: f64,
}

impl CrownPolygon {
    pub fn density(&self) -> f64 {
        self.n_points as f64 / self.area
    }
}

/// Named numeric crown attributes in export order.
pub const ATTRIBUTE_COLUMNS: [(&str, fn(&CrownPolygon) -> f64); 8] = [
    ("mean_z", |c: &CrownPolygon| c.mean_z),
    ("n_points", |c: &CrownPolygon| c.n_points as f64),
    ("nx", |c: &CrownPolygon| c.mean_normal[0]),
    ("ny", |c: &CrownPolygon| c.mean_normal[1]),
    ("nz", |c: &CrownPolygon| c.mean_normal[2]),
    ("coplanar", |c: &CrownPolygon| c.mean_coplanar),
    ("hag", |c: &CrownPolygon| c.mean_hag),
    ("area", |c: &CrownPolygon| c.area),
];

/// Builds one polygon per surviving cluster. `labels[i]` labels `samples[i]`.
pub fn build_crowns(samples: &[Sample], labels: &[ClusterLabel], filter: HullFilter) -> Vec<CrownPolygon> {
    debug_assert_eq!(samples.len(), labels.len());

    let mut groups: BTreeMap<ClusterLabel, Vec<&Sample>> = BTreeMap::new();
    for (s, &label) in samples.iter().zip(labels) {
        if label >= 0 {
            groups.entry(label).or_default().push(s);
        }
    }

    let mut crowns = Vec::new();
    let mut rejected = 0usize;
    for (label, group) in groups {
        match crown_from_group(&group, filter) {
            Ok((ring, area)) => {
                let id = crowns.len();
                crowns.push(summarize(id, label, ring, area, &group));
            }
            Err(reason) => {
                rejected += 1;
                debug!("cluster {label} dropped: {reason:?}");
            }
        }
    }
    debug!("hulls: {} kept, {rejected} dropped", crowns.len());
    crowns
}

/// Runs the checks in order and returns the ring and its area.
pub fn crown_from_group(group: &[&Sample], filter: HullFilter) -> Result<(Ring, f64), Rejection> {
    if group.len() <= MIN_HULL_POINTS {
        return Err(Rejection::TooFewPoints(group.len()));
    }
    let xy: Vec<Vertex> = group.iter().map(|s| (s.x, s.y)).collect();
    let hull = convex_hull(&xy);
    if hull.len() < 3 {
        return Err(Rejection::Degenerate);
    }
    let ring = Ring::close(&hull);
    let area = ring.area();
    if area <= 0.0 {
        return Err(Rejection::Degenerate);
    }

    let density = group.len() as f64 / area;
    if density <= filter.min_density {
        return Err(Rejection::TooSparse { density });
    }
    if let Some(max_area) = filter.max_area {
        if area >= max_area {
            return Err(Rejection::TooLarge { area });
        }
    }
    Ok((ring, area))
}

fn summarize(id: PolygonId, cluster: ClusterLabel, ring: Ring, area: f64, group: &[&Sample]) -> CrownPolygon {
    let n = group.len() as f64;
    let mut z = 0.0;
    let mut hag = 0.0;
    let mut coplanar = 0.0;
    let mut normal = [0.0; 3];
    for s in group {
        z += s.z;
        hag += s.hag;
        coplanar += s.coplanar;
        for (acc, v) in normal.iter_mut().zip(s.normal) {
            *acc += v;
        }
    }
    CrownPolygon {
        id,
        cluster,
        ring,
        area,
        n_points: group.len(),
        mean_z: z / n,
        mean_hag: hag / n,
        mean_normal: normal.map(|v| v / n),
        mean_coplanar: coplanar / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, side: usize, step: f64, z: f64) -> Vec<Sample> {
        let mut out = Vec::new();
        for i in 0..side {
            for j in 0..side {
                let p = Point::new(x0 + i as f64 * step, y0 + j as f64 * step, z);
                out.push(Sample::from_point(out.len(), &p));
            }
        }
        out
    }

    #[test]
    fn dense_cluster_becomes_polygon() {
        let samples = square(0.0, 0.0, 5, 0.25, 12.0);
        let labels = vec![3; samples.len()];
        let crowns = build_crowns(&samples, &labels, HullFilter::primary(3.0));
        assert_eq!(crowns.len(), 1);
        let c = &crowns[0];
        assert_eq!(c.cluster, 3);
        assert_eq!(c.n_points, 25);
        assert_relative_eq!(c.area, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.mean_z, 12.0);
        assert_relative_eq!(c.mean_normal[2], 1.0);
        assert!(c.density() > 3.0);
        assert!(c.ring.vertices().len() >= 4);
        assert_eq!(c.ring.vertices().first(), c.ring.vertices().last());
    }

    #[test]
    fn small_sparse_and_noise_groups_are_dropped() {
        let mut samples = square(0.0, 0.0, 2, 0.5, 5.0);
        samples.truncate(3); // label 0, too few
        samples.extend(square(10.0, 0.0, 3, 2.0, 5.0)); // 9 pts over 16 m², label 1
        samples.extend(square(20.0, 0.0, 3, 0.1, 5.0)); // noise
        let mut labels = vec![0; 3];
        labels.extend(vec![1; 9]);
        labels.extend(vec![-1; 9]);
        assert!(build_crowns(&samples, &labels, HullFilter::primary(3.0)).is_empty());

        let group: Vec<&Sample> = samples[..3].iter().collect();
        assert_eq!(
            crown_from_group(&group, HullFilter::primary(3.0)),
            Err(Rejection::TooFewPoints(3))
        );
    }

    #[test]
    fn area_ceiling_only_in_secondary_pass() {
        // 2500 points over ~900 m²: dense enough, too large for one crown.
        let samples = square(0.0, 0.0, 50, 0.6, 20.0);
        let labels = vec![0; samples.len()];
        assert_eq!(build_crowns(&samples, &labels, HullFilter::primary(2.0)).len(), 1);
        assert!(build_crowns(&samples, &labels, HullFilter::secondary(2.0, Some(800.0))).is_empty());
    }

    #[test]
    fn polygon_ids_are_dense_in_label_order() {
        let mut samples = square(5.0, 5.0, 4, 0.2, 1.0);
        samples.extend(square(0.0, 0.0, 4, 0.2, 1.0));
        let mut labels = vec![7; 16];
        labels.extend(vec![2; 16]);
        let crowns = build_crowns(&samples, &labels, HullFilter::primary(3.0));
        assert_eq!(crowns.iter().map(|c| (c.id, c.cluster)).collect::<Vec<_>>(), vec![(0, 2), (1, 7)]);
    }
}
