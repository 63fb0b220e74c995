//! Peak-seeded sub-segmentation of crown polygons.
//!
//! Each polygon large enough to hold several trees is refined, searched for
//! height peaks and split by k-means seeded at those peaks. Polygons are
//! independent and run in parallel with the `parallel` feature; their
//! results are merged into one table keyed by point id only after all of
//! them have finished.

use std::collections::{BTreeMap, HashMap};

use log::{debug, error, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SegmentationParams;
use crate::error::{CrownError, Result};
use crate::hull::{CrownPolygon, PolygonId};
use crate::join::Membership;
use crate::kmeans::{kmeans, Init};
use crate::labels::{ClusterLabel, NOISE};
use crate::peaks::{detect_peaks, Peak};
use crate::point::{PointCloud, PointId, Sample};
use crate::refine::{refine_samples, Refinement};

// ---------------------------------------------------------------------------
// Per-polygon split
// ---------------------------------------------------------------------------

/// Seeds are a strong prior: one reassignment round only.
pub const SEEDED_MAX_ITER: usize = 1;

/// Whether a crown is worth splitting.
pub fn qualifies(crown: &CrownPolygon, n_members: usize, params: &SegmentationParams) -> bool {
    crown.area >= params.min_area && n_members >= params.min_points
}

/// Sub-segmentation of one polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct CrownSplit {
    pub polygon_id: PolygonId,
    /// `(sample, sub-label)` for every member; refined attributes where the
    /// refinement pass ran.
    pub labelled: Vec<(Sample, ClusterLabel)>,
    pub peaks: Vec<Peak>,
    pub n_clusters: usize,
    pub fell_back: bool,
}

/// Splits one crown's members into sub-crowns.
///
/// Members of a crown that does not qualify all get [`NOISE`]. Members the
/// refinement pass drops (too close to the ground) also get [`NOISE`].
pub fn split_crown(crown: &CrownPolygon, members: &[Sample], params: &SegmentationParams) -> CrownSplit {
    if !qualifies(crown, members.len(), params) {
        debug!(
            "polygon {}: area {:.2}, {} points; too small to split",
            crown.id,
            crown.area,
            members.len()
        );
        return CrownSplit {
            polygon_id: crown.id,
            labelled: members.iter().map(|s| (*s, NOISE)).collect(),
            peaks: Vec::new(),
            n_clusters: 0,
            fell_back: false,
        };
    }

    let (to_cluster, fell_back) = if params.refine.enabled {
        let refinement = refine_samples(members, &params.refine);
        if let Refinement::Fallback { reason, .. } = &refinement {
            warn!("polygon {}: refinement skipped ({reason}); using input points", crown.id);
        }
        let fell_back = refinement.is_fallback();
        (refinement.into_samples(), fell_back)
    } else {
        (members.to_vec(), false)
    };

    let detection = detect_peaks(
        &to_cluster,
        params.round_val,
        params.min_dist_cells(),
        params.relative_threshold,
        params.height_transform,
    );

    let coords: Vec<[f64; 3]> = to_cluster.iter().map(Sample::xyz).collect();
    let result = if detection.peaks.is_empty() {
        kmeans(
            &coords,
            detection.count,
            &Init::KMeansPlusPlus {
                seed: params.kmeans_seed,
            },
            params.kmeans_max_iter,
        )
    } else {
        let seeds = detection.peaks.iter().map(Peak::xyz).collect();
        kmeans(&coords, detection.count, &Init::Seeds(seeds), SEEDED_MAX_ITER)
    };

    let mut sub: HashMap<PointId, (Sample, ClusterLabel)> = to_cluster
        .into_iter()
        .zip(result.labels)
        .map(|(s, l)| (s.id, (s, l)))
        .collect();
    let labelled = members
        .iter()
        .map(|m| sub.remove(&m.id).unwrap_or((*m, NOISE)))
        .collect();

    debug!(
        "polygon {}: area {:.2}, {} points, {} sub-crowns",
        crown.id,
        crown.area,
        members.len(),
        detection.count
    );
    CrownSplit {
        polygon_id: crown.id,
        labelled,
        peaks: detection.peaks,
        n_clusters: detection.count,
        fell_back,
    }
}

// ---------------------------------------------------------------------------
// Fan-out over polygons and keyed merge
// ---------------------------------------------------------------------------

/// Merged sub-segmentation table, aligned with the join output.
#[derive(Debug, Clone, Default)]
pub struct SubSegmentation {
    pub samples: Vec<Sample>,
    pub sub_labels: Vec<ClusterLabel>,
    pub density_labels: Vec<ClusterLabel>,
    pub polygon_ids: Vec<PolygonId>,
    /// Every peak found across all polygons, in polygon order.
    pub tree_tops: Vec<Peak>,
    pub split_polygons: usize,
    pub fallbacks: usize,
}

/// Runs [`split_crown`] over every polygon and merges the results.
///
/// Fails with [`CrownError::LabelMergeConflict`] if a sub-label targets a
/// point that is not in `members`, or a point receives zero or two labels.
pub fn split_crowns(
    cloud: &PointCloud,
    crowns: &[CrownPolygon],
    members: &[Membership],
    params: &SegmentationParams,
) -> Result<SubSegmentation> {
    let mut groups: BTreeMap<PolygonId, Vec<Sample>> = BTreeMap::new();
    for m in members {
        groups
            .entry(m.polygon_id)
            .or_default()
            .push(Sample::from_point(m.point, cloud.get(m.point)));
    }
    let work: Vec<(&CrownPolygon, Vec<Sample>)> = groups
        .into_iter()
        .filter_map(|(pid, samples)| crowns.get(pid).map(|c| (c, samples)))
        .collect();

    #[cfg(feature = "parallel")]
    let splits: Vec<CrownSplit> = work
        .par_iter()
        .map(|(crown, samples)| split_crown(crown, samples, params))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let splits: Vec<CrownSplit> = work
        .iter()
        .map(|(crown, samples)| split_crown(crown, samples, params))
        .collect();

    merge_splits(members, splits)
}

/// Writes per-polygon results into the global table keyed by point id.
pub fn merge_splits(members: &[Membership], splits: Vec<CrownSplit>) -> Result<SubSegmentation> {
    let row_of: HashMap<PointId, usize> = members
        .iter()
        .enumerate()
        .map(|(row, m)| (m.point, row))
        .collect();
    let mut slots: Vec<Option<(Sample, ClusterLabel)>> = vec![None; members.len()];

    let mut out = SubSegmentation::default();
    for split in splits {
        if split.n_clusters > 0 {
            out.split_polygons += 1;
        }
        if split.fell_back {
            out.fallbacks += 1;
        }
        out.tree_tops.extend(split.peaks);
        for (sample, label) in split.labelled {
            let Some(&row) = row_of.get(&sample.id) else {
                return Err(conflict(sample.id, "point is not a member of any crown"));
            };
            if members[row].polygon_id != split.polygon_id {
                return Err(conflict(
                    sample.id,
                    &format!(
                        "labelled by polygon {} but joined to polygon {}",
                        split.polygon_id, members[row].polygon_id
                    ),
                ));
            }
            if slots[row].replace((sample, label)).is_some() {
                return Err(conflict(sample.id, "point labelled twice"));
            }
        }
    }

    out.samples.reserve(members.len());
    for (m, slot) in members.iter().zip(slots) {
        let Some((sample, label)) = slot else {
            return Err(conflict(m.point, "point received no sub-label"));
        };
        out.samples.push(sample);
        out.sub_labels.push(label);
        out.density_labels.push(m.cluster);
        out.polygon_ids.push(m.polygon_id);
    }
    Ok(out)
}

fn conflict(point_id: PointId, reason: &str) -> CrownError {
    error!("label merge conflict at point {point_id}: {reason}");
    CrownError::LabelMergeConflict {
        point_id,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Ring;
    use crate::point::Point;

    fn crown(id: PolygonId, area: f64) -> CrownPolygon {
        CrownPolygon {
            id,
            cluster: id as ClusterLabel,
            ring: Ring::close(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
            area,
            n_points: 0,
            mean_z: 0.0,
            mean_hag: 0.0,
            mean_normal: [0.0, 0.0, 1.0],
            mean_coplanar: 0.0,
        }
    }

    /// Two cones 3 m apart on a 0.25 m grid.
    fn two_cones() -> Vec<Sample> {
        let mut out = Vec::new();
        for i in 0..24 {
            for j in 0..8 {
                let x = i as f64 * 0.25;
                let y = j as f64 * 0.25;
                let d = ((x - 1.5).powi(2) + (y - 0.875).powi(2))
                    .sqrt()
                    .min(((x - 4.5).powi(2) + (y - 0.875).powi(2)).sqrt());
                out.push(Sample::from_point(out.len(), &Point::new(x, y, 15.0 - 2.0 * d)));
            }
        }
        out
    }

    fn params() -> SegmentationParams {
        SegmentationParams {
            round_val: 0.5,
            min_dist: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn small_crown_is_all_noise() {
        let members = two_cones();
        let split = split_crown(&crown(0, 1.5), &members, &params());
        assert_eq!(split.n_clusters, 0);
        assert!(split.labelled.iter().all(|&(_, l)| l == NOISE));
        assert_eq!(split.labelled.len(), members.len());
    }

    #[test]
    fn too_few_members_is_all_noise() {
        let members: Vec<Sample> = two_cones().into_iter().take(9).collect();
        let split = split_crown(&crown(0, 5.0), &members, &params());
        assert_eq!(split.n_clusters, 0);
        assert_eq!(split.labelled.len(), 9);
        assert!(split.labelled.iter().all(|&(_, l)| l == NOISE));
    }

    #[test]
    fn refinement_fallback_keeps_every_member() {
        // Twelve returns just above the ground: nothing survives the HAG cut.
        let members: Vec<Sample> = (0..12)
            .map(|i| {
                let mut p = Point::new((i % 4) as f64 * 0.5, (i / 4) as f64 * 0.5, 10.0);
                p.hag = 0.2;
                p.nz = 0.5;
                Sample::from_point(i, &p)
            })
            .collect();
        let split = split_crown(&crown(0, 3.0), &members, &params());
        assert!(split.fell_back);
        assert_eq!(split.labelled.len(), 12);
        assert!(split.labelled.iter().all(|&(_, l)| l >= 0));
        let kept: Vec<Sample> = split.labelled.iter().map(|&(s, _)| s).collect();
        assert_eq!(kept, members);
    }

    #[test]
    fn no_peak_falls_back_to_one_unseeded_cluster() {
        let members: Vec<Sample> = (0..16)
            .map(|i| Sample::from_point(i, &Point::new((i % 4) as f64 * 0.5, (i / 4) as f64 * 0.5, 0.0)))
            .collect();
        let mut p = params();
        p.refine.enabled = false;
        let split = split_crown(&crown(0, 2.25), &members, &p);
        assert!(split.peaks.is_empty());
        assert_eq!(split.n_clusters, 1);
        assert!(!split.fell_back);
        assert!(split.labelled.iter().all(|&(_, l)| l == 0));
    }

    #[test]
    fn two_peaks_split_into_two_sub_crowns() {
        let members = two_cones();
        let split = split_crown(&crown(0, 12.0), &members, &params());
        assert_eq!(split.n_clusters, 2);
        assert_eq!(split.peaks.len(), 2);
        let left: Vec<ClusterLabel> = split
            .labelled
            .iter()
            .filter(|(s, _)| s.x < 2.5)
            .map(|&(_, l)| l)
            .collect();
        let right: Vec<ClusterLabel> = split
            .labelled
            .iter()
            .filter(|(s, _)| s.x > 3.5)
            .map(|&(_, l)| l)
            .collect();
        assert!(left.iter().all(|&l| l == left[0]));
        assert!(right.iter().all(|&l| l == right[0]));
        assert_ne!(left[0], right[0]);
    }

    #[test]
    fn seeded_split_is_repeatable() {
        let members = two_cones();
        let a = split_crown(&crown(0, 12.0), &members, &params());
        let b = split_crown(&crown(0, 12.0), &members, &params());
        assert_eq!(a, b);
    }

    #[test]
    fn merge_rejects_foreign_points() {
        let members = vec![Membership {
            point: 0,
            cluster: 0,
            polygon_id: 0,
        }];
        let stranger = Sample::from_point(42, &Point::new(0.0, 0.0, 1.0));
        let split = CrownSplit {
            polygon_id: 0,
            labelled: vec![(stranger, 0)],
            peaks: Vec::new(),
            n_clusters: 1,
            fell_back: false,
        };
        assert!(matches!(
            merge_splits(&members, vec![split]),
            Err(CrownError::LabelMergeConflict { point_id: 42, .. })
        ));
    }

    #[test]
    fn merge_rejects_missing_labels() {
        let members = vec![Membership {
            point: 3,
            cluster: 1,
            polygon_id: 0,
        }];
        assert!(matches!(
            merge_splits(&members, Vec::new()),
            Err(CrownError::LabelMergeConflict { point_id: 3, .. })
        ));
    }
}
