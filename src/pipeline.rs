//! End-to-end crown detection.
//!
//! mask → HDBSCAN → primary hulls → spatial join → peak-seeded
//! sub-segmentation → label fusion → secondary hulls.
//!
//! Every stage consumes its full input before the next one starts; all
//! intermediate tables are kept in [`CrownDetection`] for inspection.

use std::time::Instant;

use log::info;

use crate::config::SegmentationParams;
use crate::error::Result;
use crate::hdbscan::cluster_points;
use crate::hull::{build_crowns, CrownPolygon, HullFilter};
use crate::join::{join_points, Membership};
use crate::labels::{count_clusters, fuse_labels, ClusterLabel, NOISE};
use crate::mask::{build_mask, masked_ids, non_ground_ids};
use crate::peaks::Peak;
use crate::point::{BoundingBox, PointCloud, Sample};
use crate::seeded::{split_crowns, SubSegmentation};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct CrownDetection {
    /// Points the run worked on (cropped to the bounding box if one was given).
    pub cloud: PointCloud,
    /// HDBSCAN label per point of `cloud`; masked-out points are `-1`.
    pub density_labels: Vec<ClusterLabel>,
    /// Crowns from the density clusters.
    pub primary_crowns: Vec<CrownPolygon>,
    /// Non-ground points inside a primary crown.
    pub members: Vec<Membership>,
    /// Sub-crown labels aligned with `members`.
    pub sub: SubSegmentation,
    /// Fused crown id per entry of `members`.
    pub member_labels: Vec<ClusterLabel>,
    /// Fused crown id per point of `cloud`; `-1` = not a crown.
    pub point_labels: Vec<ClusterLabel>,
    /// Final crowns, one per fused label that passed the secondary filters.
    pub crowns: Vec<CrownPolygon>,
}

impl CrownDetection {
    /// Candidate tree tops found while splitting crowns.
    pub fn tree_tops(&self) -> &[Peak] {
        &self.sub.tree_tops
    }
}

/// Runs the full pipeline on `cloud`, optionally restricted to `bbox`.
pub fn crown_detection(
    cloud: &PointCloud,
    params: &SegmentationParams,
    bbox: Option<&BoundingBox>,
) -> Result<CrownDetection> {
    params.validate()?;
    let t0 = Instant::now();

    let cloud = match bbox {
        Some(b) => cloud.cropped(b),
        None => cloud.clone(),
    };
    info!("{} points in area", cloud.len());

    // 1. Mask + density clustering
    let mask = build_mask(&cloud);
    let ids = masked_ids(&mask);
    let labels = cluster_points(
        &cloud,
        &ids,
        params.min_cluster_size,
        params.min_samples,
        params.use_3d,
        params.allow_single_cluster,
    );
    let mut density_labels = vec![NOISE; cloud.len()];
    for (&id, &l) in ids.iter().zip(&labels) {
        density_labels[id] = l;
    }
    info!(
        "density clustering: {} of {} masked points in {} clusters",
        labels.iter().filter(|&&l| l >= 0).count(),
        ids.len(),
        count_clusters(&labels)
    );

    // 2. Primary hulls
    let samples: Vec<Sample> = ids
        .iter()
        .map(|&id| Sample::from_point(id, cloud.get(id)))
        .collect();
    let primary_crowns = build_crowns(&samples, &labels, HullFilter::primary(params.min_density));
    info!("{} crown polygons after plausibility filters", primary_crowns.len());

    // 3. Spatial join over all non-ground points
    let members = join_points(&cloud, &non_ground_ids(&cloud), &primary_crowns);
    info!("{} non-ground points inside crowns", members.len());

    // 4. Peak-seeded sub-segmentation
    let sub = split_crowns(&cloud, &primary_crowns, &members, params)?;
    info!(
        "{} polygons split, {} tree tops, {} refinement fallbacks",
        sub.split_polygons,
        sub.tree_tops.len(),
        sub.fallbacks
    );

    // 5. Label fusion
    let member_labels = fuse_labels(&sub.sub_labels, &sub.density_labels);
    let mut point_labels = vec![NOISE; cloud.len()];
    for (m, &l) in members.iter().zip(&member_labels) {
        point_labels[m.point] = l;
    }

    // 6. Secondary hulls over fused labels
    let crowns = build_crowns(
        &sub.samples,
        &member_labels,
        HullFilter::secondary(params.min_density, params.max_area),
    );
    info!(
        "{} crowns from {} fused labels in {:.2}s",
        crowns.len(),
        count_clusters(&member_labels),
        t0.elapsed().as_secs_f64()
    );

    Ok(CrownDetection {
        cloud,
        density_labels,
        primary_crowns,
        members,
        sub,
        member_labels,
        point_labels,
        crowns,
    })
}
