//! Point-to-crown spatial join.
//!
//! Candidate polygons for a point come from an R-tree over polygon bounding
//! boxes; the exact ring containment test decides. A point matching no
//! polygon is simply absent from the output. When crowns overlap, the point
//! goes to the lowest polygon id.

use log::debug;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;

use crate::hull::{CrownPolygon, PolygonId};
use crate::labels::ClusterLabel;
use crate::point::{PointCloud, PointId};

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, PolygonId>;

/// A point assigned to a crown polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub point: PointId,
    /// Density cluster that produced the owning polygon.
    pub cluster: ClusterLabel,
    pub polygon_id: PolygonId,
}

/// R-tree over crown bounding boxes.
pub struct CrownIndex<'a> {
    crowns: &'a [CrownPolygon],
    tree: RTree<IndexedBox>,
}

impl<'a> CrownIndex<'a> {
    pub fn new(crowns: &'a [CrownPolygon]) -> Self {
        let boxes = crowns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (lo, hi) = c.ring.bounds();
                GeomWithData::new(Rectangle::from_corners(lo, hi), i)
            })
            .collect();
        Self {
            crowns,
            tree: RTree::bulk_load(boxes),
        }
    }

    /// First crown (in table order) whose ring contains `(x, y)`.
    pub fn locate(&self, x: f64, y: f64) -> Option<&'a CrownPolygon> {
        self.tree
            .locate_all_at_point(&[x, y])
            .map(|b| b.data)
            .filter(|&i| self.crowns[i].ring.contains(x, y))
            .min()
            .map(|i| &self.crowns[i])
    }
}

/// Joins `candidates` (normally every non-ground point) against `crowns`.
///
/// Output is in candidate order and never contains a noise-origin cluster.
pub fn join_points(cloud: &PointCloud, candidates: &[PointId], crowns: &[CrownPolygon]) -> Vec<Membership> {
    let index = CrownIndex::new(crowns);
    let mut unmatched = 0usize;
    let mut noise = 0usize;

    let members: Vec<Membership> = candidates
        .iter()
        .filter_map(|&id| {
            let p = cloud.get(id);
            let Some(crown) = index.locate(p.x, p.y) else {
                unmatched += 1;
                return None;
            };
            if crown.cluster < 0 {
                noise += 1;
                return None;
            }
            Some(Membership {
                point: id,
                cluster: crown.cluster,
                polygon_id: crown.id,
            })
        })
        .collect();

    debug!(
        "join: {} of {} candidates inside crowns ({unmatched} outside, {noise} noise-origin)",
        members.len(),
        candidates.len()
    );
    members
}
