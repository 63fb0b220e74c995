//! Inclusion mask for the density clustering stage.

use crate::point::{Point, PointCloud, PointId};

/// Minimum number of returns a pulse needs for its points to be clustered.
pub const MIN_RETURNS: u8 = 2;

/// A point is kept for clustering unless it is ground or belongs to a
/// pulse with fewer than [`MIN_RETURNS`] returns.
#[inline]
pub fn keep_for_clustering(p: &Point) -> bool {
    !(p.is_ground() || p.number_of_returns < MIN_RETURNS)
}

/// Boolean mask over `cloud`, `true` = keep.
pub fn build_mask(cloud: &PointCloud) -> Vec<bool> {
    cloud.points().iter().map(keep_for_clustering).collect()
}

/// Ids of the points selected by `mask`.
pub fn masked_ids(mask: &[bool]) -> Vec<PointId> {
    mask.iter()
        .enumerate()
        .filter_map(|(id, &keep)| keep.then_some(id))
        .collect()
}

/// Ids of every non-ground point. Used by the spatial join, which wants a
/// larger candidate set than clustering does.
pub fn non_ground_ids(cloud: &PointCloud) -> Vec<PointId> {
    cloud
        .iter()
        .filter_map(|(id, p)| (!p.is_ground()).then_some(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::GROUND_CLASS;

    fn pt(class: u8, returns: u8) -> Point {
        let mut p = Point::new(0.0, 0.0, 1.0);
        p.classification = class;
        p.number_of_returns = returns;
        p
    }

    #[test]
    fn excludes_exactly_ground_or_single_return() {
        let cloud = PointCloud::new(vec![
            pt(1, 2),
            pt(GROUND_CLASS, 3),
            pt(1, 1),
            pt(GROUND_CLASS, 1),
            pt(5, 4),
            pt(1, 0),
        ]);
        let mask = build_mask(&cloud);
        assert_eq!(mask, vec![true, false, false, false, true, false]);
        assert_eq!(masked_ids(&mask), vec![0, 4]);
    }

    #[test]
    fn non_ground_keeps_single_returns() {
        let cloud = PointCloud::new(vec![pt(1, 1), pt(GROUND_CLASS, 2), pt(3, 2)]);
        assert_eq!(non_ground_ids(&cloud), vec![0, 2]);
    }
}
