//! Cluster labels and label fusion.
//!
//! Density-cluster labels and sub-cluster labels live in separate
//! namespaces. A point's final crown id is a dense, zero-based
//! factorization of the `(sub-label, density-label)` pair in first-seen
//! order; any pair with a `-1` component stays `-1`.

use std::collections::HashMap;

/// Label assigned by a clustering stage.
pub type ClusterLabel = i64;

/// Reserved "noise / unassigned / not a crown" label in every stage.
pub const NOISE: ClusterLabel = -1;

/// Factorizes `(sub, density)` pairs into final crown ids.
///
/// Two points share a result iff they share both components. Ids are
/// assigned in first-seen order so re-running on the same input order
/// gives the same mapping.
pub fn fuse_labels(sub_labels: &[ClusterLabel], density_labels: &[ClusterLabel]) -> Vec<ClusterLabel> {
    debug_assert_eq!(sub_labels.len(), density_labels.len());
    let mut ids: HashMap<(ClusterLabel, ClusterLabel), ClusterLabel> = HashMap::new();
    sub_labels
        .iter()
        .zip(density_labels)
        .map(|(&sub, &density)| {
            if sub < 0 || density < 0 {
                return NOISE;
            }
            let next = ids.len() as ClusterLabel;
            *ids.entry((sub, density)).or_insert(next)
        })
        .collect()
}

/// Number of distinct non-noise labels.
pub fn count_clusters(labels: &[ClusterLabel]) -> usize {
    let mut seen: Vec<ClusterLabel> = labels.iter().copied().filter(|&l| l >= 0).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_label_iff_pair_matches() {
        let sub = [0, 1, 0, 0, 1, 2];
        let den = [3, 3, 4, 3, 3, 4];
        let fused = fuse_labels(&sub, &den);
        assert_eq!(fused, vec![0, 1, 2, 0, 1, 3]);
    }

    #[test]
    fn pairs_that_collide_as_strings_stay_distinct() {
        // "10" + "100" == "1010" + "0" as concatenated text.
        let fused = fuse_labels(&[1, 101], &[100, 0]);
        assert_ne!(fused[0], fused[1]);
    }

    #[test]
    fn noise_components_stay_noise() {
        let fused = fuse_labels(&[NOISE, 0, 0, NOISE], &[2, NOISE, 2, 5]);
        assert_eq!(fused, vec![NOISE, NOISE, 0, NOISE]);
        assert_eq!(count_clusters(&fused), 1);
    }

    #[test]
    fn factorization_is_stable() {
        let sub = [2, 0, 2, 1];
        let den = [0, 0, 0, 1];
        assert_eq!(fuse_labels(&sub, &den), fuse_labels(&sub, &den));
        assert_eq!(fuse_labels(&sub, &den), vec![0, 1, 0, 2]);
    }
}
