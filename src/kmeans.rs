//! Lloyd's k-means over 3D points.
//!
//! With seeds, centroids start at the seeds and only `max_iter` refinement
//! rounds run (the caller passes 1 to treat seeds as a strong prior).
//! Without seeds, k-means++ picks the initial centroids from a seeded RNG so
//! results are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::labels::ClusterLabel;

/// Centroid initialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    Seeds(Vec<[f64; 3]>),
    KMeansPlusPlus { seed: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub labels: Vec<ClusterLabel>,
    pub centroids: Vec<[f64; 3]>,
    pub iterations: usize,
}

fn dist2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Index of the nearest centroid; lowest index wins ties.
fn nearest(p: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = dist2(p, c);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

fn kmeans_plus_plus(points: &[[f64; 3]], k: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);
    let mut d2: Vec<f64> = points.iter().map(|p| dist2(p, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut pick = points.len() - 1;
            for (i, &d) in d2.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // All remaining mass sits on existing centroids.
            rng.random_range(0..points.len())
        };
        let c = points[next];
        for (acc, p) in d2.iter_mut().zip(points) {
            *acc = acc.min(dist2(p, &c));
        }
        centroids.push(c);
    }
    centroids
}

/// Partitions `points` into `k` clusters.
///
/// With [`Init::Seeds`], `k` is the number of seeds. Empty clusters keep
/// their previous centroid. Labels are `0..k`; an empty input returns an
/// empty result.
pub fn kmeans(points: &[[f64; 3]], k: usize, init: &Init, max_iter: usize) -> KMeansResult {
    if points.is_empty() {
        return KMeansResult {
            labels: Vec::new(),
            centroids: Vec::new(),
            iterations: 0,
        };
    }

    let mut centroids = match init {
        Init::Seeds(seeds) if !seeds.is_empty() => seeds.clone(),
        Init::Seeds(_) => kmeans_plus_plus(points, k.clamp(1, points.len()), 0),
        Init::KMeansPlusPlus { seed } => kmeans_plus_plus(points, k.clamp(1, points.len()), *seed),
    };
    let k = centroids.len();

    let mut assign: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();
    let mut iterations = 0;
    for _ in 0..max_iter {
        iterations += 1;
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (p, &a) in points.iter().zip(&assign) {
            for d in 0..3 {
                sums[a][d] += p[d];
            }
            counts[a] += 1;
        }
        for ((c, s), &n) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if n > 0 {
                *c = s.map(|v| v / n as f64);
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centroids)).collect();
        let converged = next == assign;
        assign = next;
        if converged {
            break;
        }
    }

    KMeansResult {
        labels: assign.into_iter().map(|a| a as ClusterLabel).collect(),
        centroids,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for i in 0..10 {
            let o = i as f64 * 0.1;
            pts.push([o, 0.0, 10.0 + o]);
            pts.push([5.0 + o, 0.0, 12.0 - o]);
        }
        pts
    }

    #[test]
    fn seeded_single_iteration_separates_groups() {
        let pts = two_groups();
        let init = Init::Seeds(vec![[0.5, 0.0, 10.5], [5.5, 0.0, 11.5]]);
        let res = kmeans(&pts, 2, &init, 1);
        assert_eq!(res.iterations, 1);
        for (i, &l) in res.labels.iter().enumerate() {
            assert_eq!(l, (i % 2) as ClusterLabel);
        }
    }

    #[test]
    fn seeded_runs_are_identical() {
        let pts = two_groups();
        let init = Init::Seeds(vec![[1.0, 0.0, 10.0], [4.0, 0.0, 12.0]]);
        assert_eq!(kmeans(&pts, 2, &init, 1), kmeans(&pts, 2, &init, 1));
    }

    #[test]
    fn plus_plus_is_reproducible_and_converges() {
        let pts = two_groups();
        let a = kmeans(&pts, 2, &Init::KMeansPlusPlus { seed: 7 }, 100);
        let b = kmeans(&pts, 2, &Init::KMeansPlusPlus { seed: 7 }, 100);
        assert_eq!(a, b);
        assert!(a.iterations < 100);
        assert_ne!(a.labels[0], a.labels[1]);
        assert!(a.labels.iter().step_by(2).all(|&l| l == a.labels[0]));
    }

    #[test]
    fn single_cluster_labels_everything_zero() {
        let pts = two_groups();
        let res = kmeans(&pts, 1, &Init::KMeansPlusPlus { seed: 0 }, 100);
        assert!(res.labels.iter().all(|&l| l == 0));
        assert!(kmeans(&[], 3, &Init::KMeansPlusPlus { seed: 0 }, 10).labels.is_empty());
    }
}
