//! Attribute refinement before sub-crown clustering.
//!
//! Drops returns close to the ground, then recomputes normals and the
//! approximate-coplanarity flag from the k nearest neighbours (PCA of the
//! local covariance). The pass is best-effort: when it cannot run the
//! caller gets the unrefined input back together with the reason.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::config::RefineParams;
use crate::point::Sample;

/// Why the pass fell back to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineFailure {
    /// Fewer points above `hag_min` than the neighbourhood needs.
    TooFewPoints { have: usize, need: usize },
    /// A neighbourhood produced a non-finite covariance.
    Degenerate,
}

impl std::fmt::Display for RefineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefineFailure::TooFewPoints { have, need } => {
                write!(f, "{have} points above ground threshold, need {need}")
            }
            RefineFailure::Degenerate => write!(f, "degenerate neighbourhood"),
        }
    }
}

/// Outcome of [`refine_samples`].
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    Refined(Vec<Sample>),
    Fallback { samples: Vec<Sample>, reason: RefineFailure },
}

impl Refinement {
    pub fn into_samples(self) -> Vec<Sample> {
        match self {
            Refinement::Refined(s) => s,
            Refinement::Fallback { samples, .. } => samples,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Refinement::Fallback { .. })
    }
}

/// Local surface descriptors from a PCA neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalShape {
    /// Unit normal oriented upwards (`nz ≥ 0`).
    pub normal: [f64; 3],
    /// Covariance eigenvalues, ascending.
    pub eigenvalues: [f64; 3],
}

impl LocalShape {
    /// `λ1 > t1·λ0 && t2·λ1 > λ2`.
    pub fn is_coplanar(&self, thresh1: f64, thresh2: f64) -> bool {
        let [e0, e1, e2] = self.eigenvalues;
        e1 > thresh1 * e0 && thresh2 * e1 > e2
    }
}

/// PCA of a neighbourhood. `None` if the covariance is not finite.
pub fn local_shape(neighbours: &[[f64; 3]]) -> Option<LocalShape> {
    let n = neighbours.len() as f64;
    let centroid = neighbours
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + Vector3::from(*p))
        / n;
    let mut cov = Matrix3::zeros();
    for p in neighbours {
        let d = Vector3::from(*p) - centroid;
        cov += d * d.transpose();
    }
    cov /= n;
    if cov.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let eig = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let mut normal: Vector3<f64> = eig.eigenvectors.column(order[0]).into_owned();
    if normal.z < 0.0 {
        normal = -normal;
    }
    Some(LocalShape {
        normal: [normal.x, normal.y, normal.z],
        eigenvalues: order.map(|i| eig.eigenvalues[i].max(0.0)),
    })
}

/// Runs the refinement pass over one crown's members.
pub fn refine_samples(samples: &[Sample], params: &RefineParams) -> Refinement {
    let kept: Vec<Sample> = samples
        .iter()
        .filter(|s| s.hag >= params.hag_min)
        .copied()
        .collect();

    let need = params.knn + 1;
    if kept.len() < need {
        return Refinement::Fallback {
            samples: samples.to_vec(),
            reason: RefineFailure::TooFewPoints {
                have: kept.len(),
                need,
            },
        };
    }

    let tree: RTree<GeomWithData<[f64; 3], usize>> = RTree::bulk_load(
        kept.iter()
            .enumerate()
            .map(|(i, s)| GeomWithData::new(s.xyz(), i))
            .collect(),
    );

    let mut refined = Vec::with_capacity(kept.len());
    let mut neighbours: Vec<[f64; 3]> = Vec::with_capacity(params.knn);
    for s in &kept {
        neighbours.clear();
        neighbours.extend(
            tree.nearest_neighbor_iter(&s.xyz())
                .take(params.knn)
                .map(|nb| *nb.geom()),
        );
        let Some(shape) = local_shape(&neighbours) else {
            return Refinement::Fallback {
                samples: samples.to_vec(),
                reason: RefineFailure::Degenerate,
            };
        };
        let coplanar = shape.is_coplanar(params.coplanar_thresh1, params.coplanar_thresh2);
        refined.push(Sample {
            normal: shape.normal,
            coplanar: if coplanar { 1.0 } else { 0.0 },
            ..*s
        });
    }
    Refinement::Refined(refined)
}
