//! HDBSCAN density clustering.
//!
//! Steps: core distances (k-th neighbour through an R-tree) → minimum
//! spanning tree of the mutual-reachability graph (dense Prim) → single
//! linkage hierarchy → condensed tree pruned at `min_cluster_size` →
//! excess-of-mass cluster selection. Unless `allow_single_cluster` is set
//! the root is never selected, so a lone blob surrounded by nothing is
//! reported only if it splits off from noise.
//!
//! Every step is deterministic for a given input order: ties in Prim and in
//! the edge sort resolve by index.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::debug;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::labels::{ClusterLabel, NOISE};
use crate::point::{PointCloud, PointId};

/// Merge distances are floored here before inversion so λ stays finite on
/// duplicate points.
const MIN_MERGE_DIST: f64 = 1e-9;

type Indexed = GeomWithData<[f64; 3], usize>;

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Clusters `ids` of `cloud` on XY (or XYZ when `use_3d`).
///
/// Returns one label per entry of `ids`, `-1` for noise.
pub fn cluster_points(
    cloud: &PointCloud,
    ids: &[PointId],
    min_cluster_size: usize,
    min_samples: usize,
    use_3d: bool,
    allow_single_cluster: bool,
) -> Vec<ClusterLabel> {
    let coords: Vec<[f64; 3]> = ids
        .iter()
        .map(|&id| {
            let p = cloud.get(id);
            [p.x, p.y, if use_3d { p.z } else { 0.0 }]
        })
        .collect();
    hdbscan(&coords, min_cluster_size, min_samples, allow_single_cluster)
}

/// HDBSCAN over raw coordinates. Degenerate input gives all-noise labels.
pub fn hdbscan(
    coords: &[[f64; 3]],
    min_cluster_size: usize,
    min_samples: usize,
    allow_single_cluster: bool,
) -> Vec<ClusterLabel> {
    let n = coords.len();
    if n < 2 || n < min_cluster_size.max(2) || coords.iter().flatten().any(|v| !v.is_finite()) {
        debug!("hdbscan: {n} points, below min_cluster_size {min_cluster_size}; all noise");
        return vec![NOISE; n];
    }

    let core = core_distances(coords, min_samples.clamp(1, n));
    let mut mst = mutual_reachability_mst(coords, &core);
    mst.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal));
    let hierarchy = single_linkage(n, &mst);
    let condensed = condense(n, &hierarchy, min_cluster_size.max(2));
    let selected = select_clusters(n, &condensed, allow_single_cluster);
    label_points(n, &condensed, &selected)
}

// ---------------------------------------------------------------------------
// Core distances and mutual-reachability MST
// ---------------------------------------------------------------------------

fn dist2(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Distance to the k-th nearest neighbour, the point itself included.
fn core_distances(coords: &[[f64; 3]], k: usize) -> Vec<f64> {
    let tree: RTree<Indexed> = RTree::bulk_load(
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| GeomWithData::new(*c, i))
            .collect(),
    );
    coords
        .iter()
        .map(|c| {
            tree.nearest_neighbor_iter(c)
                .take(k)
                .last()
                .map(|nb| dist2(nb.geom(), c).sqrt())
                .unwrap_or(0.0)
        })
        .collect()
}

/// Prim's algorithm on the implicit complete graph. `O(n²)` time, `O(n)` memory.
fn mutual_reachability_mst(coords: &[[f64; 3]], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = coords.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = usize::MAX;
        let mut next_d = f64::INFINITY;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = dist2(&coords[current], &coords[j])
                .sqrt()
                .max(core[current])
                .max(core[j]);
            if d < best[j] {
                best[j] = d;
                from[j] = current;
            }
            if next == usize::MAX || best[j] < next_d {
                next_d = best[j];
                next = j;
            }
        }
        edges.push((from[next], next, next_d));
        in_tree[next] = true;
        current = next;
    }
    edges
}

// ---------------------------------------------------------------------------
// Single-linkage hierarchy
// ---------------------------------------------------------------------------

/// One merge of the single-linkage dendrogram.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    dist: f64,
    size: usize,
}

/// Node `n + i` is the i-th merge; leaves are `0..n`.
fn single_linkage(n: usize, sorted_mst: &[(usize, usize, f64)]) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n - 1).collect();
    let mut size = vec![1usize; 2 * n - 1];

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        while parent[x] != root {
            let next = parent[x];
            parent[x] = root;
            x = next;
        }
        root
    }

    let mut merges = Vec::with_capacity(n - 1);
    for (i, &(a, b, dist)) in sorted_mst.iter().enumerate() {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let node = n + i;
        parent[ra] = node;
        parent[rb] = node;
        size[node] = size[ra] + size[rb];
        merges.push(Merge {
            left: ra,
            right: rb,
            dist,
            size: size[node],
        });
    }
    merges
}

// ---------------------------------------------------------------------------
// Condensed tree
// ---------------------------------------------------------------------------

/// Edge of the condensed tree: `child` is a point (`< n`) or a cluster (`>= n`).
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

fn node_size(n: usize, hierarchy: &[Merge], node: usize) -> usize {
    if node < n {
        1
    } else {
        hierarchy[node - n].size
    }
}

fn leaves_under(n: usize, hierarchy: &[Merge], node: usize, out: &mut Vec<usize>) {
    let mut stack = vec![node];
    while let Some(x) = stack.pop() {
        if x < n {
            out.push(x);
        } else {
            let m = &hierarchy[x - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
}

fn condense(n: usize, hierarchy: &[Merge], min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let mut relabel = vec![0usize; 2 * n - 1];
    let mut next_label = n;
    relabel[root] = next_label;
    next_label += 1;

    let mut edges = Vec::new();
    let mut leaves = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        if node < n {
            continue;
        }
        let m = hierarchy[node - n];
        let lambda = 1.0 / m.dist.max(MIN_MERGE_DIST);
        let cluster = relabel[node];
        let left_size = node_size(n, hierarchy, m.left);
        let right_size = node_size(n, hierarchy, m.right);
        let left_big = left_size >= min_cluster_size;
        let right_big = right_size >= min_cluster_size;

        for (child, child_size, big, other_big) in [
            (m.left, left_size, left_big, right_big),
            (m.right, right_size, right_big, left_big),
        ] {
            if big && other_big {
                relabel[child] = next_label;
                next_label += 1;
                edges.push(CondensedEdge {
                    parent: cluster,
                    child: relabel[child],
                    lambda,
                    size: child_size,
                });
                queue.push_back(child);
            } else if big {
                // The parent cluster carries on through this child.
                relabel[child] = cluster;
                queue.push_back(child);
            } else {
                leaves.clear();
                leaves_under(n, hierarchy, child, &mut leaves);
                edges.extend(leaves.iter().map(|&p| CondensedEdge {
                    parent: cluster,
                    child: p,
                    lambda,
                    size: 1,
                }));
            }
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// Excess-of-mass selection and labelling
// ---------------------------------------------------------------------------

/// Excess-of-mass selection; returns the selected cluster ids ascending.
///
/// The root (`n`) takes part only with `allow_single_cluster`.
fn select_clusters(n: usize, condensed: &[CondensedEdge], allow_single_cluster: bool) -> Vec<usize> {
    let max_cluster = condensed
        .iter()
        .map(|e| e.parent.max(if e.child >= n { e.child } else { 0 }))
        .max()
        .unwrap_or(n);
    let n_clusters = max_cluster - n + 1;

    let mut birth = vec![0.0f64; n_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
    for e in condensed.iter().filter(|e| e.child >= n) {
        birth[e.child - n] = e.lambda;
        children[e.parent - n].push(e.child);
    }

    let mut stability = vec![0.0f64; n_clusters];
    for e in condensed {
        let p = e.parent - n;
        stability[p] += (e.lambda - birth[p]) * e.size as f64;
    }

    let first = if allow_single_cluster { 0 } else { 1 };
    let mut selected = vec![true; n_clusters];
    selected[0] = allow_single_cluster;
    // Child clusters always carry larger ids than their parent.
    for c in (first..n_clusters).rev() {
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch - n]).sum();
        if subtree > stability[c] {
            selected[c] = false;
            stability[c] = subtree;
        } else {
            let mut stack: Vec<usize> = children[c].clone();
            while let Some(d) = stack.pop() {
                selected[d - n] = false;
                stack.extend(children[d - n].iter().copied());
            }
        }
    }

    (first..n_clusters)
        .filter(|&c| selected[c])
        .map(|c| c + n)
        .collect()
}

/// Points take the label of the nearest selected ancestor.
///
/// When the root itself is selected, a point that left the root directly
/// keeps the label only if it left at the root's largest point λ; earlier
/// leavers are outliers.
fn label_points(n: usize, condensed: &[CondensedEdge], selected: &[usize]) -> Vec<ClusterLabel> {
    let root = n;
    let mut cluster_parent: Vec<usize> = Vec::new();
    let mut point_parent = vec![root; n];
    let mut point_lambda = vec![0.0f64; n];
    for e in condensed {
        if e.child < n {
            point_parent[e.child] = e.parent;
            point_lambda[e.child] = e.lambda;
        } else {
            let idx = e.child - n;
            if cluster_parent.len() <= idx {
                cluster_parent.resize(idx + 1, root);
            }
            cluster_parent[idx] = e.parent;
        }
    }

    let label_of = |cluster: usize| -> ClusterLabel {
        selected
            .binary_search(&cluster)
            .map(|i| i as ClusterLabel)
            .unwrap_or(NOISE)
    };
    let root_label = label_of(root);
    let root_lambda = condensed
        .iter()
        .filter(|e| e.parent == root && e.child < n)
        .map(|e| e.lambda)
        .fold(f64::NEG_INFINITY, f64::max);

    point_parent
        .iter()
        .zip(&point_lambda)
        .map(|(&start, &lambda)| {
            if start == root {
                return if root_label != NOISE && lambda >= root_lambda {
                    root_label
                } else {
                    NOISE
                };
            }
            let mut c = start;
            loop {
                let label = label_of(c);
                if label != NOISE || c == root {
                    return label;
                }
                c = cluster_parent.get(c - n).copied().unwrap_or(root);
            }
        })
        .collect()
}
