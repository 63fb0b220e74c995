//! Planar geometry helpers: convex hull, ring area, containment, WKT.

use std::cmp::Ordering;
use std::fmt::Write as _;

/// A 2D vertex `(x, y)`.
pub type Vertex = (f64, f64);

/// Closed polygon ring: first vertex repeated at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    vertices: Vec<Vertex>,
}

impl Ring {
    /// Closes `open` (hull order, no repeat) into a ring.
    pub fn close(open: &[Vertex]) -> Self {
        let mut vertices = open.to_vec();
        if let Some(&first) = open.first() {
            vertices.push(first);
        }
        Self { vertices }
    }

    /// Vertices including the closing repeat.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Unsigned shoelace area.
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices).abs()
    }

    /// Bounding box as `([xmin, ymin], [xmax, ymax])`.
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for &(x, y) in &self.vertices {
            lo[0] = lo[0].min(x);
            lo[1] = lo[1].min(y);
            hi[0] = hi[0].max(x);
            hi[1] = hi[1].max(y);
        }
        (lo, hi)
    }

    /// Point-in-polygon with boundary points counted as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let v = &self.vertices;
        if v.len() < 4 {
            return false;
        }
        let mut inside = false;
        for w in v.windows(2) {
            let (a, b) = (w[0], w[1]);
            if on_segment(a, b, (x, y)) {
                return true;
            }
            if (a.1 > y) != (b.1 > y) {
                let x_cross = a.0 + (y - a.1) * (b.0 - a.0) / (b.1 - a.1);
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// `POLYGON((x y, ...))` with full precision.
    pub fn to_wkt(&self) -> String {
        if self.vertices.is_empty() {
            return "POLYGON EMPTY".to_string();
        }
        let mut wkt = String::from("POLYGON((");
        for (i, &(x, y)) in self.vertices.iter().enumerate() {
            if i > 0 {
                wkt.push(',');
            }
            let _ = write!(wkt, "{x} {y}");
        }
        wkt.push_str("))");
        wkt
    }
}

/// Convex hull (Andrew's monotone chain).
///
/// Returns the hull vertices counter-clockwise starting from the lowest-x
/// (then lowest-y) point, without the closing repeat and without collinear
/// boundary points. Fewer than three non-collinear inputs yield fewer than
/// three vertices.
pub fn convex_hull(points: &[Vertex]) -> Vec<Vertex> {
    let mut pts: Vec<Vertex> = points.to_vec();
    pts.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    });
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Vertex> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Vertex> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// z-component of `(a - o) × (b - o)`; positive for a left turn.
#[inline]
pub fn cross(o: Vertex, a: Vertex, b: Vertex) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn signed_area(ring: &[Vertex]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<f64>()
        * 0.5
}

fn on_segment(a: Vertex, b: Vertex, p: Vertex) -> bool {
    const EPS: f64 = 1e-12;
    let scale = ((b.0 - a.0).abs() + (b.1 - a.1).abs()).max(1.0);
    cross(a, b, p).abs() <= EPS * scale * scale
        && p.0 >= a.0.min(b.0) - EPS
        && p.0 <= a.0.max(b.0) + EPS
        && p.1 >= a.1.min(b.1) - EPS
        && p.1 <= a.1.max(b.1) + EPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hull_drops_interior_and_collinear_points() {
        let pts = vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
            (1.0, 1.0),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull, vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert!(signed_area(&Ring::close(&hull).vertices) > 0.0);
    }

    #[test]
    fn collinear_input_has_no_area() {
        let hull = convex_hull(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert!(hull.len() < 3);
    }

    #[test]
    fn ring_area_and_containment() {
        let ring = Ring::close(&[(0.0, 0.0), (4.0, 0.0), (4.0, 3.0), (0.0, 3.0)]);
        assert_eq!(ring.vertices().len(), 5);
        assert_relative_eq!(ring.area(), 12.0);
        assert!(ring.contains(2.0, 1.5));
        assert!(ring.contains(4.0, 1.0));
        assert!(ring.contains(0.0, 0.0));
        assert!(!ring.contains(4.1, 1.0));
        assert!(!ring.contains(-0.5, 2.0));
    }

    #[test]
    fn wkt_repeats_first_vertex() {
        let ring = Ring::close(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        assert_eq!(ring.to_wkt(), "POLYGON((0 0,1 0,0 1,0 0))");
    }
}
