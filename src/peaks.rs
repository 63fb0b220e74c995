//! Local height maxima inside one crown, used to seed sub-crown clustering.
//!
//! Pipeline: snap XY to a `round_val` grid → per-cell max of the transformed
//! height → local-maximum detection with a `min_dist` cell neighbourhood →
//! map cells back to world coordinates.

use std::collections::HashMap;

use crate::config::HeightTransform;
use crate::point::Sample;
use crate::raster::Raster;

/// A candidate tree top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    /// Raster value at the cell (transformed height).
    pub value: f64,
    /// `value` mapped back to height units.
    pub height: f64,
}

impl Peak {
    /// Seed position for partitional clustering.
    pub fn xyz(&self) -> [f64; 3] {
        [self.x, self.y, self.height]
    }
}

/// Result of [`detect_peaks`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeakDetection {
    /// Number of crowns to split into; never 0. With no detected peak the
    /// whole polygon counts as one implicit peak and `peaks` is empty.
    pub count: usize,
    pub peaks: Vec<Peak>,
}

/// Rasterizes `samples` on a `round_val` grid, keeping the per-cell max of
/// `transform(z)`. Empty cells hold 0. Half-cell offsets snap to the even
/// grid index.
///
/// The raster is sized from the largest snapped offset so every sample has
/// a cell. Returns `None` for an empty input.
pub fn rasterize(samples: &[Sample], round_val: f64, transform: HeightTransform) -> Option<Raster> {
    let snapped: Vec<(i64, i64, f64)> = samples
        .iter()
        .filter(|s| s.x.is_finite() && s.y.is_finite() && s.z.is_finite())
        .map(|s| {
            (
                (s.x / round_val).round_ties_even() as i64,
                (s.y / round_val).round_ties_even() as i64,
                transform.apply(s.z),
            )
        })
        .collect();
    let min_ix = snapped.iter().map(|s| s.0).min()?;
    let min_iy = snapped.iter().map(|s| s.1).min()?;
    let max_ix = snapped.iter().map(|s| s.0).max()?;
    let max_iy = snapped.iter().map(|s| s.1).max()?;

    let ncol = (max_ix - min_ix) as usize + 1;
    let nrow = (max_iy - min_iy) as usize + 1;

    let mut cells: HashMap<(usize, usize), f64> = HashMap::new();
    for &(ix, iy, v) in &snapped {
        let key = ((iy - min_iy) as usize, (ix - min_ix) as usize);
        let cell = cells.entry(key).or_insert(v);
        if v > *cell {
            *cell = v;
        }
    }

    let mut raster = Raster::new(nrow, ncol, 0.0).with_origin(
        min_ix as f64 * round_val,
        min_iy as f64 * round_val,
        round_val,
    );
    for ((r, c), v) in cells {
        raster[(r, c)] = v;
    }
    Some(raster)
}

/// Cells that are the maximum of their `(2·min_dist+1)²` window and exceed
/// `max(min(raster), relative_threshold · max(raster))`.
///
/// Candidates are taken in decreasing value (row-major on ties); a candidate
/// within `min_dist` cells (Chebyshev) of an accepted one is discarded, which
/// collapses plateaus to a single cell.
pub fn local_maxima(raster: &Raster, min_dist: usize, relative_threshold: f64) -> Vec<(usize, usize)> {
    let (Some(lo), Some(hi)) = (raster.min(), raster.max()) else {
        return Vec::new();
    };
    let threshold = lo.max(relative_threshold * hi);
    let w = min_dist as isize;

    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for r in 0..raster.nrow {
        for c in 0..raster.ncol {
            let v = raster.get(r, c);
            if v.is_nan() || v <= threshold {
                continue;
            }
            let mut is_max = true;
            'window: for dr in -w..=w {
                for dc in -w..=w {
                    if let Some(n) = raster.get_opt(r as isize + dr, c as isize + dc) {
                        if n > v {
                            is_max = false;
                            break 'window;
                        }
                    }
                }
            }
            if is_max {
                candidates.push((r, c, v));
            }
        }
    }

    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    let mut accepted: Vec<(usize, usize)> = Vec::new();
    for (r, c, _) in candidates {
        let close = accepted
            .iter()
            .any(|&(ar, ac)| ar.abs_diff(r).max(ac.abs_diff(c)) <= min_dist);
        if !close {
            accepted.push((r, c));
        }
    }
    accepted
}

/// Finds tree-top candidates among one crown's members.
pub fn detect_peaks(
    samples: &[Sample],
    round_val: f64,
    min_dist: usize,
    relative_threshold: f64,
    transform: HeightTransform,
) -> PeakDetection {
    let Some(raster) = rasterize(samples, round_val, transform) else {
        return PeakDetection {
            count: 1,
            peaks: Vec::new(),
        };
    };

    let mut cells = local_maxima(&raster, min_dist, relative_threshold);
    cells.sort_unstable();
    cells.dedup();

    let peaks: Vec<Peak> = cells
        .into_iter()
        .map(|(row, col)| {
            let (x, y) = raster.rc_to_xy(row, col);
            let value = raster[(row, col)];
            Peak {
                row,
                col,
                x,
                y,
                value,
                height: transform.invert(value),
            }
        })
        .collect();

    PeakDetection {
        count: peaks.len().max(1),
        peaks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;
    use approx::assert_relative_eq;

    /// Four points per cell over a 3×3 grid of 1 m cells, `tall` cell raised.
    fn three_by_three(tall: (usize, usize)) -> Vec<Sample> {
        let mut out = Vec::new();
        for r in 0..3 {
            for c in 0..3 {
                let z = if (r, c) == tall { 18.0 } else { 10.0 };
                for (dx, dy) in [(-0.2, -0.2), (0.2, -0.2), (-0.2, 0.2), (0.2, 0.2)] {
                    let p = Point::new(50.0 + c as f64 + dx, 20.0 + r as f64 + dy, z);
                    out.push(Sample::from_point(out.len(), &p));
                }
            }
        }
        out
    }

    #[test]
    fn single_raised_cell_is_the_only_peak() {
        let det = detect_peaks(&three_by_three((1, 1)), 1.0, 1, 0.0, HeightTransform::Squared);
        assert_eq!(det.count, 1);
        assert_eq!(det.peaks.len(), 1);
        let p = det.peaks[0];
        assert_eq!((p.row, p.col), (1, 1));
        assert_relative_eq!(p.x, 51.0);
        assert_relative_eq!(p.y, 21.0);
        assert_relative_eq!(p.value, 324.0);
        assert_relative_eq!(p.height, 18.0);
    }

    #[test]
    fn corner_peak_maps_back_to_its_cell() {
        let det = detect_peaks(&three_by_three((2, 0)), 1.0, 1, 0.0, HeightTransform::Raw);
        assert_eq!(det.peaks.len(), 1);
        assert_relative_eq!(det.peaks[0].x, 50.0);
        assert_relative_eq!(det.peaks[0].y, 22.0);
        assert_relative_eq!(det.peaks[0].height, 18.0);
    }

    #[test]
    fn flat_crown_counts_as_one_implicit_peak() {
        let flat: Vec<Sample> = (0..16)
            .map(|i| Sample::from_point(i, &Point::new((i % 4) as f64, (i / 4) as f64, 7.0)))
            .collect();
        let det = detect_peaks(&flat, 1.0, 1, 0.0, HeightTransform::Squared);
        assert_eq!(det.count, 1);
        assert!(det.peaks.is_empty());
        assert_eq!(detect_peaks(&[], 1.0, 1, 0.0, HeightTransform::Raw).count, 1);
    }

    #[test]
    fn two_separated_tops() {
        let mut samples = Vec::new();
        for c in 0..9 {
            let z = 10.0 - (c as f64 - 2.0).abs().min((c as f64 - 6.0).abs());
            let p = Point::new(c as f64 * 0.5, 0.0, z);
            samples.push(Sample::from_point(c, &p));
        }
        let det = detect_peaks(&samples, 0.5, 1, 0.0, HeightTransform::Squared);
        assert_eq!(det.count, 2);
        let xs: Vec<f64> = det.peaks.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 3.0]);
    }

    #[test]
    fn raster_holds_every_sample() {
        let samples: Vec<Sample> = [(-3.26, 4.9, 2.0), (1.74, -0.1, 3.0), (0.0, 0.0, 5.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y, z))| Sample::from_point(i, &Point::new(x, y, z)))
            .collect();
        let raster = rasterize(&samples, 0.5, HeightTransform::Raw).unwrap();
        assert_eq!((raster.nrow, raster.ncol), (11, 11));
        assert_relative_eq!(raster.x0, -3.5);
        assert_relative_eq!(raster.y0, 0.0);
        assert_relative_eq!(raster[(0, 7)], 5.0);
    }

    #[test]
    fn half_cells_snap_to_even_index() {
        let samples: Vec<Sample> = [(0.25, 0.0, 4.0), (0.75, 0.0, 6.0), (-0.25, 0.0, 7.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y, z))| Sample::from_point(i, &Point::new(x, y, z)))
            .collect();
        let raster = rasterize(&samples, 0.5, HeightTransform::Raw).unwrap();
        // 0.5 → 0, 1.5 → 2, -0.5 → 0
        assert_eq!((raster.nrow, raster.ncol), (1, 3));
        assert_relative_eq!(raster.x0, 0.0);
        assert_relative_eq!(raster[(0, 0)], 7.0);
        assert_relative_eq!(raster[(0, 1)], 0.0);
        assert_relative_eq!(raster[(0, 2)], 6.0);
    }
}
