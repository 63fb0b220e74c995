//! Dense 2D grid used for peak detection.

use std::ops::{Index, IndexMut};

/// Row-major raster anchored at its lowest corner.
///
/// Cell `(r, c)` sits at world coordinates:
///   x = x0 + c * res
///   y = y0 + r * res
/// so rows grow with `y` (unlike image convention).
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub nrow: usize,
    pub ncol: usize,
    pub data: Vec<f64>,
    /// Cell size in map units.
    pub res: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Raster {
    /// Create a raster filled with a constant value.
    pub fn new(nrow: usize, ncol: usize, fill: f64) -> Self {
        Self {
            nrow,
            ncol,
            data: vec![fill; nrow * ncol],
            res: 1.0,
            x0: 0.0,
            y0: 0.0,
        }
    }

    /// Set the world anchor and cell size.
    pub fn with_origin(mut self, x0: f64, y0: f64, res: f64) -> Self {
        self.x0 = x0;
        self.y0 = y0;
        self.res = res;
        self
    }

    /// Value at (row, col), NaN outside.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row < self.nrow && col < self.ncol {
            self.data[row * self.ncol + col]
        } else {
            f64::NAN
        }
    }

    /// Value at a signed position, `None` outside or NaN.
    #[inline]
    pub fn get_opt(&self, row: isize, col: isize) -> Option<f64> {
        if row < 0 || col < 0 {
            return None;
        }
        let v = self.get(row as usize, col as usize);
        (!v.is_nan()).then_some(v)
    }

    /// World coordinates of cell (row, col).
    pub fn rc_to_xy(&self, row: usize, col: usize) -> (f64, f64) {
        (self.x0 + col as f64 * self.res, self.y0 + row as f64 * self.res)
    }

    /// Largest finite value, or `None` if there is none.
    pub fn max(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    /// Smallest finite value, or `None` if there is none.
    pub fn min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }
}

impl Index<(usize, usize)> for Raster {
    type Output = f64;
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.ncol + c]
    }
}

impl IndexMut<(usize, usize)> for Raster {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.ncol + c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_grow_with_y() {
        let r = Raster::new(3, 4, 0.0).with_origin(100.0, 200.0, 0.5);
        assert_eq!(r.rc_to_xy(0, 0), (100.0, 200.0));
        assert_eq!(r.rc_to_xy(2, 3), (101.5, 201.0));
    }

    #[test]
    fn bounds_and_extrema() {
        let mut r = Raster::new(2, 2, 1.0);
        r[(1, 0)] = 5.0;
        assert_eq!(r.get(1, 0), 5.0);
        assert!(r.get(2, 0).is_nan());
        assert_eq!(r.get_opt(-1, 0), None);
        assert_eq!(r.max(), Some(5.0));
        assert_eq!(r.min(), Some(1.0));
        assert_eq!(Raster::new(0, 0, 0.0).max(), None);
    }
}
