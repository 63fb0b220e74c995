//! Segmentation parameters.
//!
//! Defaults follow the values the production driver was tuned with:
//! HDBSCAN `(min_cluster_size, min_samples) = (40, 60)` on XY, a 0.5 m peak
//! raster, sub-segmentation only for crowns of at least 2 m² and 10 points,
//! and an 800 m² ceiling for refined crowns.

use std::path::Path;

use serde::Deserialize;

use crate::error::{CrownError, Result};

/// How heights are turned into raster values before peak detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightTransform {
    /// Raster holds `z`.
    Raw,
    /// Raster holds `z·|z|`: `z²` for the usual non-negative heights, so tall
    /// returns dominate each cell, while keeping the sign of heights below
    /// the datum.
    #[default]
    Squared,
}

impl HeightTransform {
    #[inline]
    pub fn apply(self, z: f64) -> f64 {
        match self {
            HeightTransform::Raw => z,
            HeightTransform::Squared => z * z.abs(),
        }
    }

    /// Maps a raster value back to a height.
    #[inline]
    pub fn invert(self, v: f64) -> f64 {
        match self {
            HeightTransform::Raw => v,
            HeightTransform::Squared => v.signum() * v.abs().sqrt(),
        }
    }
}

/// Parameters of the attribute-refinement pass run before sub-segmentation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RefineParams {
    /// Skip the pass entirely when `false`.
    pub enabled: bool,
    /// Points below this height above ground are dropped.
    pub hag_min: f64,
    /// Neighbourhood size for normal and coplanarity estimation.
    pub knn: usize,
    /// Coplanar if `λ1 > thresh1 · λ0` ...
    pub coplanar_thresh1: f64,
    /// ... and `thresh2 · λ1 > λ2` (eigenvalues ascending).
    pub coplanar_thresh2: f64,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            enabled: true,
            hag_min: 0.5,
            knn: 8,
            coplanar_thresh1: 25.0,
            coplanar_thresh2: 6.0,
        }
    }
}

/// Full parameter set for [`crate::pipeline::crown_detection`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentationParams {
    // -- density clustering --
    /// Smallest group HDBSCAN reports as a cluster.
    pub min_cluster_size: usize,
    /// Neighbour count defining a point's core distance.
    pub min_samples: usize,
    /// Cluster on (x, y, z) instead of (x, y).
    pub use_3d: bool,
    /// Let the whole point set count as one cluster. Needed for areas that
    /// hold a single tree.
    pub allow_single_cluster: bool,

    // -- hull filters --
    /// Clusters at or below this many points per unit area are dropped.
    pub min_density: f64,
    /// Refined crowns at or above this area are dropped (`None` disables).
    pub max_area: Option<f64>,

    // -- sub-segmentation --
    /// Minimum crown area for sub-segmentation.
    pub min_area: f64,
    /// Minimum member count for sub-segmentation.
    pub min_points: usize,
    /// Peak separation in raster cells. Kept as `f64` so non-integers can be
    /// rejected instead of truncated.
    pub min_dist: f64,
    /// Peaks below `relative_threshold · max(raster)` are ignored.
    pub relative_threshold: f64,
    /// Raster cell size in map units.
    pub round_val: f64,
    pub height_transform: HeightTransform,
    /// Iteration cap for k-means without seeds.
    pub kmeans_max_iter: usize,
    /// RNG seed for k-means++ initialization.
    pub kmeans_seed: u64,
    pub refine: RefineParams,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 40,
            min_samples: 60,
            use_3d: false,
            allow_single_cluster: false,
            min_density: 3.0,
            max_area: Some(800.0),
            min_area: 2.0,
            min_points: 10,
            min_dist: 1.0,
            relative_threshold: 0.0,
            round_val: 0.5,
            height_transform: HeightTransform::Squared,
            kmeans_max_iter: 100,
            kmeans_seed: 0,
            refine: RefineParams::default(),
        }
    }
}

impl SegmentationParams {
    /// Loads parameters from a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Peak separation in cells. Only meaningful after [`Self::validate`].
    #[inline]
    pub fn min_dist_cells(&self) -> usize {
        self.min_dist as usize
    }

    /// Precondition checks run before any stage starts.
    pub fn validate(&self) -> Result<()> {
        if !self.min_dist.is_finite() || self.min_dist.fract() != 0.0 || self.min_dist < 1.0 {
            return Err(CrownError::InvalidConfig(format!(
                "min_dist is a distance in raster cells and must be a positive integer, got {}",
                self.min_dist
            )));
        }
        if !(self.round_val.is_finite() && self.round_val > 0.0) {
            return Err(CrownError::InvalidConfig(format!(
                "round_val must be a positive grid size, got {}",
                self.round_val
            )));
        }
        if self.min_cluster_size < 2 {
            return Err(CrownError::InvalidConfig(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.min_samples == 0 {
            return Err(CrownError::InvalidConfig(
                "min_samples must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relative_threshold) {
            return Err(CrownError::InvalidConfig(format!(
                "relative_threshold must lie in [0, 1], got {}",
                self.relative_threshold
            )));
        }
        if let Some(max_area) = self.max_area {
            if max_area <= self.min_area {
                return Err(CrownError::InvalidConfig(format!(
                    "max_area ({max_area}) must exceed min_area ({})",
                    self.min_area
                )));
            }
        }
        if self.kmeans_max_iter == 0 {
            return Err(CrownError::InvalidConfig(
                "kmeans_max_iter must be at least 1".into(),
            ));
        }
        if self.refine.enabled && self.refine.knn < 3 {
            return Err(CrownError::InvalidConfig(format!(
                "refine.knn must be at least 3 to fit a plane, got {}",
                self.refine.knn
            )));
        }
        Ok(())
    }
}
