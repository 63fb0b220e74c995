//! Cosmetic per-crown colouring for point exports.

use crate::labels::ClusterLabel;
use crate::point::{PointCloud, PointId};

/// High-contrast palette; label `l` gets `PALETTE[l % len]`.
pub const PALETTE: [[u8; 3]; 24] = [
    [1, 0, 103],
    [213, 255, 0],
    [255, 0, 86],
    [158, 0, 142],
    [14, 76, 161],
    [255, 229, 2],
    [0, 95, 57],
    [0, 255, 0],
    [149, 0, 58],
    [255, 147, 126],
    [164, 36, 0],
    [0, 21, 68],
    [145, 208, 203],
    [98, 14, 0],
    [107, 104, 130],
    [0, 0, 255],
    [0, 125, 181],
    [106, 130, 108],
    [0, 174, 126],
    [194, 140, 159],
    [190, 153, 112],
    [0, 143, 156],
    [95, 173, 78],
    [255, 0, 0],
];

/// Colour for points outside any crown.
pub const UNLABELLED: [u8; 3] = [0, 0, 0];

pub fn label_color(label: ClusterLabel) -> [u8; 3] {
    if label < 0 {
        UNLABELLED
    } else {
        PALETTE[label as usize % PALETTE.len()]
    }
}

/// A point with its crown label and display colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredPoint {
    pub id: PointId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub return_number: u8,
    pub label: ClusterLabel,
    pub rgb: [u8; 3],
}

/// Pairs every point with its label colour. `labels[i]` labels point `i`.
pub fn color_points(cloud: &PointCloud, labels: &[ClusterLabel]) -> Vec<ColoredPoint> {
    cloud
        .iter()
        .zip(labels)
        .map(|((id, p), &label)| ColoredPoint {
            id,
            x: p.x,
            y: p.y,
            z: p.z,
            return_number: p.return_number,
            label,
            rgb: label_color(label),
        })
        .collect()
}
