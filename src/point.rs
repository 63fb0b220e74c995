//! Attributed LiDAR points as delivered by the acquisition stage.

use serde::Deserialize;

/// Stable index of a point inside the [`PointCloud`] it was loaded into.
pub type PointId = usize;

/// ASPRS classification code for ground returns.
pub const GROUND_CLASS: u8 = 2;

/// One LiDAR return with its upstream-computed attributes.
///
/// Field names follow the PDAL dimension names so a CSV dump of a PDAL
/// pipeline deserializes directly.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    #[serde(rename = "Classification")]
    pub classification: u8,
    #[serde(rename = "ReturnNumber")]
    pub return_number: u8,
    #[serde(rename = "NumberOfReturns")]
    pub number_of_returns: u8,
    #[serde(rename = "Intensity", default)]
    pub intensity: u16,
    #[serde(rename = "HeightAboveGround")]
    pub hag: f64,
    #[serde(rename = "Coplanar", default)]
    pub coplanar: f64,
    #[serde(rename = "NormalX", default)]
    pub nx: f64,
    #[serde(rename = "NormalY", default)]
    pub ny: f64,
    #[serde(rename = "NormalZ", default)]
    pub nz: f64,
    #[serde(rename = "Red", default)]
    pub red: Option<u16>,
    #[serde(rename = "Green", default)]
    pub green: Option<u16>,
    #[serde(rename = "Blue", default)]
    pub blue: Option<u16>,
}

impl Point {
    /// Minimal vegetation point at `(x, y, z)`: two returns, unclassified,
    /// HAG equal to `z`, upward normal.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            classification: 1,
            return_number: 1,
            number_of_returns: 2,
            intensity: 0,
            hag: z,
            coplanar: 0.0,
            nx: 0.0,
            ny: 0.0,
            nz: 1.0,
            red: None,
            green: None,
            blue: None,
        }
    }

    #[inline]
    pub fn is_ground(&self) -> bool {
        self.classification == GROUND_CLASS
    }
}

/// Per-stage working copy of a point: position plus the attributes that
/// the refinement pass may recompute. Keyed by the source [`PointId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub id: PointId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub hag: f64,
    pub coplanar: f64,
    pub normal: [f64; 3],
}

impl Sample {
    pub fn from_point(id: PointId, p: &Point) -> Self {
        Self {
            id,
            x: p.x,
            y: p.y,
            z: p.z,
            hag: p.hag,
            coplanar: p.coplanar,
            normal: [p.nx, p.ny, p.nz],
        }
    }

    #[inline]
    pub fn xyz(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Axis-aligned area of interest in map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin: xmin.min(xmax),
            ymin: ymin.min(ymax),
            xmax: xmin.max(xmax),
            ymax: ymin.max(ymax),
        }
    }

    /// Closed containment test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    pub fn area(&self) -> f64 {
        (self.xmax - self.xmin) * (self.ymax - self.ymin)
    }
}

/// Read-only point table. A point's [`PointId`] is its index here.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    points: Vec<Point>,
}

impl PointCloud {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Keep only points inside `bbox`; ids are reassigned densely.
    pub fn cropped(&self, bbox: &BoundingBox) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|p| bbox.contains(p.x, p.y))
                .copied()
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, id: PointId) -> &Point {
        &self.points[id]
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// `(id, point)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Point)> {
        self.points.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
