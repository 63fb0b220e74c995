//! # crownseg — individual tree crowns from airborne LiDAR points
//!
//! Takes an attributed point set (classification, return counts,
//! height-above-ground, normals, coplanarity) and segments tree crowns:
//!
//! - **Density clustering**: `mask`, `hdbscan`
//! - **Crown polygons**: `hull` (convex hull + plausibility filters), `join`
//! - **Sub-crown refinement**: `refine`, `peaks`, `kmeans`, `seeded`
//! - **Identity**: `labels` (label fusion)
//! - **Driver**: `pipeline::crown_detection`
//!
//! Point acquisition, ground classification and HAG/normal estimation
//! happen upstream; this crate only consumes their output.

pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hdbscan;
pub mod hull;
pub mod io;
pub mod join;
pub mod kmeans;
pub mod labels;
pub mod mask;
pub mod peaks;
pub mod pipeline;
pub mod point;
pub mod raster;
pub mod refine;
pub mod seeded;

pub use config::{HeightTransform, RefineParams, SegmentationParams};
pub use error::{CrownError, Result};
pub use hull::CrownPolygon;
pub use labels::{ClusterLabel, NOISE};
pub use pipeline::{crown_detection, CrownDetection};
pub use point::{BoundingBox, Point, PointCloud, PointId};
pub use raster::Raster;
