//! Error type shared by every stage.
//!
//! Most "this cluster is not a tree" outcomes are silent filtering, not errors.
//! Only configuration violations, label-merge conflicts and boundary I/O failures
//! surface here.

use thiserror::Error;

use crate::point::PointId;

#[derive(Error, Debug)]
pub enum CrownError {
    /// A configuration value violates its precondition (checked before any stage runs).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sub-cluster labels could not be merged back into the global label table.
    #[error("label merge conflict at point {point_id}: {reason}")]
    LabelMergeConflict { point_id: PointId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CrownError>;
