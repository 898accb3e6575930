//! Rigid multi-marker rigs and their JSON representation.

use crate::model::marker_corners;
use artrack_core::Pose;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum RigError {
    #[error("rig has no markers")]
    Empty,
    #[error("pattern {0} is not registered")]
    UnknownPattern(u32),
    #[error("pattern {0} appears more than once in the rig")]
    DuplicateId(u32),
    #[error("marker {id} has invalid width {width}")]
    InvalidWidth { id: u32, width: f64 },
    #[error("marker {0} has a non-orthonormal rotation")]
    NonOrthonormal(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One marker of a rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigEntry {
    pub pattern_id: u32,
    /// Side length in rig units.
    pub width: f64,
    /// Marker centre within its own plane.
    #[serde(default)]
    pub center: [f64; 2],
    /// Marker-to-rig transform.
    #[serde(default)]
    pub transform: Pose,
}

impl RigEntry {
    /// Marker lying in the rig plane at `(x, y)`, unrotated.
    pub fn planar(pattern_id: u32, width: f64, x: f64, y: f64) -> Self {
        Self {
            pattern_id,
            width,
            center: [0.0, 0.0],
            transform: Pose::new(
                nalgebra::Matrix3::identity(),
                nalgebra::Vector3::new(x, y, 0.0),
            ),
        }
    }

    /// Canonical corners (TL, TR, BR, BL) in rig coordinates.
    pub fn corners(&self) -> [Point3<f64>; 4] {
        marker_corners(self.width, self.center).map(|c| self.transform.transform_point(&c))
    }
}

/// An ordered set of markers with fixed relative placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rig {
    pub markers: Vec<RigEntry>,
}

const ORTHONORMAL_TOL: f64 = 1e-6;

impl Rig {
    /// Validated rig; `is_registered` reports whether a pattern id exists.
    pub fn new(markers: Vec<RigEntry>, is_registered: impl Fn(u32) -> bool) -> Result<Self, RigError> {
        let rig = Self { markers };
        rig.validate(is_registered)?;
        Ok(rig)
    }

    pub fn validate(&self, is_registered: impl Fn(u32) -> bool) -> Result<(), RigError> {
        if self.markers.is_empty() {
            return Err(RigError::Empty);
        }
        let mut seen = HashSet::with_capacity(self.markers.len());
        for m in &self.markers {
            if !seen.insert(m.pattern_id) {
                return Err(RigError::DuplicateId(m.pattern_id));
            }
            if !(m.width.is_finite() && m.width > 0.0) {
                return Err(RigError::InvalidWidth {
                    id: m.pattern_id,
                    width: m.width,
                });
            }
            if !m.transform.is_orthonormal(ORTHONORMAL_TOL) {
                return Err(RigError::NonOrthonormal(m.pattern_id));
            }
            if !is_registered(m.pattern_id) {
                return Err(RigError::UnknownPattern(m.pattern_id));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Index of the entry carrying `pattern_id`.
    pub fn position(&self, pattern_id: u32) -> Option<usize> {
        self.markers.iter().position(|m| m.pattern_id == pattern_id)
    }

    /// Load a rig from JSON. Call [`Rig::validate`] before tracking with it.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, RigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this rig to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), RigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
