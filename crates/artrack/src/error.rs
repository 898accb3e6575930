use artrack_core::{CameraError, FrameError};
use artrack_pattern::PatternError;
use artrack_pose::RigError;

use crate::config::MarkerMode;

/// Errors reported by tracker setup and frame submission.
///
/// Per-candidate rejections never surface here; they only shrink the
/// detection list.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("working buffers need {required} bytes, budget is {budget}")]
    MemoryBudget { required: usize, budget: usize },
    #[error("pattern registry is full ({0} patterns)")]
    RegistryFull(usize),
    #[error("pattern {0} is not registered")]
    UnknownPattern(u32),
    #[error("operation requires {0:?} marker mode")]
    WrongMarkerMode(MarkerMode),
    #[error("frame is {got_width}x{got_height}, camera is {width}x{height}")]
    FrameSize {
        width: usize,
        height: usize,
        got_width: usize,
        got_height: usize,
    },
    #[error("rig {0} does not exist")]
    UnknownRig(usize),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Rig(#[from] RigError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
