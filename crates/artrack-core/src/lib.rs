//! Core types for monocular fiducial-marker tracking.
//!
//! This crate holds the pieces every stage of the pipeline shares: borrowed
//! camera [`Frame`]s and their luminance plane, the [`Camera`] model with
//! radial distortion, 4-point [`Homography`] estimation and rigid [`Pose`]s.
//! It has no notion of markers; see `artrack-square` and `artrack-pattern`.

mod camera;
mod homography;
mod image;
mod logger;
mod pose;

pub use camera::{
    Camera, CameraError, CameraModel, RadialDistortion, UndistortConfig, UndistortTable,
    Undistortion,
};
pub use homography::{homography_from_4pt, homography_from_points, unit_square_to_quad, Homography};
pub use image::{
    sample_bilinear, sample_bilinear_u8, Frame, FrameError, GrayImage, GrayImageView, PixelFormat,
};
pub use pose::{project_to_so3, Pose};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, TraceFormat};

pub use logger::{init_tracker_only, init_with_level};
