//! Monocular tracking of square fiducial markers.
//!
//! A [`Tracker`] owns one camera, a set of registered marker patterns (or an
//! ID-marker dictionary) and the working buffers for the per-frame pipeline:
//!
//! 1. luminance conversion of the incoming [`core::Frame`],
//! 2. thresholding, labeling and quad fitting ([`square`]),
//! 3. interior sampling and identification ([`pattern`]),
//! 4. single-marker pose estimation and rig fusion ([`pose`]).
//!
//! ## Quickstart
//!
//! ```no_run
//! use artrack::{Tracker, TrackerConfig};
//! use artrack::core::{Camera, Frame, PixelFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = Camera::pinhole(640, 480, 600.0, 600.0, 320.0, 240.0)?;
//! let mut tracker = Tracker::new(TrackerConfig::default(), camera)?;
//! let hiro = tracker.register_patt_file("patterns/hiro.patt")?;
//! tracker.set_marker_width(hiro, 80.0)?;
//!
//! let pixels = vec![0u8; 640 * 480];
//! let frame = Frame::new(640, 480, PixelFormat::Lum, &pixels)?;
//! for marker in &tracker.track(&frame, None)?.markers {
//!     println!("{} at {:?}", marker.id, marker.pose.translation);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `artrack::core`: frames, camera model, homography, poses, logging.
//! - `artrack::square`: square candidate detection.
//! - `artrack::pattern`: templates, `.patt` files and ID markers.
//! - `artrack::pose`: pose estimators, rigs and hull fusion.
//! - `artrack::frames` (feature `image`): frame views over `image` buffers.

pub use artrack_core as core;
pub use artrack_pattern as pattern;
pub use artrack_pose as pose;
pub use artrack_square as square;

mod config;
mod error;
mod history;
mod registry;
mod tracker;

#[cfg(feature = "image")]
pub mod frames;

pub use config::{Capacity, IdConfig, MarkerMode, TemplateConfig, ThresholdConfig, TrackerConfig};
pub use error::{ConfigIoError, TrackerError};
pub use history::TrackingHistory;
pub use registry::PatternRegistry;
pub use tracker::{RigPose, TrackedMarker, Tracker, TrackingResult};

pub use artrack_core::{Camera, Frame, PixelFormat, Pose};
pub use artrack_pose::{HullMode, PoseEstimator, Rig, RigEntry};
