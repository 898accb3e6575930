//! Pose estimation for square markers and multi-marker rigs.
//!
//! Single markers are solved from their four canonical corners by one of
//! three [`PoseEstimator`] strategies:
//!
//! - `Original`: closed-form homography initializer ([`pose_from_homography`])
//!   refined by damped Gauss-Newton ([`refine_pose`]);
//! - `Continuation`: the same refinement seeded from the previous frame;
//! - `Rpp`: orthogonal iteration from several starts ([`rpp_pose`]), which
//!   avoids the flipped solution of near-frontal planar targets.
//!
//! Every result is a [`PoseFit`] carrying the mean squared reprojection
//! error in ideal pixels.
//!
//! A [`Rig`] places several markers rigidly; [`RigTracker`] fuses their
//! observations either by weighted averaging plus joint refinement, or by
//! solving once from a few points of the approximate convex hull of all
//! visible corners ([`HullMode`]).

mod estimator;
mod fusion;
mod hull;
mod init;
mod model;
mod params;
mod refine;
mod rig;
mod rpp;

pub use estimator::estimate_pose;
pub use fusion::{FusionParams, RigFit, RigObservation, RigTracker};
pub use hull::{near_hull, select_four, HullMode, HullPoint, HullSelector, MAX_HULL_INPUT, MAX_HULL_POINTS};
pub use init::pose_from_homography;
pub use model::{marker_corners, reprojection_error};
pub use params::{PoseEstimator, PoseFit, PoseParams};
pub use refine::refine_pose;
pub use rig::{Rig, RigEntry, RigError};
pub use rpp::rpp_pose;
