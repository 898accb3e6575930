use crate::init::pose_from_homography;
use crate::params::{PoseEstimator, PoseFit, PoseParams};
use crate::refine::refine_pose;
use crate::rpp::rpp_pose;
use artrack_core::{Camera, Pose};
use nalgebra::{Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Estimate the camera-from-model pose with the configured strategy.
///
/// `previous` is the pose this marker had in an earlier frame; only the
/// continuation strategy consumes it (RPP uses it as an extra seed when the
/// model is not planar).
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(estimator = ?params.estimator)))]
pub fn estimate_pose(
    camera: &Camera,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    previous: Option<&Pose>,
    params: &PoseParams,
) -> Option<PoseFit> {
    match params.estimator {
        PoseEstimator::Original => original(camera, model, image, params),
        PoseEstimator::Continuation => {
            let Some(prev) = previous else {
                return original(camera, model, image, params);
            };
            match refine_pose(camera, prev, model, image, params) {
                Some(fit) if fit.error <= params.continuation_fallback_error => Some(fit),
                continued => {
                    log::trace!("continuation fit rejected, solving from scratch");
                    lower_error(continued, original(camera, model, image, params))
                }
            }
        }
        PoseEstimator::Rpp => {
            let seed = pose_from_homography(camera, model, image).or(previous.copied());
            rpp_pose(camera, model, image, seed.as_ref(), params)
        }
    }
}

fn original(
    camera: &Camera,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    params: &PoseParams,
) -> Option<PoseFit> {
    let init = pose_from_homography(camera, model, image)?;
    refine_pose(camera, &init, model, image, params)
}

pub(crate) fn lower_error(a: Option<PoseFit>, b: Option<PoseFit>) -> Option<PoseFit> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.error < a.error { b } else { a }),
        (a, b) => a.or(b),
    }
}
