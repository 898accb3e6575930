use artrack_core::Pose;
use serde::{Deserialize, Serialize};

/// Single-marker pose strategy, chosen once per session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseEstimator {
    /// Homography initializer followed by Gauss-Newton refinement.
    #[default]
    Original,
    /// Gauss-Newton seeded from the previous frame's pose.
    Continuation,
    /// Orthogonal iteration over several starting rotations.
    Rpp,
}

/// Parameters shared by all pose estimators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseParams {
    pub estimator: PoseEstimator,
    /// Gauss-Newton iteration cap.
    pub max_iterations: usize,
    /// Stop once the mean squared reprojection error (px²) drops below this.
    pub fit_tolerance: f64,
    /// Stop when an accepted step shrinks the error by less than this ratio.
    pub convergence_ratio: f64,
    /// Continuation results above this error are checked against a fresh
    /// solve from the closed-form initializer.
    pub continuation_fallback_error: f64,
    /// Poses with a larger error are reported as not trackable.
    pub max_fit_error: f64,
    pub rpp_max_iterations: usize,
    /// Relative object-space error change that ends orthogonal iteration.
    pub rpp_tolerance: f64,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            estimator: PoseEstimator::Original,
            max_iterations: 10,
            fit_tolerance: 1e-6,
            convergence_ratio: 0.999,
            continuation_fallback_error: 4.0,
            max_fit_error: 25.0,
            rpp_max_iterations: 100,
            rpp_tolerance: 1e-10,
        }
    }
}

/// A pose together with its mean squared reprojection error (px²).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseFit {
    pub pose: Pose,
    pub error: f64,
}

impl PoseFit {
    /// Whether the fit passes the session's acceptance ceiling.
    #[inline]
    pub fn is_trackable(&self, params: &PoseParams) -> bool {
        self.error.is_finite() && self.error <= params.max_fit_error
    }
}
