//! Rig pose from several simultaneously visible markers.

use crate::estimator::lower_error;
use crate::hull::{HullMode, HullPoint, HullSelector};
use crate::init::pose_from_homography;
use crate::model::is_planar;
use crate::params::{PoseEstimator, PoseFit, PoseParams};
use crate::refine::refine_pose;
use crate::rig::Rig;
use crate::rpp::rpp_pose;
use artrack_core::{project_to_so3, Camera, Pose};
use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// How rig observations are combined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    /// `Off` selects weighted per-marker fusion.
    pub hull: HullMode,
    /// Markers unseen for more frames than this drop out of the average.
    pub max_stale_frames: u32,
    /// Per-frame weight decay of a marker that is no longer visible.
    pub decay: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            hull: HullMode::Off,
            max_stale_frames: 0,
            decay: 0.5,
        }
    }
}

/// One detected marker matched to a rig entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigObservation {
    /// Index into [`Rig::markers`].
    pub entry: usize,
    /// Canonical (TL, TR, BR, BL) ideal image corners.
    pub corners: [Point2<f64>; 4],
    /// Camera-from-marker pose of this marker alone, if it was solved.
    pub pose: Option<Pose>,
    pub confidence: f64,
}

/// Fused camera-from-rig pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigFit {
    pub pose: Pose,
    pub error: f64,
    /// Markers visible in this frame.
    pub markers: usize,
}

#[derive(Clone, Copy, Debug)]
struct Recent {
    rig_pose: Pose,
    confidence: f64,
    frames_since_seen: u32,
}

/// Tracks one rig across frames.
#[derive(Debug)]
pub struct RigTracker {
    rig: Rig,
    corners: Vec<[Point3<f64>; 4]>,
    /// Rig-to-marker transforms.
    inverse: Vec<Pose>,
    recent: Vec<Option<Recent>>,
    fused: Option<Pose>,
    selector: HullSelector,
    hull_input: Vec<HullPoint>,
    model: Vec<Point3<f64>>,
    image: Vec<Point2<f64>>,
}

impl RigTracker {
    pub fn new(rig: Rig) -> Self {
        let corners = rig.markers.iter().map(|m| m.corners()).collect();
        let inverse = rig.markers.iter().map(|m| m.transform.inverse()).collect();
        let n = rig.markers.len();
        Self {
            rig,
            corners,
            inverse,
            recent: vec![None; n],
            fused: None,
            selector: HullSelector::with_capacity(4 * n),
            hull_input: Vec::with_capacity(4 * n),
            model: Vec::with_capacity(4 * n),
            image: Vec::with_capacity(4 * n),
        }
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    /// Pose from the most recent successful update.
    pub fn pose(&self) -> Option<&Pose> {
        self.fused.as_ref()
    }

    /// Forget all cross-frame state.
    pub fn reset(&mut self) {
        self.recent.iter_mut().for_each(|r| *r = None);
        self.fused = None;
    }

    /// Image points the last hull solve used.
    pub fn hull_points(&self) -> &[Point2<f64>] {
        &self.image
    }

    /// Fold this frame's observations into the rig pose.
    ///
    /// Returns `None` when no rig marker is visible or the fused pose exceeds
    /// `pose_params.max_fit_error`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(observed = observations.len())))]
    pub fn update(
        &mut self,
        camera: &Camera,
        observations: &[RigObservation],
        fusion: &FusionParams,
        pose_params: &PoseParams,
    ) -> Option<RigFit> {
        self.age(fusion.max_stale_frames);
        for obs in observations {
            let Some(pose) = obs.pose else { continue };
            let Some(inverse) = self.inverse.get(obs.entry) else {
                continue;
            };
            self.recent[obs.entry] = Some(Recent {
                rig_pose: pose.compose(inverse),
                confidence: obs.confidence,
                frames_since_seen: 0,
            });
        }
        let visible = observations
            .iter()
            .filter(|o| o.entry < self.corners.len())
            .count();
        if visible == 0 {
            self.fused = None;
            return None;
        }

        let fit = match fusion.hull {
            HullMode::Off => self.fuse_direct(camera, observations, fusion, pose_params),
            mode => self.fuse_hull(camera, observations, mode, pose_params),
        };
        match fit {
            Some(fit) if fit.is_trackable(pose_params) => {
                self.fused = Some(fit.pose);
                Some(RigFit {
                    pose: fit.pose,
                    error: fit.error,
                    markers: visible,
                })
            }
            other => {
                log::debug!("rig pose rejected (error {:?})", other.map(|f| f.error));
                self.fused = None;
                None
            }
        }
    }

    fn age(&mut self, max_stale: u32) {
        for slot in &mut self.recent {
            if let Some(r) = slot {
                r.frames_since_seen += 1;
                if r.frames_since_seen > max_stale {
                    *slot = None;
                }
            }
        }
    }

    /// Weighted mean of the per-marker rig poses.
    fn weighted_mean(&self, decay: f64) -> Option<Pose> {
        let mut rot = Matrix3::zeros();
        let mut trans = Vector3::zeros();
        let mut total = 0.0;
        for r in self.recent.iter().flatten() {
            let w = r.confidence.max(1e-6) * decay.powi(r.frames_since_seen as i32);
            rot += r.rig_pose.rotation * w;
            trans += r.rig_pose.translation * w;
            total += w;
        }
        (total > 0.0).then(|| Pose::new(project_to_so3(&rot), trans / total))
    }

    fn fuse_direct(
        &mut self,
        camera: &Camera,
        observations: &[RigObservation],
        fusion: &FusionParams,
        params: &PoseParams,
    ) -> Option<PoseFit> {
        self.model.clear();
        self.image.clear();
        for obs in observations {
            let Some(corners) = self.corners.get(obs.entry) else {
                continue;
            };
            self.model.extend_from_slice(corners);
            self.image.extend_from_slice(&obs.corners);
        }

        let mean = self.weighted_mean(fusion.decay);
        let from_previous = self
            .fused
            .and_then(|seed| refine_pose(camera, &seed, &self.model, &self.image, params));
        if let Some(fit) = from_previous {
            if fit.error <= params.continuation_fallback_error {
                return Some(fit);
            }
        }
        let seed = mean.or_else(|| pose_from_homography(camera, &self.model, &self.image));
        let from_mean = seed.and_then(|s| refine_pose(camera, &s, &self.model, &self.image, params));
        lower_error(from_previous, from_mean)
    }

    fn fuse_hull(
        &mut self,
        camera: &Camera,
        observations: &[RigObservation],
        mode: HullMode,
        params: &PoseParams,
    ) -> Option<PoseFit> {
        self.hull_input.clear();
        for obs in observations {
            if obs.entry >= self.corners.len() {
                continue;
            }
            for (c, p) in obs.corners.iter().enumerate() {
                self.hull_input
                    .push(HullPoint::new(p.x.round() as i64, p.y.round() as i64, obs.entry, c));
            }
        }

        self.model.clear();
        self.image.clear();
        for hp in self.selector.select(&self.hull_input, mode) {
            let Some(obs) = observations.iter().find(|o| o.entry == hp.entry) else {
                continue;
            };
            self.model.push(self.corners[hp.entry][hp.corner]);
            self.image.push(obs.corners[hp.corner]);
        }
        if self.model.len() < 4 {
            log::debug!("hull selection degenerate ({} points)", self.model.len());
            return None;
        }

        let seed = self.nearest_marker_seed(observations).or(self.fused);
        if params.estimator == PoseEstimator::Rpp {
            let rpp_seed = if is_planar(&self.model) { None } else { seed };
            return rpp_pose(camera, &self.model, &self.image, rpp_seed.as_ref(), params);
        }
        let seed = seed.or_else(|| pose_from_homography(camera, &self.model, &self.image))?;
        refine_pose(camera, &seed, &self.model, &self.image, params)
    }

    /// Rig pose implied by the observed marker closest to the centroid of
    /// the selected hull points.
    fn nearest_marker_seed(&self, observations: &[RigObservation]) -> Option<Pose> {
        let n = self.image.len() as f64;
        let cx = self.image.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = self.image.iter().map(|p| p.y).sum::<f64>() / n;

        observations
            .iter()
            .filter_map(|o| {
                let pose = o.pose?;
                let inverse = self.inverse.get(o.entry)?;
                let mx = o.corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
                let my = o.corners.iter().map(|p| p.y).sum::<f64>() / 4.0;
                let d = (mx - cx).powi(2) + (my - cy).powi(2);
                Some((d, pose.compose(inverse)))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, pose)| pose)
    }
}
