//! Robust planar pose.
//!
//! Orthogonal iteration (Lu, Hager and Mjolsness) minimizes the object-space
//! collinearity error from several starting rotations: the seed, the seed
//! with the target normal mirrored about the line of sight, and the seed
//! turned half a revolution about the line of sight. The two planar pose
//! solutions live in different basins, so at least one start reaches the
//! global minimum.

use crate::init::pose_from_homography;
use crate::model::reprojection_error;
use crate::params::{PoseFit, PoseParams};
use artrack_core::{project_to_so3, Camera, Pose};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Unit, Vector3};

struct Problem {
    points: Vec<Vector3<f64>>,
    /// Line-of-sight projectors `v vᵀ / vᵀv`.
    projectors: Vec<Matrix3<f64>>,
    /// `(I - mean(V))⁻¹ / n`.
    t_factor: Matrix3<f64>,
}

impl Problem {
    fn new(camera: &Camera, model: &[Point3<f64>], image: &[Point2<f64>]) -> Option<Self> {
        let k_inv = camera.k().try_inverse()?;
        let n = model.len() as f64;
        let projectors: Vec<Matrix3<f64>> = image
            .iter()
            .map(|u| {
                let v = k_inv * Vector3::new(u.x, u.y, 1.0);
                v * v.transpose() / v.norm_squared()
            })
            .collect();
        let mean: Matrix3<f64> = projectors.iter().sum::<Matrix3<f64>>() / n;
        let t_factor = (Matrix3::identity() - mean).try_inverse()? / n;
        Some(Self {
            points: model.iter().map(|p| p.coords).collect(),
            projectors,
            t_factor,
        })
    }

    fn translation(&self, r: &Matrix3<f64>) -> Vector3<f64> {
        let sum: Vector3<f64> = self
            .points
            .iter()
            .zip(&self.projectors)
            .map(|(p, v)| (v - Matrix3::identity()) * (r * p))
            .sum();
        self.t_factor * sum
    }

    fn object_error(&self, r: &Matrix3<f64>, t: &Vector3<f64>) -> f64 {
        self.points
            .iter()
            .zip(&self.projectors)
            .map(|(p, v)| ((Matrix3::identity() - v) * (r * p + t)).norm_squared())
            .sum()
    }

    /// Rotation best aligning the model with the projected points `q`.
    fn absolute_orientation(&self, q: &[Vector3<f64>]) -> Matrix3<f64> {
        let n = self.points.len() as f64;
        let p_mean: Vector3<f64> = self.points.iter().sum::<Vector3<f64>>() / n;
        let q_mean: Vector3<f64> = q.iter().sum::<Vector3<f64>>() / n;
        let m: Matrix3<f64> = self
            .points
            .iter()
            .zip(q)
            .map(|(p, q)| (q - q_mean) * (p - p_mean).transpose())
            .sum();
        project_to_so3(&m)
    }

    fn iterate(&self, start: &Matrix3<f64>, params: &PoseParams, q: &mut Vec<Vector3<f64>>) -> (Pose, f64) {
        let mut r = *start;
        let mut t = self.translation(&r);
        let mut error = self.object_error(&r, &t);

        for _ in 0..params.rpp_max_iterations {
            q.clear();
            q.extend(
                self.points
                    .iter()
                    .zip(&self.projectors)
                    .map(|(p, v)| v * (r * p + t)),
            );
            let r_next = self.absolute_orientation(q);
            let t_next = self.translation(&r_next);
            let next = self.object_error(&r_next, &t_next);
            r = r_next;
            t = t_next;
            let converged = (error - next).abs() <= params.rpp_tolerance * error.max(1e-300);
            error = next;
            if converged {
                break;
            }
        }
        (Pose::new(r, t), error)
    }
}

/// Starting rotations derived from one seed pose.
fn starting_rotations(seed: &Pose, centroid: &Vector3<f64>) -> [Matrix3<f64>; 3] {
    let r1 = seed.rotation;
    let los = (seed.rotation * centroid + seed.translation).normalize();

    let normal = r1.column(2).into_owned();
    let mirrored = los * (2.0 * normal.dot(&los)) - normal;
    let q = Rotation3::rotation_between(&normal, &mirrored)
        .unwrap_or_else(|| {
            let axis = Unit::new_normalize(normal.cross(&los));
            Rotation3::from_axis_angle(&axis, std::f64::consts::PI)
        })
        .into_inner();

    let half_turn = los * los.transpose() * 2.0 - Matrix3::identity();
    [r1, q * r1, half_turn * r1]
}

/// Robust planar pose from `n >= 4` correspondences.
///
/// Without a `seed` the model must be planar (`z = 0`) so the homography
/// initializer can supply one. Solutions placing any point behind the camera
/// are discarded; the reported error is image-space.
pub fn rpp_pose(
    camera: &Camera,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    seed: Option<&Pose>,
    params: &PoseParams,
) -> Option<PoseFit> {
    if model.len() < 4 || model.len() != image.len() {
        return None;
    }
    let seed = match seed {
        Some(pose) => *pose,
        None => pose_from_homography(camera, model, image)?,
    };
    let problem = Problem::new(camera, model, image)?;
    let centroid = problem.points.iter().sum::<Vector3<f64>>() / problem.points.len() as f64;

    let mut scratch = Vec::with_capacity(model.len());
    let mut best: Option<(f64, PoseFit)> = None;
    for start in starting_rotations(&seed, &centroid) {
        let (pose, object_error) = problem.iterate(&start, params, &mut scratch);
        let Some(error) = reprojection_error(camera, &pose, model, image) else {
            continue;
        };
        log::trace!("rpp start: object error {object_error:.3e}, image error {error:.3e}");
        if best.as_ref().is_none_or(|(e, _)| object_error < *e) {
            best = Some((object_error, PoseFit { pose, error }));
        }
    }
    best.map(|(_, fit)| fit)
}
