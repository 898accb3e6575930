//! Damped Gauss-Newton refinement of a pose over reprojection error.

use crate::model::reprojection_error;
use crate::params::{PoseFit, PoseParams};
use artrack_core::{project_to_so3, Camera, Pose};
use nalgebra::{Matrix3, Matrix6, Point2, Point3, Rotation3, RowVector3, RowVector6, Vector3, Vector6};

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e8;

/// Refine `initial` so that `model` projects onto `image`.
///
/// The update is `R <- exp(w) R`, `t <- t + dt` over the six parameters
/// `(w, dt)`. Returns `None` when the seed puts a point behind the camera.
pub fn refine_pose(
    camera: &Camera,
    initial: &Pose,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
    params: &PoseParams,
) -> Option<PoseFit> {
    let m = camera.intrinsics.fixed_view::<3, 3>(0, 0).into_owned();
    let m4: Vector3<f64> = camera.intrinsics.column(3).into_owned();

    let mut pose = *initial;
    let mut error = reprojection_error(camera, &pose, model, image)?;
    let mut lambda = INITIAL_DAMPING;

    for _ in 0..params.max_iterations {
        if error < params.fit_tolerance {
            break;
        }
        let (jtj, jtr) = normal_equations(&m, &m4, &pose, model, image);

        let mut a = jtj;
        for i in 0..6 {
            a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }
        let Some(delta) = a.cholesky().map(|c| c.solve(&(-jtr))) else {
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                break;
            }
            continue;
        };

        let candidate = apply_update(&pose, &delta);
        match reprojection_error(camera, &candidate, model, image) {
            Some(new_error) if new_error < error => {
                let ratio = new_error / error;
                pose = candidate;
                error = new_error;
                lambda = (lambda / 10.0).max(1e-12);
                if ratio > params.convergence_ratio {
                    break;
                }
            }
            _ => {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    break;
                }
            }
        }
    }

    pose.rotation = project_to_so3(&pose.rotation);
    let error = reprojection_error(camera, &pose, model, image)?;
    Some(PoseFit { pose, error })
}

fn normal_equations(
    m: &Matrix3<f64>,
    m4: &Vector3<f64>,
    pose: &Pose,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
) -> (Matrix6<f64>, Vector6<f64>) {
    let mut jtj = Matrix6::zeros();
    let mut jtr = Vector6::zeros();
    let (row0, row1, row2) = (m.row(0), m.row(1), m.row(2));

    for (x, u) in model.iter().zip(image) {
        let rx = pose.rotation * x.coords;
        let p = rx + pose.translation;
        let h = m * p + m4;
        let inv = 1.0 / h.z;
        let inv2 = inv * inv;

        let du: RowVector3<f64> = (row0 * h.z - row2 * h.x) * inv2;
        let dv: RowVector3<f64> = (row1 * h.z - row2 * h.y) * inv2;
        let dp_dw = -rx.cross_matrix();

        let ju = RowVector6::from_iterator((du * dp_dw).iter().chain(du.iter()).copied());
        let jv = RowVector6::from_iterator((dv * dp_dw).iter().chain(dv.iter()).copied());
        let ru = h.x * inv - u.x;
        let rv = h.y * inv - u.y;

        jtj += ju.transpose() * ju + jv.transpose() * jv;
        jtr += ju.transpose() * ru + jv.transpose() * rv;
    }
    (jtj, jtr)
}

fn apply_update(pose: &Pose, delta: &Vector6<f64>) -> Pose {
    let w = Vector3::new(delta[0], delta[1], delta[2]);
    let dt = Vector3::new(delta[3], delta[4], delta[5]);
    let r = Rotation3::new(w).into_inner() * pose.rotation;
    Pose::new(r, pose.translation + dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::marker_corners;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn camera() -> Camera {
        Camera::pinhole(640, 480, 500.0, 500.0, 320.0, 240.0).unwrap()
    }

    fn project_all(cam: &Camera, pose: &Pose, model: &[Point3<f64>]) -> Vec<Point2<f64>> {
        model
            .iter()
            .map(|x| cam.project(&pose.transform_point(x).coords).unwrap())
            .collect()
    }

    #[test]
    fn converges_from_a_perturbed_seed() {
        let cam = camera();
        let model = marker_corners(80.0, [0.0, 0.0]);
        let truth = Pose::from_axis_angle(Vector3::new(PI - 0.2, 0.15, 0.05), Vector3::new(20.0, -10.0, 450.0));
        let image = project_all(&cam, &truth, &model);

        let seed = Pose::from_axis_angle(Vector3::new(PI - 0.15, 0.1, 0.0), Vector3::new(15.0, -5.0, 480.0));
        let params = PoseParams {
            max_iterations: 50,
            ..PoseParams::default()
        };
        let fit = refine_pose(&cam, &seed, &model, &image, &params).unwrap();
        assert!(fit.error < 1e-6, "error {}", fit.error);
        assert!(fit.pose.is_orthonormal(1e-9));
        assert_relative_eq!(fit.pose.translation, truth.translation, epsilon = 0.5);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let cam = camera();
        let model = marker_corners(80.0, [0.0, 0.0]);
        let truth = Pose::from_axis_angle(Vector3::new(PI, 0.0, 0.0), Vector3::new(0.0, 0.0, 400.0));
        let image = project_all(&cam, &truth, &model);
        let seed = Pose::from_axis_angle(Vector3::new(PI - 0.1, 0.0, 0.0), Vector3::new(5.0, 0.0, 420.0));
        let seed_error = reprojection_error(&cam, &seed, &model, &image).unwrap();

        let params = PoseParams {
            max_iterations: 0,
            ..PoseParams::default()
        };
        let fit = refine_pose(&cam, &seed, &model, &image, &params).unwrap();
        assert_relative_eq!(fit.error, seed_error, max_relative = 1e-9);
    }
}
