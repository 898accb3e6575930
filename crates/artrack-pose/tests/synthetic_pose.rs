use artrack_core::{Camera, Pose};
use artrack_pose::{estimate_pose, marker_corners, PoseEstimator, PoseParams};
use nalgebra::{Point2, Rotation3, Vector3};
use std::f64::consts::PI;

fn camera() -> Camera {
    Camera::pinhole(320, 240, 400.0, 400.0, 160.0, 120.0).unwrap()
}

fn poses() -> Vec<Pose> {
    let mut out = Vec::new();
    for &(rx, ry, rz) in &[
        (0.0, 0.0, 0.0),
        (0.05, -0.02, 0.3),
        (0.4, 0.1, -0.6),
        (-0.3, 0.45, 1.2),
        (0.6, -0.35, 2.5),
    ] {
        // facing the camera, tilted by (rx, ry), spun by rz in its plane
        let rotation = Rotation3::new(Vector3::new(rx, ry, 0.0))
            * Rotation3::from_axis_angle(&Vector3::x_axis(), PI)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), rz);
        for &z in &[300.0, 450.0, 700.0] {
            out.push(Pose::new(rotation.into_inner(), Vector3::new(12.0, -8.0, z)));
        }
    }
    out
}

fn project(cam: &Camera, pose: &Pose, width: f64) -> [Point2<f64>; 4] {
    marker_corners(width, [0.0, 0.0]).map(|x| cam.project(&pose.transform_point(&x).coords).unwrap())
}

#[test]
fn noise_free_corners_give_exact_poses() {
    let cam = camera();
    let model = marker_corners(80.0, [0.0, 0.0]);
    for estimator in [PoseEstimator::Original, PoseEstimator::Rpp] {
        let params = PoseParams {
            estimator,
            ..PoseParams::default()
        };
        for truth in poses() {
            let image = project(&cam, &truth, 80.0);
            let fit = estimate_pose(&cam, &model, &image, None, &params).unwrap();
            assert!(fit.pose.rotation_angle_to(&truth) < 1e-4, "{estimator:?} {truth:?}");
            assert!((fit.pose.translation - truth.translation).norm() < 1e-2);
            assert!(fit.pose.is_orthonormal(1e-9));
        }
    }
}

#[test]
fn corner_noise_keeps_translation_within_two_percent() {
    let cam = camera();
    let model = marker_corners(80.0, [0.0, 0.0]);
    let jitter = [(0.2, -0.1), (-0.15, 0.2), (0.1, 0.15), (-0.2, -0.2)];
    let params = PoseParams::default();
    for truth in poses() {
        let mut image = project(&cam, &truth, 80.0);
        for (p, (dx, dy)) in image.iter_mut().zip(jitter) {
            p.x += dx;
            p.y += dy;
        }
        let fit = estimate_pose(&cam, &model, &image, None, &params).unwrap();
        let rel = (fit.pose.translation - truth.translation).norm() / truth.translation.norm();
        assert!(rel < 0.02, "relative translation error {rel} at {truth:?}");
        assert!(fit.error < 0.1);
    }
}
