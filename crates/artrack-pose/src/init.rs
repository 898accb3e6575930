use crate::model::is_planar;
use artrack_core::{homography_from_points, project_to_so3, Camera, Pose};
use nalgebra::{Matrix3, Point2, Point3};

/// Closed-form pose of a planar target from its plane-to-image homography.
///
/// Returns `None` for non-planar models, degenerate correspondences or a
/// singular intrinsic block.
pub fn pose_from_homography(
    camera: &Camera,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Option<Pose> {
    if model.len() < 4 || model.len() != image.len() || !is_planar(model) {
        return None;
    }
    let plane: Vec<Point2<f64>> = model.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let h = homography_from_points(&plane, image)?;
    let a = camera.k().try_inverse()? * h.h;

    let (a1, a2, a3) = (a.column(0), a.column(1), a.column(2));
    let norm = 0.5 * (a1.norm() + a2.norm());
    if norm < 1e-12 {
        return None;
    }
    let s = 1.0 / norm;
    let mut r1 = a1 * s;
    let mut r2 = a2 * s;
    let mut t = a3 * s;
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);
    Some(Pose::new(project_to_so3(&r), t))
}
