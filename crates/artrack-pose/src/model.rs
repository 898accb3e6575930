use artrack_core::{Camera, Pose};
use nalgebra::{Point2, Point3};

/// Corners of a square marker of side `width` centred at `center`, in marker
/// coordinates (y up, z = 0), ordered top-left, top-right, bottom-right,
/// bottom-left.
pub fn marker_corners(width: f64, center: [f64; 2]) -> [Point3<f64>; 4] {
    let h = 0.5 * width;
    let [cx, cy] = center;
    [
        Point3::new(cx - h, cy + h, 0.0),
        Point3::new(cx + h, cy + h, 0.0),
        Point3::new(cx + h, cy - h, 0.0),
        Point3::new(cx - h, cy - h, 0.0),
    ]
}

/// Mean squared reprojection error in ideal pixels.
///
/// `None` when the inputs do not pair up or a point lands behind the camera.
pub fn reprojection_error(
    camera: &Camera,
    pose: &Pose,
    model: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Option<f64> {
    if model.is_empty() || model.len() != image.len() {
        return None;
    }
    let mut sum = 0.0;
    for (x, u) in model.iter().zip(image) {
        let p = pose.transform_point(x);
        if p.z <= 0.0 {
            return None;
        }
        let q = camera.project(&p.coords)?;
        sum += (q - u).norm_squared();
    }
    Some(sum / model.len() as f64)
}

/// True when every model point lies on the `z = 0` plane.
pub(crate) fn is_planar(model: &[Point3<f64>]) -> bool {
    let scale = model
        .iter()
        .map(|p| p.coords.amax())
        .fold(1.0_f64, f64::max);
    model.iter().all(|p| p.z.abs() <= 1e-9 * scale)
}
