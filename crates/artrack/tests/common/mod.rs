#![allow(dead_code)]

use artrack::core::{Camera, Pose};
use artrack::pattern::{IdDictionary, IdEncoding, ID_GRID};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use std::f64::consts::PI;

pub const WIDTH: usize = 320;
pub const HEIGHT: usize = 240;
const SUPERSAMPLE: usize = 4;

pub fn camera() -> Camera {
    Camera::pinhole(WIDTH, HEIGHT, 400.0, 400.0, 160.0, 120.0).expect("camera")
}

/// Marker facing the camera, tilted by `(rx, ry)` and spun by `spin` in its
/// own plane.
pub fn facing(rx: f64, ry: f64, spin: f64, translation: Vector3<f64>) -> Pose {
    let rotation = Rotation3::new(Vector3::new(rx, ry, 0.0))
        * Rotation3::from_axis_angle(&Vector3::x_axis(), PI)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), spin);
    Pose::new(rotation.into_inner(), translation)
}

/// A printed marker: dark border around a `size × size` grey interior.
#[derive(Clone, Debug)]
pub struct PrintedMarker {
    /// Camera-from-marker, marker centred at the origin, y up.
    pub pose: Pose,
    pub width: f64,
    pub border: f64,
    pub size: usize,
    pub cells: Vec<u8>,
}

impl PrintedMarker {
    fn shade(&self, x: f64, y: f64) -> Option<u8> {
        let h = self.width / 2.0;
        if x.abs() > h || y.abs() > h {
            return None;
        }
        let u = (x + h) / self.width;
        let v = (h - y) / self.width;
        let b = self.border;
        if u < b || u > 1.0 - b || v < b || v > 1.0 - b {
            return Some(0);
        }
        let span = 1.0 - 2.0 * b;
        let col = (((u - b) / span * self.size as f64) as usize).min(self.size - 1);
        let row = (((v - b) / span * self.size as f64) as usize).min(self.size - 1);
        Some(self.cells[row * self.size + col])
    }

    /// Image-to-marker-plane homography.
    fn plane_from_image(&self, k: &Matrix3<f64>) -> Option<Matrix3<f64>> {
        let r = &self.pose.rotation;
        let t = &self.pose.translation;
        let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), *t]);
        (k * rt).try_inverse()
    }
}

/// Render `markers` on white into a luminance buffer, 4×4 supersampled.
pub fn render(camera: &Camera, markers: &[PrintedMarker]) -> Vec<u8> {
    let k = camera.k();
    let inverses: Vec<_> = markers
        .iter()
        .map(|m| m.plane_from_image(&k).expect("marker plane visible"))
        .collect();
    let mut out = vec![255u8; camera.width * camera.height];
    let n = SUPERSAMPLE as f64;
    for py in 0..camera.height {
        for px in 0..camera.width {
            let mut sum = 0u32;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let x = px as f64 + (sx as f64 + 0.5) / n - 0.5;
                    let y = py as f64 + (sy as f64 + 0.5) / n - 0.5;
                    let shade = markers.iter().zip(&inverses).find_map(|(m, inv)| {
                        let q = inv * Vector3::new(x, y, 1.0);
                        m.shade(q.x / q.z, q.y / q.z)
                    });
                    sum += u32::from(shade.unwrap_or(255));
                }
            }
            out[py * camera.width + px] = (sum / (SUPERSAMPLE * SUPERSAMPLE) as u32) as u8;
        }
    }
    out
}

/// Expand a block drawing (`#` dark, `.` light) to `size × size` grey cells.
pub fn blocks(rows: &[&str], size: usize) -> Vec<u8> {
    let bh = rows.len();
    let bw = rows[0].len();
    let mut out = Vec::with_capacity(size * size);
    for y in 0..size {
        let row = rows[y * bh / size].as_bytes();
        for x in 0..size {
            out.push(if row[x * bw / size] == b'#' { 30 } else { 220 });
        }
    }
    out
}

pub fn hiro_like() -> Vec<u8> {
    blocks(&["##..", "#...", "...#", ".#.."], 16)
}

pub fn kanji_like() -> Vec<u8> {
    blocks(&[".##.", "...#", "#...", "..##"], 16)
}

/// 6×6 cells of ID marker `id`, dark where the code bit is set.
pub fn id_cells(encoding: IdEncoding, id: u32) -> Vec<u8> {
    let code = IdDictionary::new(encoding).code(id).expect("id in range");
    (0..ID_GRID * ID_GRID)
        .map(|i| if (code >> i) & 1 == 1 { 0 } else { 255 })
        .collect()
}

/// Pixel position of the marker-frame point `p`.
pub fn project(camera: &Camera, pose: &Pose, p: Point3<f64>) -> nalgebra::Point2<f64> {
    camera
        .project(&pose.transform_point(&p).coords)
        .expect("point in front of camera")
}
