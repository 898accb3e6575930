//! Camera model: 3×4 intrinsics, radial distortion and the undistortion
//! strategies used to move between observed and ideal pixel coordinates.

use nalgebra::{Matrix3, Matrix3x4, Point2, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("invalid camera resolution (width={width}, height={height})")]
    InvalidResolution { width: usize, height: usize },
    #[error("invalid intrinsic matrix: {0}")]
    InvalidIntrinsics(&'static str),
    #[error("invalid distortion scale {0}")]
    InvalidDistortionScale(f64),
    #[error("invalid clip planes (near={near}, far={far})")]
    InvalidClipPlanes { near: f64, far: f64 },
}

/// Four-parameter radial distortion: centre `(x0, y0)`, distortion factor
/// `f` (in units of 1e-8 per squared pixel) and a scale `s`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadialDistortion {
    pub center: [f64; 2],
    pub factor: f64,
    pub scale: f64,
}

const FACTOR_UNIT: f64 = 1.0e-8;

impl RadialDistortion {
    /// A model with no distortion around `center`.
    pub fn identity(center: [f64; 2]) -> Self {
        Self {
            center,
            factor: 0.0,
            scale: 1.0,
        }
    }

    pub fn ideal_to_observed(&self, p: Point2<f64>) -> Point2<f64> {
        let [x0, y0] = self.center;
        let x = (p.x - x0) * self.scale;
        let y = (p.y - y0) * self.scale;
        let d = x * x + y * y;
        let k = 1.0 - self.factor * FACTOR_UNIT * d;
        Point2::new(x * k + x0, y * k + y0)
    }

    /// Invert [`Self::ideal_to_observed`] with Newton steps on the radius.
    pub fn observed_to_ideal(&self, p: Point2<f64>, cfg: &UndistortConfig) -> Point2<f64> {
        let [x0, y0] = self.center;
        let f = self.factor * FACTOR_UNIT;
        let mut px = p.x - x0;
        let mut py = p.y - y0;
        let q = (px * px + py * py).sqrt();
        if q == 0.0 {
            return Point2::new(x0, y0);
        }

        let mut z0 = q;
        for _ in 0..cfg.max_iters.max(1) {
            let z02 = z0 * z0;
            let z = z0 - ((1.0 - f * z02) * z0 - q) / (1.0 - 3.0 * f * z02);
            px *= z / z0;
            py *= z / z0;
            let step = (z - z0).abs();
            z0 = z;
            if step < cfg.eps || z0 == 0.0 {
                break;
            }
        }

        Point2::new(px / self.scale + x0, py / self.scale + y0)
    }
}

/// Iteration control for the radial inversion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndistortConfig {
    pub max_iters: usize,
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 10,
            eps: 1e-10,
        }
    }
}

/// Intrinsic calibration of the active camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub width: usize,
    pub height: usize,
    /// 3×4 projection matrix `[K | 0]`.
    pub intrinsics: Matrix3x4<f64>,
    pub distortion: RadialDistortion,
}

impl Camera {
    pub fn new(
        width: usize,
        height: usize,
        intrinsics: Matrix3x4<f64>,
        distortion: RadialDistortion,
    ) -> Result<Self, CameraError> {
        let cam = Self {
            width,
            height,
            intrinsics,
            distortion,
        };
        cam.validate()?;
        Ok(cam)
    }

    /// Pinhole camera without lens distortion.
    pub fn pinhole(
        width: usize,
        height: usize,
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
    ) -> Result<Self, CameraError> {
        #[rustfmt::skip]
        let intrinsics = Matrix3x4::new(
            fx, 0.0, cx, 0.0,
            0.0, fy, cy, 0.0,
            0.0, 0.0, 1.0, 0.0,
        );
        Self::new(
            width,
            height,
            intrinsics,
            RadialDistortion::identity([cx, cy]),
        )
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width < 2 || self.height < 2 {
            return Err(CameraError::InvalidResolution {
                width: self.width,
                height: self.height,
            });
        }
        if !self.intrinsics.iter().all(|v| v.is_finite()) {
            return Err(CameraError::InvalidIntrinsics("non-finite entry"));
        }
        if self.intrinsics[(0, 0)] <= 0.0 || self.intrinsics[(1, 1)] <= 0.0 {
            return Err(CameraError::InvalidIntrinsics("focal lengths must be positive"));
        }
        if self.intrinsics[(2, 2)].abs() < 1e-12 {
            return Err(CameraError::InvalidIntrinsics("degenerate last row"));
        }
        let s = self.distortion.scale;
        if !s.is_finite() || s <= 0.0 {
            return Err(CameraError::InvalidDistortionScale(s));
        }
        Ok(())
    }

    /// Left 3×3 block normalized so that `K[2][2] == 1`.
    pub fn k(&self) -> Matrix3<f64> {
        let k = self.intrinsics.fixed_view::<3, 3>(0, 0).into_owned();
        k / self.intrinsics[(2, 2)]
    }

    /// Project a camera-space point to ideal pixel coordinates.
    #[inline]
    pub fn project(&self, p: &Vector3<f64>) -> Option<Point2<f64>> {
        let v = self.intrinsics * Vector4::new(p.x, p.y, p.z, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some(Point2::new(v[0] / v[2], v[1] / v[2]))
    }

    /// Same camera at another resolution.
    pub fn resized(&self, width: usize, height: usize) -> Result<Self, CameraError> {
        if width < 2 || height < 2 {
            return Err(CameraError::InvalidResolution { width, height });
        }
        let s = width as f64 / self.width as f64;
        let mut intrinsics = self.intrinsics;
        for c in 0..4 {
            intrinsics[(0, c)] *= s;
            intrinsics[(1, c)] *= s;
        }
        let d = self.distortion;
        let distortion = RadialDistortion {
            center: [d.center[0] * s, d.center[1] * s],
            factor: d.factor / (s * s),
            scale: d.scale,
        };
        Self::new(width, height, intrinsics, distortion)
    }

    /// Column-major OpenGL projection for a camera looking down `+z`.
    ///
    /// Pixel `(0, 0)` maps to NDC `(-1, 1)` and `(w-1, h-1)` to `(1, -1)`;
    /// `near`/`far` map to NDC depth `-1`/`1`.
    pub fn gl_projection(&self, near: f64, far: f64) -> Result<[f64; 16], CameraError> {
        if !(near > 0.0 && far > near) {
            return Err(CameraError::InvalidClipPlanes { near, far });
        }
        let k = self.k();
        let w1 = (self.width - 1) as f64;
        let h1 = (self.height - 1) as f64;

        let mut m = [0.0; 16];
        m[0] = 2.0 * k[(0, 0)] / w1;
        m[4] = 2.0 * k[(0, 1)] / w1;
        m[8] = 2.0 * k[(0, 2)] / w1 - 1.0;
        m[5] = -2.0 * k[(1, 1)] / h1;
        m[9] = 1.0 - 2.0 * k[(1, 2)] / h1;
        m[10] = (far + near) / (far - near);
        m[14] = -2.0 * far * near / (far - near);
        m[11] = 1.0;
        Ok(m)
    }
}

/// How observed pixels are mapped to ideal (undistorted) ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Undistortion {
    /// Treat observed coordinates as ideal.
    None,
    /// Iterative inversion per point.
    #[default]
    Standard,
    /// Precomputed full-frame table at integer resolution.
    Lut,
}

/// Observed→ideal table covering the whole frame.
#[derive(Clone, Debug)]
pub struct UndistortTable {
    width: usize,
    height: usize,
    entries: Vec<[f32; 2]>,
}

impl UndistortTable {
    pub fn build(camera: &Camera, cfg: &UndistortConfig) -> Self {
        let (w, h) = (camera.width, camera.height);
        let mut entries = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let p = camera
                    .distortion
                    .observed_to_ideal(Point2::new(x as f64, y as f64), cfg);
                entries.push([p.x as f32, p.y as f32]);
            }
        }
        log::debug!("built {w}x{h} undistortion table");
        Self {
            width: w,
            height: h,
            entries,
        }
    }

    /// Nearest entry for `p`, or `None` outside the table.
    #[inline]
    pub fn lookup(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let x = p.x.round();
        let y = p.y.round();
        if x < 0.0 || y < 0.0 || x >= self.width as f64 || y >= self.height as f64 {
            return None;
        }
        let [ix, iy] = self.entries[y as usize * self.width + x as usize];
        Some(Point2::new(ix as f64, iy as f64))
    }

    pub fn size_bytes(width: usize, height: usize) -> usize {
        width * height * std::mem::size_of::<[f32; 2]>()
    }
}

/// The active camera plus its undistortion strategy and derived caches.
#[derive(Debug)]
pub struct CameraModel {
    camera: Camera,
    undistortion: Undistortion,
    cfg: UndistortConfig,
    table: OnceLock<UndistortTable>,
}

impl CameraModel {
    pub fn new(camera: Camera, undistortion: Undistortion) -> Self {
        Self {
            camera,
            undistortion,
            cfg: UndistortConfig::default(),
            table: OnceLock::new(),
        }
    }

    pub fn with_undistort_config(mut self, cfg: UndistortConfig) -> Self {
        self.cfg = cfg;
        self.table = OnceLock::new();
        self
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn undistortion(&self) -> Undistortion {
        self.undistortion
    }

    pub fn set_undistortion(&mut self, undistortion: Undistortion) {
        self.undistortion = undistortion;
    }

    /// Replace the camera; drops any table built for the previous one.
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.table = OnceLock::new();
    }

    /// Whether the lookup table has been built.
    pub fn has_table(&self) -> bool {
        self.table.get().is_some()
    }

    fn table(&self) -> &UndistortTable {
        self.table
            .get_or_init(|| UndistortTable::build(&self.camera, &self.cfg))
    }

    #[inline]
    pub fn ideal_to_observed(&self, p: Point2<f64>) -> Point2<f64> {
        match self.undistortion {
            Undistortion::None => p,
            Undistortion::Standard | Undistortion::Lut => self.camera.distortion.ideal_to_observed(p),
        }
    }

    #[inline]
    pub fn observed_to_ideal(&self, p: Point2<f64>) -> Point2<f64> {
        match self.undistortion {
            Undistortion::None => p,
            Undistortion::Standard => self.camera.distortion.observed_to_ideal(p, &self.cfg),
            Undistortion::Lut => self
                .table()
                .lookup(p)
                .unwrap_or_else(|| self.camera.distortion.observed_to_ideal(p, &self.cfg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distorted_camera() -> Camera {
        let mut cam = Camera::pinhole(320, 240, 400.0, 400.0, 160.0, 120.0).expect("camera");
        cam.distortion = RadialDistortion {
            center: [162.0, 118.0],
            factor: 60.0,
            scale: 0.98,
        };
        cam
    }

    fn grid_points() -> Vec<Point2<f64>> {
        let mut out = Vec::new();
        for y in [0.0, 10.25, 119.5, 200.0, 239.0] {
            for x in [0.0, 33.7, 160.0, 290.5, 319.0] {
                out.push(Point2::new(x, y));
            }
        }
        out
    }

    #[test]
    fn standard_inversion_round_trips() {
        let model = CameraModel::new(distorted_camera(), Undistortion::Standard);
        for p in grid_points() {
            let back = model.ideal_to_observed(model.observed_to_ideal(p));
            assert!((back - p).norm() < 1e-6, "{p:?} -> {back:?}");
        }
    }

    #[test]
    fn identity_strategy_is_a_no_op() {
        let model = CameraModel::new(distorted_camera(), Undistortion::None);
        let p = Point2::new(12.5, 99.0);
        assert_eq!(model.observed_to_ideal(p), p);
        assert_eq!(model.ideal_to_observed(p), p);
    }

    #[test]
    fn table_is_built_lazily_and_round_trips_within_one_entry() {
        let model = CameraModel::new(distorted_camera(), Undistortion::Lut);
        assert!(!model.has_table());

        for p in grid_points() {
            let back = model.ideal_to_observed(model.observed_to_ideal(p));
            assert!((back - p).norm() <= 0.75, "{p:?} -> {back:?}");
        }
        assert!(model.has_table());

        // integer positions hit table entries exactly
        let p = Point2::new(40.0, 30.0);
        let back = model.ideal_to_observed(model.observed_to_ideal(p));
        assert!((back - p).norm() < 1e-3);
    }

    #[test]
    fn replacing_the_camera_drops_the_table() {
        let mut model = CameraModel::new(distorted_camera(), Undistortion::Lut);
        let _ = model.observed_to_ideal(Point2::new(3.0, 4.0));
        assert!(model.has_table());
        model.set_camera(distorted_camera());
        assert!(!model.has_table());
    }

    #[test]
    fn resize_scales_intrinsics_and_distortion() {
        let cam = distorted_camera();
        let half = cam.resized(160, 120).expect("resize");
        assert!((half.intrinsics[(0, 0)] - 200.0).abs() < 1e-12);
        assert!((half.intrinsics[(1, 2)] - 60.0).abs() < 1e-12);
        assert!((half.distortion.center[0] - 81.0).abs() < 1e-12);
        assert!((half.distortion.factor - 240.0).abs() < 1e-9);

        // a point keeps its relative distortion after scaling
        let p = Point2::new(300.0, 20.0);
        let q = cam.distortion.ideal_to_observed(p);
        let q_half = half.distortion.ideal_to_observed(Point2::new(150.0, 10.0));
        assert!((q_half.x * 2.0 - q.x).abs() < 1e-9);
        assert!((q_half.y * 2.0 - q.y).abs() < 1e-9);
    }

    #[test]
    fn gl_projection_matches_pixel_projection() {
        let cam = Camera::pinhole(320, 240, 400.0, 380.0, 150.0, 130.0).expect("camera");
        let m = cam.gl_projection(10.0, 1000.0).expect("projection");
        let p = Vector3::new(12.0, -30.0, 250.0);
        let px = cam.project(&p).expect("in front");

        let clip = |row: usize| m[row] * p.x + m[4 + row] * p.y + m[8 + row] * p.z + m[12 + row];
        let w = clip(3);
        let ndc_x = clip(0) / w;
        let ndc_y = clip(1) / w;
        assert!((ndc_x - (2.0 * px.x / 319.0 - 1.0)).abs() < 1e-12);
        assert!((ndc_y - (1.0 - 2.0 * px.y / 239.0)).abs() < 1e-12);

        let depth = |z: f64| (m[10] * z + m[14]) / z;
        assert!((depth(10.0) + 1.0).abs() < 1e-12);
        assert!((depth(1000.0) - 1.0).abs() < 1e-12);

        assert!(cam.gl_projection(10.0, 5.0).is_err());
    }

    #[test]
    fn invalid_intrinsics_are_rejected() {
        assert!(Camera::pinhole(320, 240, -1.0, 400.0, 160.0, 120.0).is_err());
        assert!(Camera::pinhole(1, 240, 400.0, 400.0, 160.0, 120.0).is_err());
    }

    #[test]
    fn camera_round_trips_through_json() {
        let cam = distorted_camera();
        let json = serde_json::to_string(&cam).expect("serialize");
        let back: Camera = serde_json::from_str(&json).expect("deserialize");
        assert_eq!((back.width, back.height), (cam.width, cam.height));
        assert!((back.intrinsics - cam.intrinsics).abs().max() < 1e-9);
        assert!((back.distortion.factor - cam.distortion.factor).abs() < 1e-12);
        assert!(back.validate().is_ok());

        let mode: Undistortion = serde_json::from_str(r#""lut""#).expect("mode");
        assert_eq!(mode, Undistortion::Lut);
        assert_eq!(serde_json::to_string(&Undistortion::None).expect("mode"), r#""none""#);
    }
}
