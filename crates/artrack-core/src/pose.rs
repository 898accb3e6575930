use nalgebra::{Matrix3, Matrix3x4, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform `p_dst = R * p_src + t`.
///
/// A marker pose maps marker coordinates into camera coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Build from a rotation vector (axis * angle) and a translation.
    pub fn from_axis_angle(axis_angle: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(
            Rotation3::new(axis_angle).into_inner(),
            translation,
        )
    }

    pub fn from_matrix(m: &Matrix3x4<f64>) -> Self {
        Self::new(
            m.fixed_view::<3, 3>(0, 0).into_owned(),
            m.fixed_view::<3, 1>(0, 3).into_owned(),
        )
    }

    pub fn to_matrix(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    #[inline]
    pub fn transform_vector(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self::new(rt, -(rt * self.translation))
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Pose) -> Self {
        Self::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }

    /// Angle of the relative rotation between two poses, in radians.
    pub fn rotation_angle_to(&self, other: &Pose) -> f64 {
        let rel = self.rotation.transpose() * other.rotation;
        ((rel.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
    }

    pub fn is_orthonormal(&self, tol: f64) -> bool {
        let should_be_identity = self.rotation.transpose() * self.rotation;
        (should_be_identity - Matrix3::identity()).abs().max() < tol
            && (self.rotation.determinant() - 1.0).abs() < tol
    }

    /// Column-major 4×4 model-view matrix.
    pub fn to_gl_matrix(&self) -> [f64; 16] {
        let mut m = [0.0; 16];
        for col in 0..3 {
            for row in 0..3 {
                m[col * 4 + row] = self.rotation[(row, col)];
            }
        }
        m[12] = self.translation.x;
        m[13] = self.translation.y;
        m[14] = self.translation.z;
        m[15] = 1.0;
        m
    }
}

/// Nearest rotation matrix (Frobenius norm) to `m`.
pub fn project_to_so3(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut d = Matrix3::identity();
        d[(2, 2)] = -1.0;
        r = u * d * v_t;
    }
    r
}
