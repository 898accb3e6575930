//! Splitting a closed contour into four edges and fitting sub-pixel corners.

use artrack_core::CameraModel;
use nalgebra::{Matrix2, Point2, SymmetricEigen, Vector2};

/// Maximum number of intermediate vertices one split may produce.
const MAX_SPLIT_VERTICES: usize = 5;

/// Fraction of each edge ignored at both ends when fitting its line.
const EDGE_TRIM: f64 = 0.05;

/// Indices into the contour of the four corner points plus the closing point.
pub type CornerIndices = [usize; 5];

/// Find the four corners of a closed contour.
///
/// `points` starts at a corner candidate and repeats it at the end (as
/// produced by [`crate::trace_contour`]). `area` is the region's pixel count,
/// which scales the deviation threshold. Returns `None` when the contour does
/// not split into exactly four straight edges.
pub fn find_corners(points: &[[i32; 2]], area: usize) -> Option<CornerIndices> {
    let n = points.len();
    if n < 5 {
        return None;
    }
    let [sx, sy] = points[0];
    let mut v1 = 0;
    let mut dmax = 0i64;
    for (i, p) in points.iter().enumerate().take(n - 1).skip(1) {
        let d = sq(p[0] - sx) + sq(p[1] - sy);
        if d > dmax {
            dmax = d;
            v1 = i;
        }
    }
    if v1 == 0 {
        return None;
    }

    let thresh = area as f64 / 0.75 * 0.01;
    let last = n - 1;
    let mut wv1 = SplitVertices::default();
    let mut wv2 = SplitVertices::default();
    split(points, 0, v1, thresh, &mut wv1)?;
    split(points, v1, last, thresh, &mut wv2)?;

    let corners = match (wv1.len, wv2.len) {
        (1, 1) => [0, wv1.idx[0], v1, wv2.idx[0], last],
        (a, 0) if a > 1 => {
            let mid = v1 / 2;
            let (mut l, mut r) = (SplitVertices::default(), SplitVertices::default());
            split(points, 0, mid, thresh, &mut l)?;
            split(points, mid, v1, thresh, &mut r)?;
            if l.len != 1 || r.len != 1 {
                return None;
            }
            [0, l.idx[0], r.idx[0], v1, last]
        }
        (0, b) if b > 1 => {
            let mid = (v1 + last) / 2;
            let (mut l, mut r) = (SplitVertices::default(), SplitVertices::default());
            split(points, v1, mid, thresh, &mut l)?;
            split(points, mid, last, thresh, &mut r)?;
            if l.len != 1 || r.len != 1 {
                return None;
            }
            [0, v1, l.idx[0], r.idx[0], last]
        }
        _ => return None,
    };
    Some(corners)
}

#[derive(Default)]
struct SplitVertices {
    idx: [usize; MAX_SPLIT_VERTICES + 2],
    len: usize,
}

/// Recursively collect points between `st` and `ed` that deviate from the
/// chord by more than `thresh` (squared distance).
fn split(
    points: &[[i32; 2]],
    st: usize,
    ed: usize,
    thresh: f64,
    out: &mut SplitVertices,
) -> Option<()> {
    let [xs, ys] = points[st].map(|v| v as f64);
    let [xe, ye] = points[ed].map(|v| v as f64);
    let a = ye - ys;
    let b = xs - xe;
    let c = xe * ys - ye * xs;

    let mut dmax = 0.0;
    let mut v = st;
    for (i, p) in points.iter().enumerate().take(ed).skip(st + 1) {
        let d = a * p[0] as f64 + b * p[1] as f64 + c;
        if d * d > dmax {
            dmax = d * d;
            v = i;
        }
    }
    let norm = a * a + b * b;
    if norm > 0.0 && dmax / norm > thresh {
        split(points, st, v, thresh, out)?;
        if out.len > MAX_SPLIT_VERTICES {
            return None;
        }
        out.idx[out.len] = v;
        out.len += 1;
        split(points, v, ed, thresh, out)?;
    }
    Some(())
}

#[inline]
fn sq(v: i32) -> i64 {
    (v as i64) * (v as i64)
}

/// Homogeneous line `a x + b y + c = 0` with `(a, b)` a unit normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// RMS perpendicular distance of the fitted points.
    pub rms: f64,
}

impl Line {
    /// Principal-axis fit through `pts`.
    pub fn fit(pts: &[Point2<f64>]) -> Option<Self> {
        if pts.len() < 2 {
            return None;
        }
        let n = pts.len() as f64;
        let mean = pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
        let mut cov = Matrix2::zeros();
        for p in pts {
            let d = p.coords - mean;
            cov += d * d.transpose();
        }
        cov /= n;

        let eig = SymmetricEigen::new(cov);
        let major = eig.eigenvalues.imax();
        let dir = eig.eigenvectors.column(major);
        let (ex, ey) = (dir[0], dir[1]);
        if !(ex.is_finite() && ey.is_finite()) || (ex == 0.0 && ey == 0.0) {
            return None;
        }
        let minor = eig.eigenvalues[1 - major].max(0.0);
        Some(Self {
            a: ey,
            b: -ex,
            c: -(ey * mean.x - ex * mean.y),
            rms: minor.sqrt(),
        })
    }

    /// Intersection of two lines; `None` when (nearly) parallel.
    pub fn intersect(&self, other: &Line) -> Option<Point2<f64>> {
        let w = self.a * other.b - other.a * self.b;
        if w.abs() < 1e-4 {
            return None;
        }
        Some(Point2::new(
            (self.b * other.c - other.b * self.c) / w,
            (other.a * self.c - self.a * other.c) / w,
        ))
    }
}

/// Fitted quadrilateral in ideal (undistorted) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FittedQuad {
    /// Corners in clockwise screen order (y down).
    pub vertices: [Point2<f64>; 4],
    pub lines: [Line; 4],
}

impl FittedQuad {
    /// Worst edge residual.
    pub fn max_rms(&self) -> f64 {
        self.lines.iter().map(|l| l.rms).fold(0.0, f64::max)
    }

    /// Shoelace area; positive for clockwise screen order.
    pub fn signed_area(&self) -> f64 {
        polygon_signed_area(&self.vertices)
    }

    pub fn is_convex(&self) -> bool {
        let v = &self.vertices;
        (0..4).all(|i| {
            let p0 = v[i];
            let p1 = v[(i + 1) % 4];
            let p2 = v[(i + 2) % 4];
            let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);
            cross > 0.0
        })
    }
}

pub fn polygon_signed_area(v: &[Point2<f64>; 4]) -> f64 {
    let mut s = 0.0;
    for i in 0..4 {
        let (p, q) = (v[i], v[(i + 1) % 4]);
        s += p.x * q.y - q.x * p.y;
    }
    0.5 * s
}

/// Fit one line per edge (in ideal coordinates) and intersect neighbours.
///
/// Contour points are the centres of the outermost dark pixels, so each
/// edge sample is pushed `edge_offset` pixels outward along the edge normal
/// before undistortion. Half the sampling step puts the line on the
/// dark/light boundary.
///
/// `scratch` holds the undistorted edge points and is reused between calls.
pub fn fit_quad(
    points: &[[i32; 2]],
    corners: &CornerIndices,
    edge_offset: f64,
    camera: &CameraModel,
    scratch: &mut Vec<Point2<f64>>,
) -> Option<FittedQuad> {
    let corner_at = |i: usize| {
        let [x, y] = points[corners[i]];
        Vector2::new(x as f64, y as f64)
    };
    let centre = (0..4).fold(Vector2::zeros(), |acc, i| acc + corner_at(i)) / 4.0;

    let mut lines = [Line {
        a: 0.0,
        b: 0.0,
        c: 0.0,
        rms: 0.0,
    }; 4];
    for (i, line) in lines.iter_mut().enumerate() {
        let shift = outward_normal(corner_at(i), corner_at(i + 1), centre)? * edge_offset;
        let (st, ed) = (corners[i], corners[i + 1]);
        let span = (ed - st + 1) as f64;
        let trim = (span * EDGE_TRIM + 0.5) as usize;
        let (st, ed) = (st + trim, ed.checked_sub(trim)?);
        if ed <= st {
            return None;
        }
        scratch.clear();
        scratch.extend(points[st..=ed].iter().map(|p| {
            let observed = Point2::new(p[0] as f64 + shift.x, p[1] as f64 + shift.y);
            camera.observed_to_ideal(observed)
        }));
        *line = Line::fit(scratch)?;
    }

    let mut vertices = [Point2::origin(); 4];
    for (i, v) in vertices.iter_mut().enumerate() {
        *v = lines[(i + 3) % 4].intersect(&lines[i])?;
    }
    Some(FittedQuad { vertices, lines })
}

/// Unit normal of the chord `p -> q` pointing away from `centre`.
fn outward_normal(
    p: Vector2<f64>,
    q: Vector2<f64>,
    centre: Vector2<f64>,
) -> Option<Vector2<f64>> {
    let d = q - p;
    let len = d.norm();
    if len == 0.0 {
        return None;
    }
    let n = Vector2::new(d.y, -d.x) / len;
    let mid = 0.5 * (p + q);
    Some(if n.dot(&(mid - centre)) < 0.0 { -n } else { n })
}
