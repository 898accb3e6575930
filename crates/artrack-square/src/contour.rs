//! Boundary tracing of labeled regions.

use crate::label::Region;

/// Hard cap on contour length; longer boundaries are rejected.
pub const MAX_CONTOUR_POINTS: usize = 10_000;

// Clockwise in image coordinates (y down), starting straight up.
const XDIR: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
const YDIR: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// Ordered outer boundary of one region, in full-resolution pixels.
///
/// After [`trace_contour`] succeeds the first point is the boundary pixel
/// farthest from the trace start and the last point repeats the first.
#[derive(Clone, Debug, Default)]
pub struct Contour {
    pub points: Vec<[i32; 2]>,
    scratch: Vec<[i32; 2]>,
}

impl Contour {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            points: Vec::with_capacity(cap + 1),
            scratch: Vec::with_capacity(cap + 1),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Trace the outer boundary of `region` in a label plane.
///
/// Moore-neighbour tracing starting at the top-most, left-most pixel of the
/// region. `step` scales label-plane coordinates back to the image. Returns
/// `false` for single-pixel regions and for boundaries longer than
/// `max_points`.
pub fn trace_contour(
    labels: &[u32],
    width: usize,
    height: usize,
    step: usize,
    region: &Region,
    max_points: usize,
    out: &mut Contour,
) -> bool {
    out.points.clear();
    out.scratch.clear();

    let [x0, y0, x1, _] = region.bbox;
    let row = &labels[y0 * width..(y0 + 1) * width];
    let Some(sx) = (x0..=x1).find(|&x| row[x] == region.label) else {
        return false;
    };

    let (w, h) = (width as i32, height as i32);
    let start = [sx as i32, y0 as i32];
    let (mut x, mut y) = (start[0], start[1]);
    let mut dir = 5usize;
    let trace = &mut out.scratch;
    trace.push(start);

    loop {
        dir = (dir + 5) % 8;
        let mut moved = false;
        for _ in 0..8 {
            let (nx, ny) = (x + XDIR[dir], y + YDIR[dir]);
            if nx >= 0
                && ny >= 0
                && nx < w
                && ny < h
                && labels[ny as usize * width + nx as usize] == region.label
            {
                x = nx;
                y = ny;
                moved = true;
                break;
            }
            dir = (dir + 1) % 8;
        }
        if !moved {
            return false;
        }
        if [x, y] == start {
            break;
        }
        if trace.len() >= max_points {
            return false;
        }
        trace.push([x, y]);
    }

    let s = step as i32;
    let far = farthest_from_first(trace);
    out.points
        .extend(trace[far..].iter().chain(&trace[..far]).map(|p| [p[0] * s, p[1] * s]));
    let first = out.points[0];
    out.points.push(first);
    true
}

fn farthest_from_first(points: &[[i32; 2]]) -> usize {
    let [sx, sy] = points[0];
    let mut best = (0usize, 0i64);
    for (i, p) in points.iter().enumerate().skip(1) {
        let dx = (p[0] - sx) as i64;
        let dy = (p[1] - sy) as i64;
        let d = dx * dx + dy * dy;
        if d > best.1 {
            best = (i, d);
        }
    }
    best.0
}
