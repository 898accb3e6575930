//! Approximate convex hull of marker corners and representative point
//! selection for hull-based rig tracking.
//!
//! The hull is the BFP range-bin approximation (Bentley, Faust, Preparata):
//! points are split into `k` vertical strips, only the extreme points of
//! each strip enter Andrew's monotone chain. Coordinates are integer pixels.
//! Selection is greedy: the longest diameter, then the hull point farthest
//! from it, then the point adding the most area; the four indices come back
//! in hull order.

/// A hull input point tagged with the rig entry and canonical corner it
/// came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HullPoint {
    pub x: i64,
    pub y: i64,
    pub entry: usize,
    pub corner: usize,
}

impl HullPoint {
    pub fn new(x: i64, y: i64, entry: usize, corner: usize) -> Self {
        Self { x, y, entry, corner }
    }
}

/// `> 0` when `p2` is left of the directed line `p0 -> p1`.
#[inline]
fn is_left(p0: &HullPoint, p1: &HullPoint, p2: &HullPoint) -> i64 {
    (p1.x - p0.x) * (p2.y - p0.y) - (p2.x - p0.x) * (p1.y - p0.y)
}

#[inline]
fn distance_sq(a: &HullPoint, b: &HullPoint) -> i64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Twice the signed area of the quad `a b c d`.
#[inline]
fn quad_area(a: &HullPoint, b: &HullPoint, c: &HullPoint, d: &HullPoint) -> i64 {
    (a.x * b.y + b.x * c.y + c.x * d.y + d.x * a.y) - (a.y * b.x + b.y * c.x + c.y * d.x + d.y * a.x)
}

#[derive(Clone, Copy, Debug)]
struct Bin {
    min: Option<usize>,
    max: Option<usize>,
}

impl Bin {
    const EMPTY: Self = Self { min: None, max: None };
}

/// Approximate hull of `points` with `k` range bins, written to `hull` as
/// point copies. The chain is closed: the last entry repeats the first one
/// unless the input is degenerate (all x equal).
pub fn near_hull(points: &[HullPoint], k: usize, hull: &mut Vec<HullPoint>) {
    let mut bins = Vec::new();
    near_hull_with(points, k, &mut bins, hull);
}

/// [`near_hull`] with a caller-owned bin table.
fn near_hull_with(
    points: &[HullPoint],
    k: usize,
    bins: &mut Vec<Bin>,
    hull: &mut Vec<HullPoint>,
) {
    hull.clear();
    let Some(first) = points.first() else {
        return;
    };
    let (mut minmin, mut minmax, mut maxmin, mut maxmax) = (0, 0, 0, 0);
    let (mut xmin, mut xmax) = (first.x, first.x);

    for (i, p) in points.iter().enumerate().skip(1) {
        if p.x <= xmin {
            if p.x < xmin {
                xmin = p.x;
                minmin = i;
                minmax = i;
            } else if p.y < points[minmin].y {
                minmin = i;
            } else if p.y > points[minmax].y {
                minmax = i;
            }
        }
        if p.x >= xmax {
            if p.x > xmax {
                xmax = p.x;
                maxmin = i;
                maxmax = i;
            } else if p.y < points[maxmin].y {
                maxmin = i;
            } else if p.y > points[maxmax].y {
                maxmax = i;
            }
        }
    }

    if xmin == xmax {
        hull.push(points[minmin]);
        if minmax != minmin {
            hull.push(points[minmax]);
        }
        return;
    }

    let k = k.max(1);
    bins.clear();
    bins.resize(k + 2, Bin::EMPTY);
    bins[0] = Bin {
        min: Some(minmin),
        max: Some(minmax),
    };
    bins[k + 1] = Bin {
        min: Some(maxmin),
        max: Some(maxmax),
    };
    let span = xmax - xmin;
    let bin_of = |x: i64| (k as i64 * (x - xmin) / span) as usize + 1;

    for (i, p) in points.iter().enumerate() {
        if p.x == xmin || p.x == xmax {
            continue;
        }
        if is_left(&points[minmin], &points[maxmin], p) < 0 {
            let bin = &mut bins[bin_of(p.x)];
            if bin.min.is_none_or(|m| p.y < points[m].y) {
                bin.min = Some(i);
            }
        } else if is_left(&points[minmax], &points[maxmax], p) > 0 {
            let bin = &mut bins[bin_of(p.x)];
            if bin.max.is_none_or(|m| p.y > points[m].y) {
                bin.max = Some(i);
            }
        }
    }

    // lower chain, left to right
    for bin in bins.iter() {
        let Some(i) = bin.min else { continue };
        push_hull_vertex(hull, 0, &points[i]);
    }

    // upper chain, right to left
    if maxmax != maxmin {
        hull.push(points[maxmax]);
    }
    let bottom = hull.len() - 1;
    for bin in bins[..=k].iter().rev() {
        let Some(i) = bin.max else { continue };
        push_hull_vertex(hull, bottom, &points[i]);
    }
    if minmax != minmin {
        hull.push(points[minmin]);
    }
}

/// Pop while `p` does not make a left turn with the top two entries above
/// `bottom`, then push `p`.
fn push_hull_vertex(hull: &mut Vec<HullPoint>, bottom: usize, p: &HullPoint) {
    while hull.len() >= bottom + 2 {
        let n = hull.len();
        if is_left(&hull[n - 2], &hull[n - 1], p) > 0 {
            break;
        }
        hull.pop();
    }
    hull.push(*p);
}

fn longest_diameter(points: &[HullPoint]) -> (usize, usize) {
    let n = points.len();
    let half = n.div_ceil(2);
    let offsets: &[isize] = if n > 5 { &[-1, 0, 1] } else { &[0] };
    let mut best = (0, 0);
    let mut max_dist = -1;
    for i in 0..half {
        for &j in offsets {
            let mut idx = (i + half) as isize + j;
            if idx >= n as isize {
                idx -= n as isize;
            }
            let idx = idx as usize;
            let d = distance_sq(&points[i], &points[idx]);
            if d > max_dist {
                max_dist = d;
                best = (i, idx);
            }
        }
    }
    best
}

fn farthest_from_chord(points: &[HullPoint], a: usize, b: usize) -> Option<usize> {
    let mut best = None;
    let mut max_dist = 0;
    for (i, p) in points.iter().enumerate() {
        if i == a || i == b {
            continue;
        }
        let d = is_left(&points[a], &points[b], p).abs();
        if d > max_dist {
            max_dist = d;
            best = Some(i);
        }
    }
    best
}

/// Fourth index maximizing the area of the quad kept in hull order.
fn maximize_area(points: &[HullPoint], [a, b, c]: [usize; 3]) -> Option<usize> {
    let mut best = None;
    let mut max_area = 0;
    let p = points;
    let mut consider = |i: usize, area: i64| {
        if area > max_area {
            max_area = area;
            best = Some(i);
        }
    };
    for i in 0..a {
        consider(i, quad_area(&p[i], &p[a], &p[b], &p[c]));
    }
    for i in a + 1..b {
        consider(i, quad_area(&p[a], &p[i], &p[b], &p[c]));
    }
    for i in b + 1..c {
        consider(i, quad_area(&p[a], &p[b], &p[i], &p[c]));
    }
    for i in c + 1..p.len() {
        consider(i, quad_area(&p[a], &p[b], &p[c], &p[i]));
    }
    best
}

/// Four well-separated hull indices in ascending (hull) order.
///
/// `hull` must be open (no repeated closing point). `None` when the hull has
/// fewer than four points or is degenerate.
pub fn select_four(hull: &[HullPoint]) -> Option<[usize; 4]> {
    if hull.len() < 4 {
        return None;
    }
    let (i0, i1) = longest_diameter(hull);
    if i0 == i1 {
        return None;
    }
    let i2 = farthest_from_chord(hull, i0, i1)?;
    let mut three = [i0, i1, i2];
    three.sort_unstable();
    let i3 = maximize_area(hull, three)?;
    let mut four = [three[0], three[1], three[2], i3];
    four.sort_unstable();
    Some(four)
}

/// How many hull points feed the rig pose solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HullMode {
    /// Weighted per-marker fusion instead of the hull.
    #[default]
    Off,
    /// Four points chosen by [`select_four`].
    Four,
    /// Every hull point, up to [`MAX_HULL_POINTS`].
    Full,
}

/// Largest range-bin count (one bin per corner of sixteen markers). Larger
/// inputs share the bins.
pub const MAX_HULL_INPUT: usize = 64;
/// Largest correspondence set used by [`HullMode::Full`].
pub const MAX_HULL_POINTS: usize = 16;

/// Reusable buffers for hull point selection.
#[derive(Debug, Default)]
pub struct HullSelector {
    input: Vec<HullPoint>,
    bins: Vec<Bin>,
    hull: Vec<HullPoint>,
    selected: Vec<HullPoint>,
}

impl HullSelector {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HULL_INPUT)
    }

    /// Selector whose buffers hold `points` inputs without growing.
    pub fn with_capacity(points: usize) -> Self {
        Self {
            input: Vec::with_capacity(points),
            bins: Vec::with_capacity(MAX_HULL_INPUT + 2),
            hull: Vec::with_capacity(2 * MAX_HULL_INPUT + 6),
            selected: Vec::with_capacity(MAX_HULL_POINTS),
        }
    }

    /// Select representative points from `points`.
    ///
    /// Every point enters the hull; the bin count is the point count capped
    /// at [`MAX_HULL_INPUT`]. The result does not depend on input order.
    pub fn select(&mut self, points: &[HullPoint], mode: HullMode) -> &[HullPoint] {
        self.selected.clear();
        if mode == HullMode::Off {
            return &self.selected;
        }
        self.input.clear();
        self.input.extend_from_slice(points);
        self.input.sort_unstable();

        let k = self.input.len().min(MAX_HULL_INPUT);
        near_hull_with(&self.input, k, &mut self.bins, &mut self.hull);
        if self.hull.len() > 1 && self.hull.first() == self.hull.last() {
            self.hull.pop();
        }

        match mode {
            HullMode::Four => {
                if let Some(idx) = select_four(&self.hull) {
                    self.selected.extend(idx.iter().map(|&i| self.hull[i]));
                }
            }
            HullMode::Full => {
                let n = self.hull.len().min(MAX_HULL_POINTS);
                if n >= 4 {
                    self.selected.extend_from_slice(&self.hull[..n]);
                }
            }
            HullMode::Off => {}
        }
        &self.selected
    }

    /// Hull of the last selection (open chain).
    pub fn hull(&self) -> &[HullPoint] {
        &self.hull
    }
}
