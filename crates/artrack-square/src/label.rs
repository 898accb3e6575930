//! Connected-component labeling of the thresholded luminance plane.
//!
//! Two-pass scanline labeling with 8-connectivity. Provisional labels are
//! merged in a union-find table during the first pass and resolved into
//! compact ids in the second. All buffers are sized once; labeling a frame
//! does not allocate.

use artrack_core::GrayImageView;

use crate::threshold::ThresholdMap;

/// One connected set of foreground pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    /// Compact label id in the label plane (`>= 1`).
    pub label: u32,
    /// Pixel count in full-resolution units.
    pub area: usize,
    /// Inclusive bounding box `[x0, y0, x1, y1]` in label-plane coordinates.
    pub bbox: [usize; 4],
    /// Centroid in full-resolution image coordinates.
    pub centroid: [f64; 2],
}

/// Area limits applied while collecting regions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaFilter {
    pub min_area: usize,
    pub max_area: usize,
}

impl AreaFilter {
    #[inline]
    fn admits(&self, r: &Region) -> bool {
        r.area >= self.min_area && r.area <= self.max_area
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Accum {
    count: usize,
    sum_x: usize,
    sum_y: usize,
    bbox: [usize; 4],
}

/// Reusable labeling workspace.
#[derive(Clone, Debug)]
pub struct Labeler {
    width: usize,
    height: usize,
    step: usize,
    max_labels: usize,
    labels: Vec<u32>,
    parent: Vec<u32>,
    accum: Vec<Accum>,
    components: Vec<Region>,
    regions: Vec<Region>,
}

impl Labeler {
    /// Workspace for a `width × height` image.
    ///
    /// With `half_resolution` only every other row and column is labeled.
    /// `max_labels` bounds the provisional label table.
    pub fn new(width: usize, height: usize, half_resolution: bool, max_labels: usize) -> Self {
        let step = if half_resolution { 2 } else { 1 };
        let (gw, gh) = (width / step, height / step);
        Self {
            width: gw,
            height: gh,
            step,
            max_labels,
            labels: vec![0; gw * gh],
            parent: Vec::with_capacity(max_labels + 1),
            accum: Vec::with_capacity(max_labels + 1),
            components: Vec::with_capacity(max_labels),
            regions: Vec::with_capacity(max_labels),
        }
    }

    /// Bytes held by a workspace built with the same arguments.
    pub fn required_bytes(
        width: usize,
        height: usize,
        half_resolution: bool,
        max_labels: usize,
    ) -> usize {
        let step = if half_resolution { 2 } else { 1 };
        let plane = (width / step) * (height / step) * std::mem::size_of::<u32>();
        let tables = (max_labels + 1)
            * (std::mem::size_of::<u32>() + std::mem::size_of::<Accum>())
            + 2 * max_labels * std::mem::size_of::<Region>();
        plane + tables
    }

    /// Label-plane size `(width, height)`.
    #[inline]
    pub fn grid_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Image pixels per label-plane pixel along each axis.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Row-major label plane; `0` is background.
    #[inline]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Every component found by the last call to [`Self::label`].
    #[inline]
    pub fn components(&self) -> &[Region] {
        &self.components
    }

    /// Components that passed the area filter and do not touch the border.
    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Label `gray`, treating pixels at or below the local threshold as
    /// foreground.
    ///
    /// Returns `false` when the provisional label table overflows; in that
    /// case no regions are reported for this attempt.
    pub fn label(
        &mut self,
        gray: &GrayImageView<'_>,
        base: u8,
        map: &ThresholdMap,
        filter: &AreaFilter,
    ) -> bool {
        self.components.clear();
        self.regions.clear();

        if !self.first_pass(gray, base, map) {
            log::warn!(
                "label table overflow (more than {} provisional labels) at threshold {base}",
                self.max_labels
            );
            self.labels.fill(0);
            return false;
        }
        self.resolve();

        let (gw, gh) = (self.width, self.height);
        for r in &self.components {
            let [x0, y0, x1, y1] = r.bbox;
            let touches_border = x0 == 0 || y0 == 0 || x1 + 1 == gw || y1 + 1 == gh;
            if !touches_border && filter.admits(r) {
                self.regions.push(*r);
            }
        }
        log::trace!(
            "threshold {base}: {} components, {} regions",
            self.components.len(),
            self.regions.len()
        );
        true
    }

    fn first_pass(&mut self, gray: &GrayImageView<'_>, base: u8, map: &ThresholdMap) -> bool {
        let (gw, gh, step) = (self.width, self.height, self.step);
        self.parent.clear();
        self.parent.push(0);

        for gy in 0..gh {
            let row = gy * step * gray.width;
            for gx in 0..gw {
                let idx = gy * gw + gx;
                let lum = gray.data[row + gx * step];
                if lum > map.threshold_at(base, gx, gy) {
                    self.labels[idx] = 0;
                    continue;
                }

                let mut current = 0u32;
                let mut neighbours = [0u32; 4];
                if gx > 0 {
                    neighbours[0] = self.labels[idx - 1];
                }
                if gy > 0 {
                    let up = idx - gw;
                    neighbours[1] = self.labels[up];
                    if gx > 0 {
                        neighbours[2] = self.labels[up - 1];
                    }
                    if gx + 1 < gw {
                        neighbours[3] = self.labels[up + 1];
                    }
                }
                for &n in neighbours.iter().filter(|&&n| n != 0) {
                    if current == 0 {
                        current = find(&mut self.parent, n);
                    } else {
                        current = union(&mut self.parent, current, n);
                    }
                }

                if current == 0 {
                    if self.parent.len() > self.max_labels {
                        return false;
                    }
                    current = self.parent.len() as u32;
                    self.parent.push(current);
                }
                self.labels[idx] = current;
            }
        }
        true
    }

    fn resolve(&mut self) {
        // parents never point to a larger label, so one forward sweep flattens
        for i in 1..self.parent.len() {
            let p = self.parent[i] as usize;
            self.parent[i] = self.parent[p];
        }
        // then parent[i] becomes the compact id of provisional label i
        let mut next = 0u32;
        for i in 1..self.parent.len() {
            let root = self.parent[i] as usize;
            if root == i {
                next += 1;
                self.parent[i] = next;
            } else {
                self.parent[i] = self.parent[root];
            }
        }

        self.accum.clear();
        self.accum.resize(next as usize + 1, Accum::default());

        let (gw, step) = (self.width, self.step);
        for (idx, l) in self.labels.iter_mut().enumerate() {
            if *l == 0 {
                continue;
            }
            *l = self.parent[*l as usize];
            let (x, y) = (idx % gw, idx / gw);
            let a = &mut self.accum[*l as usize];
            if a.count == 0 {
                a.bbox = [x, y, x, y];
            } else {
                a.bbox[0] = a.bbox[0].min(x);
                a.bbox[2] = a.bbox[2].max(x);
                a.bbox[3] = y;
            }
            a.count += 1;
            a.sum_x += x;
            a.sum_y += y;
        }

        let s = step as f64;
        for (label, a) in self.accum.iter().enumerate().skip(1) {
            self.components.push(Region {
                label: label as u32,
                area: a.count * step * step,
                bbox: a.bbox,
                centroid: [
                    a.sum_x as f64 / a.count as f64 * s,
                    a.sum_y as f64 / a.count as f64 * s,
                ],
            });
        }
    }
}

#[inline]
fn find(parent: &mut [u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        let grand = parent[parent[x as usize] as usize];
        parent[x as usize] = grand;
        x = grand;
    }
    x
}

#[inline]
fn union(parent: &mut [u32], a: u32, b: u32) -> u32 {
    let ra = find(parent, a);
    let rb = find(parent, b);
    let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
    parent[hi as usize] = lo;
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use artrack_core::GrayImage;

    const OPEN: AreaFilter = AreaFilter {
        min_area: 1,
        max_area: usize::MAX,
    };

    fn image_from_rows(rows: &[&str]) -> GrayImage {
        let height = rows.len();
        let width = rows[0].len();
        let mut img = GrayImage::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.bytes().enumerate() {
                img.data[y * width + x] = if c == b'#' { 0 } else { 255 };
            }
        }
        img
    }

    fn pseudo_random_image(width: usize, height: usize, seed: u32) -> GrayImage {
        let mut state = seed;
        let mut img = GrayImage::new(width, height);
        for v in img.data.iter_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *v = if state % 100 < 45 { 0 } else { 255 };
        }
        img
    }

    #[test]
    fn labels_partition_foreground_pixels() {
        for seed in [1u32, 7, 1234, 99991] {
            let img = pseudo_random_image(37, 23, seed);
            let mut labeler = Labeler::new(37, 23, false, 4096);
            assert!(labeler.label(&img.view(), 128, &ThresholdMap::new(), &OPEN));

            let labels = labeler.labels();
            let n = labeler.components().len() as u32;
            let mut counts = vec![0usize; n as usize + 1];
            for (i, &l) in labels.iter().enumerate() {
                let fg = img.data[i] <= 128;
                assert_eq!(fg, l != 0, "pixel {i}");
                assert!(l <= n);
                counts[l as usize] += 1;
            }
            for r in labeler.components() {
                assert_eq!(counts[r.label as usize], r.area);
            }

            // 8-neighbours of a foreground pixel share its label
            for y in 0..23usize {
                for x in 0..37usize {
                    let l = labels[y * 37 + x];
                    if l == 0 {
                        continue;
                    }
                    for (dx, dy) in [(1i32, 0i32), (0, 1), (1, 1), (-1, 1)] {
                        let (nx, ny) = (x as i32 + dx, y as i32 + dy);
                        if nx < 0 || ny < 0 || nx >= 37 || ny >= 23 {
                            continue;
                        }
                        let m = labels[ny as usize * 37 + nx as usize];
                        assert!(m == 0 || m == l);
                    }
                }
            }
        }
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let img = image_from_rows(&[
            ".......", //
            ".#...#.", //
            "..#.#..", //
            "...#...", //
            ".......",
        ]);
        let mut labeler = Labeler::new(7, 5, false, 64);
        assert!(labeler.label(&img.view(), 128, &ThresholdMap::new(), &OPEN));
        assert_eq!(labeler.components().len(), 1);
        let r = labeler.regions()[0];
        assert_eq!(r.area, 5);
        assert_eq!(r.bbox, [1, 1, 5, 3]);
    }

    #[test]
    fn border_touching_and_small_regions_are_dropped() {
        let img = image_from_rows(&[
            "#.......", //
            "........", //
            "..##....", //
            "..##..#.", //
            "........",
        ]);
        let mut labeler = Labeler::new(8, 5, false, 64);
        let filter = AreaFilter {
            min_area: 2,
            max_area: 100,
        };
        assert!(labeler.label(&img.view(), 128, &ThresholdMap::new(), &filter));
        assert_eq!(labeler.components().len(), 3);
        assert_eq!(labeler.regions().len(), 1);
        assert_eq!(labeler.regions()[0].centroid, [2.5, 2.5]);
    }

    #[test]
    fn overflow_yields_no_regions() {
        let img = image_from_rows(&[
            ".........", //
            ".#.#.#.#.", //
            ".........",
        ]);
        let mut labeler = Labeler::new(9, 3, false, 3);
        assert!(!labeler.label(&img.view(), 128, &ThresholdMap::new(), &OPEN));
        assert!(labeler.regions().is_empty());
        assert!(labeler.labels().iter().all(|&l| l == 0));
    }

    #[test]
    fn half_resolution_scales_area_and_centroid() {
        let mut img = GrayImage::new(40, 40);
        img.data.fill(255);
        for y in 10..30 {
            for x in 10..30 {
                img.data[y * 40 + x] = 0;
            }
        }
        let mut labeler = Labeler::new(40, 40, true, 64);
        assert!(labeler.label(&img.view(), 128, &ThresholdMap::new(), &OPEN));
        assert_eq!(labeler.grid_size(), (20, 20));
        let r = labeler.regions()[0];
        assert_eq!(r.area, 400);
        assert_eq!(r.centroid, [19.0, 19.0]);
    }

    #[test]
    fn blank_frame_has_no_components() {
        let mut img = GrayImage::new(16, 16);
        img.data.fill(200);
        let mut labeler = Labeler::new(16, 16, false, 64);
        assert!(labeler.label(&img.view(), 100, &ThresholdMap::new(), &OPEN));
        assert!(labeler.components().is_empty());
    }
}
