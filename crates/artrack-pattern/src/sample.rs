//! Perspective sampling of a marker's interior into a fixed grid.

use artrack_core::{sample_bilinear, unit_square_to_quad, CameraModel, GrayImageView};
use nalgebra::Point2;

/// Samples whose range is below this many grey levels are not matched.
pub const MIN_CONTRAST: u8 = 16;

/// Reusable sampler producing `size × size` grey cells.
///
/// The interior is read on a finer grid (doubling from `size` while it stays
/// within `max_resolution` and the projected interior side in pixels) and
/// averaged down to `size`.
#[derive(Clone, Debug)]
pub struct InteriorSampler {
    size: usize,
    max_resolution: usize,
    sums: Vec<f32>,
    cells: Vec<u8>,
}

impl InteriorSampler {
    pub fn new(size: usize, max_resolution: usize) -> Self {
        Self {
            size,
            max_resolution: max_resolution.max(size),
            sums: vec![0.0; size * size],
            cells: vec![0; size * size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sampling resolution for a quad whose interior spans `side_px` pixels.
    pub fn resolution_for(&self, side_px: f64) -> usize {
        let mut res = self.size;
        while res * 2 <= self.max_resolution && (res * 2) as f64 <= side_px {
            res *= 2;
        }
        res
    }

    /// Sample the square spanning `[border, 1 - border]` of the marker.
    ///
    /// `quad` holds the marker corners in ideal coordinates, clockwise on
    /// screen; cell `(0, 0)` lies next to `quad[0]` and rows run towards
    /// `quad[3]`. Returns `None` for degenerate quads and low-contrast
    /// interiors.
    pub fn sample(
        &mut self,
        gray: &GrayImageView<'_>,
        camera: &CameraModel,
        quad: &[Point2<f64>; 4],
        border: f64,
    ) -> Option<&[u8]> {
        let h = unit_square_to_quad(quad)?;
        let span = 1.0 - 2.0 * border;
        if span <= 0.0 {
            return None;
        }

        let perimeter: f64 = (0..4).map(|i| (quad[(i + 1) % 4] - quad[i]).norm()).sum();
        let res = self.resolution_for(perimeter / 4.0 * span);
        let factor = res / self.size;

        self.sums.fill(0.0);
        let n = self.size;
        for j in 0..res {
            let v = border + span * (j as f64 + 0.5) / res as f64;
            let row = (j / factor) * n;
            for i in 0..res {
                let u = border + span * (i as f64 + 0.5) / res as f64;
                let p = camera.ideal_to_observed(h.apply(Point2::new(u, v)));
                if !(p.x.is_finite() && p.y.is_finite()) {
                    return None;
                }
                self.sums[row + i / factor] += sample_bilinear(gray, p.x as f32, p.y as f32);
            }
        }

        let per_cell = (factor * factor) as f32;
        let (mut lo, mut hi) = (u8::MAX, u8::MIN);
        for (c, s) in self.cells.iter_mut().zip(&self.sums) {
            *c = (s / per_cell).round().clamp(0.0, 255.0) as u8;
            lo = lo.min(*c);
            hi = hi.max(*c);
        }
        if hi - lo < MIN_CONTRAST {
            log::trace!("interior contrast {} below {MIN_CONTRAST}", hi - lo);
            return None;
        }
        Some(self.cells.as_slice())
    }
}
