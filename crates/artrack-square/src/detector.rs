use artrack_core::{CameraModel, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::contour::{trace_contour, Contour, MAX_CONTOUR_POINTS};
use crate::label::{AreaFilter, Labeler};
use crate::quad::{find_corners, fit_quad};
use crate::threshold::ThresholdMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Provisional labels reserved per expected marker.
pub const LABELS_PER_MARKER: usize = 1024;

/// Square candidate detection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquareParams {
    /// Smallest region (full-resolution pixels) considered a marker border.
    pub min_area: usize,
    /// Largest region as a fraction of the image area.
    pub max_area_ratio: f64,
    /// Label every other row and column.
    pub half_resolution: bool,
    /// Accepted range of region area over fitted quad area.
    pub min_fill: f64,
    pub max_fill: f64,
    /// Shortest contour (points) worth splitting into edges.
    pub min_contour_points: usize,
    /// Candidate slots; also sizes the label table.
    pub max_candidates: usize,
}

impl Default for SquareParams {
    fn default() -> Self {
        Self {
            min_area: 70,
            max_area_ratio: 0.5,
            half_resolution: false,
            min_fill: 0.2,
            max_fill: 1.5,
            min_contour_points: 16,
            max_candidates: 32,
        }
    }
}

impl SquareParams {
    pub fn max_labels(&self) -> usize {
        LABELS_PER_MARKER * self.max_candidates.max(1)
    }

    fn area_filter(&self, width: usize, height: usize) -> AreaFilter {
        let max_area = (self.max_area_ratio * (width * height) as f64).max(0.0) as usize;
        AreaFilter {
            min_area: self.min_area,
            max_area,
        }
    }
}

/// A quadrilateral that may be a marker border.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerCandidate {
    /// Sub-pixel corners in ideal coordinates, clockwise on screen.
    pub vertices: [Point2<f64>; 4],
    /// The same corners mapped back into observed (distorted) pixels.
    pub observed: [Point2<f64>; 4],
    /// Region pixel count (full resolution).
    pub area: usize,
    /// Region centroid in observed pixels.
    pub centroid: [f64; 2],
    /// `1 / (1 + rms)` of the worst edge fit.
    pub fit_quality: f64,
    /// Label of the originating region.
    pub region: u32,
}

/// Thresholds a luminance plane and extracts square candidates.
///
/// All buffers are allocated in [`SquareDetector::new`] for a fixed
/// resolution.
#[derive(Clone, Debug)]
pub struct SquareDetector {
    params: SquareParams,
    width: usize,
    height: usize,
    labeler: Labeler,
    contour: Contour,
    edge_points: Vec<Point2<f64>>,
    candidates: Vec<MarkerCandidate>,
}

impl SquareDetector {
    pub fn new(params: SquareParams, width: usize, height: usize) -> Self {
        let labeler = Labeler::new(width, height, params.half_resolution, params.max_labels());
        let candidates = Vec::with_capacity(params.max_candidates);
        Self {
            width,
            height,
            labeler,
            contour: Contour::with_capacity(MAX_CONTOUR_POINTS),
            edge_points: Vec::with_capacity(MAX_CONTOUR_POINTS),
            candidates,
            params,
        }
    }

    /// Bytes a detector for `width × height` will hold.
    pub fn required_bytes(params: &SquareParams, width: usize, height: usize) -> usize {
        Labeler::required_bytes(width, height, params.half_resolution, params.max_labels())
            + 2 * (MAX_CONTOUR_POINTS + 1) * std::mem::size_of::<[i32; 2]>()
            + MAX_CONTOUR_POINTS * std::mem::size_of::<Point2<f64>>()
            + params.max_candidates * std::mem::size_of::<MarkerCandidate>()
    }

    #[inline]
    pub fn params(&self) -> &SquareParams {
        &self.params
    }

    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Size of the plane that is actually labeled.
    #[inline]
    pub fn grid_size(&self) -> (usize, usize) {
        self.labeler.grid_size()
    }

    #[inline]
    pub fn labeler(&self) -> &Labeler {
        &self.labeler
    }

    /// Candidates of the last [`Self::detect`] call.
    #[inline]
    pub fn candidates(&self) -> &[MarkerCandidate] {
        &self.candidates
    }

    /// Run labeling and quad extraction on `gray` at `threshold`.
    ///
    /// `map` must match [`Self::grid_size`] (or be uniform).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, gray, map, camera), fields(width = gray.width, height = gray.height))
    )]
    pub fn detect(
        &mut self,
        gray: &GrayImageView<'_>,
        threshold: u8,
        map: &ThresholdMap,
        camera: &CameraModel,
    ) -> &[MarkerCandidate] {
        self.candidates.clear();
        if gray.width != self.width || gray.height != self.height {
            log::warn!(
                "frame is {}x{}, detector expects {}x{}",
                gray.width,
                gray.height,
                self.width,
                self.height
            );
            return &self.candidates;
        }

        let filter = self.params.area_filter(self.width, self.height);
        if !self.labeler.label(gray, threshold, map, &filter) {
            return &self.candidates;
        }

        let (gw, gh) = self.labeler.grid_size();
        let step = self.labeler.step();
        for region in self.labeler.regions() {
            if self.candidates.len() == self.params.max_candidates {
                log::debug!("candidate table full ({})", self.params.max_candidates);
                break;
            }
            if !trace_contour(
                self.labeler.labels(),
                gw,
                gh,
                step,
                region,
                MAX_CONTOUR_POINTS,
                &mut self.contour,
            ) {
                continue;
            }
            if self.contour.len() < self.params.min_contour_points {
                continue;
            }
            let Some(corners) = find_corners(&self.contour.points, region.area) else {
                continue;
            };
            let Some(quad) = fit_quad(
                &self.contour.points,
                &corners,
                0.5 * step as f64,
                camera,
                &mut self.edge_points,
            ) else {
                continue;
            };

            let quad_area = quad.signed_area();
            if quad_area <= 0.0 || !quad.is_convex() {
                continue;
            }
            let fill = region.area as f64 / quad_area;
            if fill < self.params.min_fill || fill > self.params.max_fill {
                log::trace!("region {} rejected, fill ratio {fill:.2}", region.label);
                continue;
            }

            self.candidates.push(MarkerCandidate {
                vertices: quad.vertices,
                observed: quad.vertices.map(|v| camera.ideal_to_observed(v)),
                area: region.area,
                centroid: region.centroid,
                fit_quality: 1.0 / (1.0 + quad.max_rms()),
                region: region.label,
            });
        }

        suppress_nested(&mut self.candidates);
        log::debug!(
            "threshold {threshold}: {} regions, {} candidates",
            self.labeler.regions().len(),
            self.candidates.len()
        );
        &self.candidates
    }
}

/// Drop candidates whose centroid lies within `sqrt(area / 4)` of a larger
/// candidate's centroid.
fn suppress_nested(candidates: &mut Vec<MarkerCandidate>) {
    candidates.sort_by(|a, b| b.area.cmp(&a.area));
    let mut kept = 0;
    for i in 0..candidates.len() {
        let c = candidates[i];
        let nested = candidates[..kept].iter().any(|big| {
            let dx = big.centroid[0] - c.centroid[0];
            let dy = big.centroid[1] - c.centroid[1];
            dx * dx + dy * dy < big.area as f64 / 4.0
        });
        if !nested {
            candidates[kept] = c;
            kept += 1;
        }
    }
    candidates.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use artrack_core::{Camera, GrayImage, Undistortion};

    fn camera(w: usize, h: usize) -> CameraModel {
        let cam = Camera::pinhole(w, h, 300.0, 300.0, w as f64 / 2.0, h as f64 / 2.0)
            .expect("camera");
        CameraModel::new(cam, Undistortion::Standard)
    }

    /// White frame with a black ring `[x0, x0 + side)` and a white interior.
    fn ring_frame(w: usize, h: usize, x0: usize, y0: usize, side: usize) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        img.data.fill(230);
        let border = side / 4;
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                let inner = x >= x0 + border
                    && x < x0 + side - border
                    && y >= y0 + border
                    && y < y0 + side - border;
                if !inner {
                    img.data[y * w + x] = 20;
                }
            }
        }
        img
    }

    #[test]
    fn ring_yields_one_clockwise_candidate() {
        let img = ring_frame(120, 100, 30, 20, 48);
        let mut det = SquareDetector::new(SquareParams::default(), 120, 100);
        let cands = det.detect(&img.view(), 100, &ThresholdMap::new(), &camera(120, 100));
        assert_eq!(cands.len(), 1);

        let c = cands[0];
        assert!(c.fit_quality > 0.9);
        let mut xs: Vec<f64> = c.vertices.iter().map(|v| v.x).collect();
        xs.sort_by(f64::total_cmp);
        // dark pixels cover [30, 78), so the boundary is at 29.5 and 77.5
        assert_relative_eq!(xs[0], 29.5, epsilon = 1e-6);
        assert_relative_eq!(xs[3], 77.5, epsilon = 1e-6);
        assert!(crate::quad::polygon_signed_area(&c.vertices) > 0.0);
        for (o, v) in c.observed.iter().zip(&c.vertices) {
            assert_relative_eq!(o.x, v.x, epsilon = 1e-9);
            assert_relative_eq!(o.y, v.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn blank_frame_has_no_candidates() {
        let mut img = GrayImage::new(64, 48);
        img.data.fill(128);
        let mut det = SquareDetector::new(SquareParams::default(), 64, 48);
        let cands = det.detect(&img.view(), 200, &ThresholdMap::new(), &camera(64, 48));
        assert!(cands.is_empty());
        assert!(det.labeler().regions().is_empty());
    }

    #[test]
    fn disc_is_rejected() {
        let (w, h) = (100, 100);
        let mut img = GrayImage::new(w, h);
        img.data.fill(230);
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = (x as f64 - 50.0, y as f64 - 50.0);
                if dx * dx + dy * dy < 20.0 * 20.0 {
                    img.data[y * w + x] = 10;
                }
            }
        }
        let mut det = SquareDetector::new(SquareParams::default(), w, h);
        assert!(det
            .detect(&img.view(), 100, &ThresholdMap::new(), &camera(w, h))
            .is_empty());
    }

    #[test]
    fn half_resolution_finds_the_same_square() {
        let img = ring_frame(120, 100, 30, 20, 48);
        let params = SquareParams {
            half_resolution: true,
            ..SquareParams::default()
        };
        let mut det = SquareDetector::new(params, 120, 100);
        let cands = det.detect(&img.view(), 100, &ThresholdMap::new(), &camera(120, 100));
        assert_eq!(cands.len(), 1);
        let cx: f64 = cands[0].vertices.iter().map(|v| v.x).sum::<f64>() / 4.0;
        assert_relative_eq!(cx, 53.5, epsilon = 1.5);
        let side = (cands[0].vertices[1] - cands[0].vertices[0]).norm();
        assert_relative_eq!(side, 48.0, epsilon = 1.0);
    }

    #[test]
    fn nested_candidates_are_suppressed() {
        let make = |area: usize, centroid: [f64; 2]| MarkerCandidate {
            vertices: [Point2::origin(); 4],
            observed: [Point2::origin(); 4],
            area,
            centroid,
            fit_quality: 1.0,
            region: 0,
        };
        let mut cands = vec![
            make(100, [10.0, 10.0]),
            make(400, [12.0, 10.0]),
            make(100, [80.0, 80.0]),
        ];
        suppress_nested(&mut cands);
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].area, 400);
        assert_eq!(cands[1].centroid, [80.0, 80.0]);
    }

    #[test]
    fn params_round_trip_through_json() {
        let params = SquareParams {
            min_area: 120,
            half_resolution: true,
            ..SquareParams::default()
        };
        let json = serde_json::to_string(&params).expect("serialize");
        let back: SquareParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, params);
        let partial: SquareParams = serde_json::from_str(r#"{"min_area": 10}"#).expect("partial");
        assert_eq!(partial.max_candidates, 32);
    }
}
