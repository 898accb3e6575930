//! Square marker candidate detection.
//!
//! The pipeline for one threshold attempt is:
//!
//! 1. binarize the luminance plane (optionally with a vignetting-compensated
//!    per-pixel threshold, see [`ThresholdMap`]),
//! 2. label 8-connected foreground regions ([`Labeler`]),
//! 3. trace each region's outer contour ([`trace_contour`]),
//! 4. split the contour into four edges, fit lines in ideal coordinates and
//!    intersect them into sub-pixel corners ([`find_corners`], [`fit_quad`]).
//!
//! [`SquareDetector`] owns the buffers for all stages and produces
//! [`MarkerCandidate`]s. Identification and pose live in other crates.

mod contour;
mod detector;
mod label;
mod quad;
mod threshold;

pub use contour::{trace_contour, Contour, MAX_CONTOUR_POINTS};
pub use detector::{MarkerCandidate, SquareDetector, SquareParams, LABELS_PER_MARKER};
pub use label::{AreaFilter, Labeler, Region};
pub use quad::{find_corners, fit_quad, polygon_signed_area, CornerIndices, FittedQuad, Line};
pub use threshold::{ThresholdMap, Vignetting};
