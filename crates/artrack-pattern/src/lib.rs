//! Marker identification.
//!
//! Two mutually exclusive strategies share one result shape
//! (`id`, direction `0..=3`, confidence):
//!
//! - **templates**: the candidate interior is sampled by [`InteriorSampler`]
//!   and compared against every registered [`TemplatePattern`] in all four
//!   orientations by [`TemplateMatcher`], optionally inside a PCA
//!   [`Eigenspace`]. Templates load from the [`PattFile`] text format.
//! - **ID markers**: a 6×6 bit interior is binarized with an Otsu threshold
//!   and decoded by [`IdMatcher`], either with the simple repeated encoding or
//!   the BCH(36, 12) code ([`IdEncoding`]).
//!
//! Direction `k` always means the observed interior equals the upright
//! pattern turned `k` quarter turns clockwise, so the pattern's top-left
//! corner sits at candidate vertex `k`.

mod bch;
mod error;
mod id;
mod matcher;
mod otsu;
mod patt;
mod sample;
mod template;

pub use bch::{BchCode, CODE_BITS, CORRECTABLE, DATA_BITS};
pub use error::PatternError;
pub use id::{rotate_code, rotate_grid, IdDictionary, IdEncoding, IdMatch, IdMatcher, ID_GRID};
pub use matcher::{Eigenspace, TemplateMatch, TemplateMatcher, TemplateParams};
pub use otsu::{binarize, otsu_threshold};
pub use patt::PattFile;
pub use sample::{InteriorSampler, MIN_CONTRAST};
pub use template::{normalize_into, normalized, TemplatePattern, MAX_PATTERN_SIZE};
