//! Tracker configuration and its JSON representation.

use artrack_core::{PixelFormat, UndistortConfig, UndistortTable, Undistortion};
use artrack_pattern::{IdEncoding, TemplateParams, CORRECTABLE, ID_GRID, MAX_PATTERN_SIZE};
use artrack_pose::{FusionParams, PoseParams};
use artrack_square::{SquareDetector, SquareParams, ThresholdMap, Vignetting};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConfigIoError, TrackerError};

/// Which kind of marker the session identifies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMode {
    /// Registered grey templates matched by correlation.
    #[default]
    Template,
    /// Numeric ids decoded from a bit grid.
    Id,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Side of every registered template, in cells.
    pub pattern_size: usize,
    /// Upper bound on the interior sampling grid before averaging.
    pub sample_resolution: usize,
    #[serde(flatten)]
    pub matching: TemplateParams,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            pattern_size: 16,
            sample_resolution: 64,
            matching: TemplateParams::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    pub encoding: IdEncoding,
    /// Bit errors tolerated when decoding; the encoding's default if unset.
    pub max_hamming: Option<u8>,
}

impl IdConfig {
    pub fn effective_max_hamming(&self) -> u8 {
        self.max_hamming
            .unwrap_or_else(|| self.encoding.default_max_hamming())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Initial (or fixed) binarization threshold.
    pub value: u8,
    /// Re-derive the threshold from tracked markers every frame.
    pub auto: bool,
    /// Random thresholds tried when a frame yields nothing.
    pub retries: u32,
    /// Seed of the retry generator.
    pub seed: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            value: 100,
            auto: false,
            retries: 2,
            seed: 0x2545_f491,
        }
    }
}

/// Complete session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Format assumed by [`crate::Tracker::track_buffer`].
    pub pixel_format: PixelFormat,
    pub marker_mode: MarkerMode,
    pub square: SquareParams,
    pub template: TemplateConfig,
    pub id: IdConfig,
    /// Border width as a fraction of the marker side.
    pub border_width: f64,
    pub threshold: ThresholdConfig,
    pub vignetting: Vignetting,
    pub undistortion: Undistortion,
    pub undistort: UndistortConfig,
    pub pose: PoseParams,
    pub fusion: FusionParams,
    pub max_patterns: usize,
    /// Frames a marker may go unseen before its pose history is dropped.
    pub max_stale_frames: u32,
    /// Side length used for markers without a width override.
    pub default_marker_width: f64,
    pub near_clip: f64,
    pub far_clip: f64,
    /// Upper bound on working-buffer bytes; unchecked when `None`.
    pub memory_budget: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Lum,
            marker_mode: MarkerMode::Template,
            square: SquareParams::default(),
            template: TemplateConfig::default(),
            id: IdConfig::default(),
            border_width: 0.25,
            threshold: ThresholdConfig::default(),
            vignetting: Vignetting::default(),
            undistortion: Undistortion::Standard,
            undistort: UndistortConfig::default(),
            pose: PoseParams::default(),
            fusion: FusionParams::default(),
            max_patterns: 32,
            max_stale_frames: 2,
            default_marker_width: 80.0,
            near_clip: 1.0,
            far_clip: 5000.0,
            memory_budget: None,
        }
    }
}

fn invalid(msg: impl Into<String>) -> TrackerError {
    TrackerError::InvalidConfig(msg.into())
}

impl TrackerConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings that cannot produce a working session.
    pub fn validate(&self) -> Result<(), TrackerError> {
        let t = &self.template;
        if !(2..=MAX_PATTERN_SIZE).contains(&t.pattern_size) {
            return Err(invalid(format!("pattern_size {} outside 2..={MAX_PATTERN_SIZE}", t.pattern_size)));
        }
        if t.sample_resolution < t.pattern_size {
            return Err(invalid("sample_resolution below pattern_size"));
        }
        if !(t.matching.min_confidence.is_finite() && (0.0..=1.0).contains(&t.matching.min_confidence)) {
            return Err(invalid("template min_confidence must lie in [0, 1]"));
        }
        if !(t.matching.pca_energy > 0.0 && t.matching.pca_energy <= 1.0) {
            return Err(invalid("pca_energy must lie in (0, 1]"));
        }
        if u32::from(self.id.effective_max_hamming()) > CORRECTABLE {
            return Err(invalid(format!("max_hamming above {CORRECTABLE}")));
        }
        if !(self.border_width > 0.0 && self.border_width < 0.5) {
            return Err(invalid("border_width must lie in (0, 0.5)"));
        }
        if self.square.max_candidates == 0 {
            return Err(invalid("max_candidates must be positive"));
        }
        if !(self.square.min_fill > 0.0 && self.square.min_fill <= self.square.max_fill) {
            return Err(invalid("fill ratio bounds are inverted"));
        }
        if !(self.square.max_area_ratio > 0.0 && self.square.max_area_ratio <= 1.0) {
            return Err(invalid("max_area_ratio must lie in (0, 1]"));
        }
        if self.threshold.auto && self.threshold.retries == 0 {
            return Err(invalid("auto threshold needs at least one retry"));
        }
        if self.max_patterns == 0 {
            return Err(invalid("max_patterns must be positive"));
        }
        if !(self.default_marker_width.is_finite() && self.default_marker_width > 0.0) {
            return Err(invalid("default_marker_width must be positive"));
        }
        if !(self.pose.max_fit_error > 0.0) {
            return Err(invalid("max_fit_error must be positive"));
        }
        if !(self.fusion.decay > 0.0 && self.fusion.decay <= 1.0) {
            return Err(invalid("fusion decay must lie in (0, 1]"));
        }
        if !(self.near_clip > 0.0 && self.far_clip > self.near_clip) {
            return Err(invalid("clip planes must satisfy 0 < near < far"));
        }
        Ok(())
    }

    /// Buffer sizing derived from this config.
    pub fn capacity(&self) -> Capacity {
        Capacity {
            square: self.square.clone(),
            max_patterns: self.max_patterns,
            pattern_size: match self.marker_mode {
                MarkerMode::Template => self.template.pattern_size,
                MarkerMode::Id => ID_GRID,
            },
            lut: self.undistortion == Undistortion::Lut,
        }
    }
}

/// Fixed buffer capacities of one session.
#[derive(Clone, Debug, PartialEq)]
pub struct Capacity {
    pub square: SquareParams,
    pub max_patterns: usize,
    pub pattern_size: usize,
    pub lut: bool,
}

impl Capacity {
    /// Bytes of working memory a session at `width × height` allocates.
    pub fn required_bytes(&self, width: usize, height: usize) -> usize {
        let cells = self.pattern_size * self.pattern_size;
        let luminance = width * height;
        let detector = SquareDetector::required_bytes(&self.square, width, height);
        let threshold_map = ThresholdMap::size_bytes(width, height);
        let lut = if self.lut {
            UndistortTable::size_bytes(width, height)
        } else {
            0
        };
        let templates = self.max_patterns * 4 * cells * std::mem::size_of::<f32>();
        luminance + detector + threshold_map + lut + templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TrackerConfig::default().validate().unwrap();
    }

    #[test]
    fn invalid_settings_are_reported() {
        let cases: Vec<fn(&mut TrackerConfig)> = vec![
            |c| c.template.pattern_size = 1,
            |c| c.template.sample_resolution = 8,
            |c| c.border_width = 0.5,
            |c| c.max_patterns = 0,
            |c| {
                c.threshold.auto = true;
                c.threshold.retries = 0;
            },
            |c| c.id.max_hamming = Some(9),
            |c| c.far_clip = 0.5,
            |c| c.square.max_candidates = 0,
        ];
        for (i, mutate) in cases.into_iter().enumerate() {
            let mut cfg = TrackerConfig::default();
            mutate(&mut cfg);
            assert!(
                matches!(cfg.validate(), Err(TrackerError::InvalidConfig(_))),
                "case {i}"
            );
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: TrackerConfig = serde_json::from_str(
            r#"{ "marker_mode": "id", "id": { "encoding": "simple" }, "threshold": { "auto": true } }"#,
        )
        .unwrap();
        assert_eq!(cfg.marker_mode, MarkerMode::Id);
        assert_eq!(cfg.id.effective_max_hamming(), 0);
        assert!(cfg.threshold.auto);
        assert_eq!(cfg.threshold.retries, 2);
        assert_eq!(cfg.max_patterns, 32);
    }

    #[test]
    fn capacity_grows_with_resolution_and_lut() {
        let mut cfg = TrackerConfig::default();
        let small = cfg.capacity().required_bytes(320, 240);
        let large = cfg.capacity().required_bytes(640, 480);
        assert!(large > small);
        cfg.undistortion = Undistortion::Lut;
        assert_eq!(
            cfg.capacity().required_bytes(320, 240) - small,
            UndistortTable::size_bytes(320, 240)
        );
    }
}
