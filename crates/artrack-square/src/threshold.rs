//! Per-pixel binarization threshold with optional vignetting compensation.

use serde::{Deserialize, Serialize};

/// Brightness falloff towards the image border, in grey levels.
///
/// Values are differences relative to the centre: the effective threshold at
/// a pixel is `base - falloff(x, y)`. The falloff is `0` at the centre,
/// `left_right` halfway down the left/right edges, `top_bottom` halfway along
/// the top/bottom edges and `corners` at the four corners; everything in
/// between is interpolated bilinearly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vignetting {
    pub enabled: bool,
    pub corners: i16,
    pub left_right: i16,
    pub top_bottom: i16,
}

impl Vignetting {
    /// Falloff at normalized offsets `|u|, |v| ∈ [0, 1]` from the centre.
    #[inline]
    fn falloff(&self, u: f32, v: f32) -> f32 {
        (1.0 - v) * u * self.left_right as f32
            + v * (1.0 - u) * self.top_bottom as f32
            + u * v * self.corners as f32
    }

    fn is_identity(&self) -> bool {
        !self.enabled || (self.corners == 0 && self.left_right == 0 && self.top_bottom == 0)
    }
}

/// Falloff offsets for every pixel of the processed grid.
///
/// Rebuilt only when the grid size or the coefficients change.
#[derive(Clone, Debug, Default)]
pub struct ThresholdMap {
    width: usize,
    height: usize,
    vignetting: Vignetting,
    offsets: Vec<i16>,
}

impl ThresholdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the map match `width × height` and `vignetting`.
    ///
    /// Returns `true` when the offsets were recomputed.
    pub fn update(&mut self, width: usize, height: usize, vignetting: Vignetting) -> bool {
        if vignetting.is_identity() {
            let changed = !self.offsets.is_empty();
            self.offsets.clear();
            self.width = width;
            self.height = height;
            self.vignetting = vignetting;
            return changed;
        }
        if self.width == width
            && self.height == height
            && self.vignetting == vignetting
            && self.offsets.len() == width * height
        {
            return false;
        }

        self.width = width;
        self.height = height;
        self.vignetting = vignetting;
        self.offsets.clear();
        self.offsets.reserve(width * height);

        let cx = (width.max(2) - 1) as f32 * 0.5;
        let cy = (height.max(2) - 1) as f32 * 0.5;
        for y in 0..height {
            let v = ((y as f32 - cy) / cy).abs();
            for x in 0..width {
                let u = ((x as f32 - cx) / cx).abs();
                self.offsets.push(vignetting.falloff(u, v).round() as i16);
            }
        }
        log::debug!("rebuilt {width}x{height} vignetting threshold map");
        true
    }

    /// True when every pixel uses the base threshold.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Effective threshold at pixel `(x, y)` of the processed grid.
    #[inline]
    pub fn threshold_at(&self, base: u8, x: usize, y: usize) -> u8 {
        if self.offsets.is_empty() {
            return base;
        }
        let off = self.offsets[y * self.width + x];
        (base as i16 - off).clamp(0, 255) as u8
    }

    pub fn size_bytes(width: usize, height: usize) -> usize {
        width * height * std::mem::size_of::<i16>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vignetting() -> Vignetting {
        Vignetting {
            enabled: true,
            corners: 40,
            left_right: 20,
            top_bottom: 10,
        }
    }

    #[test]
    fn nine_control_points_are_honoured() {
        let mut map = ThresholdMap::new();
        assert!(map.update(101, 51, vignetting()));

        assert_eq!(map.threshold_at(100, 50, 25), 100);
        assert_eq!(map.threshold_at(100, 0, 0), 60);
        assert_eq!(map.threshold_at(100, 100, 50), 60);
        assert_eq!(map.threshold_at(100, 0, 25), 80);
        assert_eq!(map.threshold_at(100, 100, 25), 80);
        assert_eq!(map.threshold_at(100, 50, 0), 90);
        assert_eq!(map.threshold_at(100, 50, 50), 90);
    }

    #[test]
    fn offsets_clamp_to_grey_range() {
        let mut map = ThresholdMap::new();
        map.update(11, 11, vignetting());
        assert_eq!(map.threshold_at(10, 0, 0), 0);
    }

    #[test]
    fn map_is_rebuilt_only_on_change() {
        let mut map = ThresholdMap::new();
        assert!(map.update(64, 48, vignetting()));
        assert!(!map.update(64, 48, vignetting()));
        assert!(map.update(32, 24, vignetting()));

        let disabled = Vignetting {
            enabled: false,
            ..vignetting()
        };
        assert!(map.update(32, 24, disabled));
        assert!(map.is_uniform());
        assert_eq!(map.threshold_at(77, 0, 0), 77);
    }
}
