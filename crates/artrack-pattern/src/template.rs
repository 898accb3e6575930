use crate::error::PatternError;
use crate::id::rotate_grid;
use crate::patt::PattFile;

/// Largest supported template side.
pub const MAX_PATTERN_SIZE: usize = 64;

/// A grey template in its four orientations.
///
/// `variant(k)` is the upright pattern turned `k` quarter turns clockwise,
/// normalized to zero mean and unit norm.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplatePattern {
    size: usize,
    grey: Vec<u8>,
    variants: [Vec<f32>; 4],
}

impl TemplatePattern {
    /// Build from an upright `size × size` grey image.
    pub fn from_grey(size: usize, grey: &[u8]) -> Result<Self, PatternError> {
        check_size(size)?;
        if grey.len() != size * size {
            return Err(PatternError::SizeMismatch {
                expected: size * size,
                got: grey.len(),
            });
        }
        let mut variants: [Vec<f32>; 4] = Default::default();
        let mut turned = Vec::with_capacity(grey.len());
        for (k, v) in variants.iter_mut().enumerate() {
            rotate_grid(grey, size, k as u8, &mut turned);
            *v = normalized(&turned).ok_or(PatternError::FlatTemplate)?;
        }
        Ok(Self {
            size,
            grey: grey.to_vec(),
            variants,
        })
    }

    /// Build from the four stored orientations of a `.patt` file.
    pub fn from_patt(patt: &PattFile) -> Result<Self, PatternError> {
        let size = patt.size();
        check_size(size)?;
        let mut variants: [Vec<f32>; 4] = Default::default();
        for (k, v) in variants.iter_mut().enumerate() {
            // clockwise k == counter-clockwise (4 - k)
            *v = normalized(patt.block((4 - k) % 4)).ok_or(PatternError::FlatTemplate)?;
        }
        Ok(Self {
            size,
            grey: patt.grey().to_vec(),
            variants,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn grey(&self) -> &[u8] {
        &self.grey
    }

    #[inline]
    pub fn variant(&self, k: usize) -> &[f32] {
        &self.variants[k % 4]
    }

    pub fn to_patt(&self) -> Result<PattFile, PatternError> {
        PattFile::from_grey(self.size, &self.grey)
    }
}

fn check_size(size: usize) -> Result<(), PatternError> {
    if (2..=MAX_PATTERN_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(PatternError::UnsupportedSize(size))
    }
}

/// Zero-mean, unit-norm copy of `values`; `None` when they are constant.
pub fn normalized(values: &[u8]) -> Option<Vec<f32>> {
    let mut out = Vec::with_capacity(values.len());
    normalize_into(values, &mut out).then_some(out)
}

/// In-place variant of [`normalized`] reusing `out`.
pub fn normalize_into(values: &[u8], out: &mut Vec<f32>) -> bool {
    out.clear();
    if values.is_empty() {
        return false;
    }
    let mean = values.iter().map(|&v| v as f32).sum::<f32>() / values.len() as f32;
    out.extend(values.iter().map(|&v| v as f32 - mean));
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < 1e-3 {
        return false;
    }
    out.iter_mut().for_each(|v| *v /= norm);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn arrow(size: usize) -> Vec<u8> {
        // dark top-left block on white
        (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                if x < size / 2 && y < size / 4 {
                    0
                } else {
                    255
                }
            })
            .collect()
    }

    #[test]
    fn variants_are_normalized_and_distinct() {
        let t = TemplatePattern::from_grey(8, &arrow(8)).expect("template");
        for k in 0..4 {
            let v = t.variant(k);
            let sum: f32 = v.iter().sum();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-3);
            assert_relative_eq!(norm, 1.0, epsilon = 1e-4);
        }
        assert_ne!(t.variant(0), t.variant(1));
    }

    #[test]
    fn patt_and_grey_templates_agree() {
        let grey = arrow(16);
        let from_grey = TemplatePattern::from_grey(16, &grey).expect("grey");
        let patt = from_grey.to_patt().expect("patt");
        let from_patt = TemplatePattern::from_patt(&patt).expect("patt template");
        assert_eq!(from_patt, from_grey);
    }

    #[test]
    fn invalid_templates_are_rejected() {
        assert!(matches!(
            TemplatePattern::from_grey(4, &[128; 16]),
            Err(PatternError::FlatTemplate)
        ));
        assert!(matches!(
            TemplatePattern::from_grey(4, &[0; 15]),
            Err(PatternError::SizeMismatch { .. })
        ));
        assert!(matches!(
            TemplatePattern::from_grey(1, &[0]),
            Err(PatternError::UnsupportedSize(1))
        ));
    }
}
