//! ID-encoded markers: a 6×6 bit interior carrying the marker number.

use serde::{Deserialize, Serialize};

use crate::bch::{BchCode, CODE_BITS};
use crate::error::PatternError;
use crate::otsu::{binarize, otsu_threshold};

/// Side length of the ID bit grid.
pub const ID_GRID: usize = 6;

/// Whitening mask applied to every codeword.
const XOR_MASK: u64 = 0x8_E1A5_96C3;

/// How an id is spread over the 36 interior bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdEncoding {
    /// 9-bit id repeated four times; 512 ids, exact match by default.
    Simple,
    /// 12-bit id protected by BCH(36, 12); 4096 ids.
    #[default]
    Bch,
}

impl IdEncoding {
    pub fn id_count(self) -> u32 {
        match self {
            IdEncoding::Simple => 512,
            IdEncoding::Bch => 4096,
        }
    }

    pub fn default_max_hamming(self) -> u8 {
        match self {
            IdEncoding::Simple => 0,
            IdEncoding::Bch => 3,
        }
    }
}

/// Bit codes for every id of one encoding.
#[derive(Clone, Debug)]
pub struct IdDictionary {
    encoding: IdEncoding,
    codes: Vec<u64>,
}

impl IdDictionary {
    pub fn new(encoding: IdEncoding) -> Self {
        let codes = match encoding {
            IdEncoding::Simple => (0..encoding.id_count() as u64)
                .map(|id| (id | id << 9 | id << 18 | id << 27) ^ XOR_MASK)
                .collect(),
            IdEncoding::Bch => {
                let bch = BchCode::new();
                (0..encoding.id_count() as u16)
                    .map(|id| bch.encode(id) ^ XOR_MASK)
                    .collect()
            }
        };
        Self { encoding, codes }
    }

    #[inline]
    pub fn encoding(&self) -> IdEncoding {
        self.encoding
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Interior bits of marker `id` as printed (row-major, dark = 1).
    pub fn code(&self, id: u32) -> Result<u64, PatternError> {
        self.codes
            .get(id as usize)
            .copied()
            .ok_or(PatternError::IdOutOfRange {
                id,
                max: self.encoding.id_count() - 1,
            })
    }
}

/// A decoded id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdMatch {
    pub id: u32,
    /// Rotation `0..=3` with `observed == rotate_code(code, rotation)`.
    pub rotation: u8,
    pub hamming: u8,
}

impl IdMatch {
    /// Fraction of bits that agree with the codeword.
    pub fn confidence(&self) -> f64 {
        1.0 - self.hamming as f64 / CODE_BITS as f64
    }
}

/// Brute-force bounded-distance decoder over all ids and rotations.
#[derive(Clone, Debug)]
pub struct IdMatcher {
    dict: IdDictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl IdMatcher {
    pub fn new(dict: IdDictionary, max_hamming: u8) -> Self {
        let rotated = dict
            .codes
            .iter()
            .map(|&c| [0u8, 1, 2, 3].map(|r| rotate_code(c, ID_GRID, r)))
            .collect();
        Self {
            dict,
            max_hamming,
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &IdDictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Nearest codeword within `max_hamming`; the first id wins ties.
    pub fn match_code(&self, observed: u64) -> Option<IdMatch> {
        let mut best: Option<IdMatch> = None;
        for (id, rots) in self.rotated.iter().enumerate() {
            for (rotation, &cand) in rots.iter().enumerate() {
                let hamming = (observed ^ cand).count_ones() as u8;
                if hamming > self.max_hamming || best.is_some_and(|b| b.hamming <= hamming) {
                    continue;
                }
                best = Some(IdMatch {
                    id: id as u32,
                    rotation: rotation as u8,
                    hamming,
                });
                if hamming == 0 {
                    return best;
                }
            }
        }
        best
    }

    /// Binarize `samples` (`6 × 6` grey cells) with Otsu and decode.
    pub fn decode_samples(&self, samples: &[u8]) -> Option<IdMatch> {
        if samples.len() != ID_GRID * ID_GRID {
            return None;
        }
        let code = binarize(samples, otsu_threshold(samples));
        self.match_code(code)
    }
}

/// Rotate a row-major `n × n` bit code (`idx = y * n + x`) clockwise by
/// `rot` quarter turns.
pub fn rotate_code(code: u64, n: usize, rot: u8) -> u64 {
    rotate_cells(n, rot, |idx| (code >> idx) & 1)
        .fold(0u64, |out, (didx, bit)| out | bit << didx)
}

/// Rotate a row-major `n × n` grid clockwise by `rot` quarter turns.
pub fn rotate_grid<T: Copy>(src: &[T], n: usize, rot: u8, dst: &mut Vec<T>) {
    dst.clear();
    dst.extend(rotate_cells(n, rot, |idx| src[idx]).map(|(_, v)| v));
}

fn rotate_cells<T>(
    n: usize,
    rot: u8,
    get: impl Fn(usize) -> T,
) -> impl Iterator<Item = (usize, T)> {
    let rot = rot & 3;
    (0..n * n).map(move |didx| {
        let (x, y) = (didx % n, didx / n);
        let (sx, sy) = match rot {
            0 => (x, y),
            1 => (y, n - 1 - x),
            2 => (n - 1 - x, n - 1 - y),
            _ => (n - 1 - y, x),
        };
        (didx, get(sy * n + sx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0_9ABC_DEF1_u64;
        let mut r = code;
        for _ in 0..4 {
            r = rotate_code(r, ID_GRID, 1);
        }
        assert_eq!(r, code);
        assert_ne!(rotate_code(code, ID_GRID, 1), code);
    }

    #[test]
    fn grid_rotation_moves_top_left_clockwise() {
        let grid = [1u8, 2, 3, 4];
        let mut out = Vec::new();
        rotate_grid(&grid, 2, 1, &mut out);
        assert_eq!(out, vec![3, 1, 4, 2]);
    }

    #[test]
    fn simple_ids_decode_exactly_in_every_rotation() {
        let dict = IdDictionary::new(IdEncoding::Simple);
        let matcher = IdMatcher::new(dict.clone(), 0);
        for id in [0u32, 1, 7, 42, 300, 511] {
            let code = dict.code(id).expect("id");
            for rot in 0..4u8 {
                let m = matcher
                    .match_code(rotate_code(code, ID_GRID, rot))
                    .expect("match");
                assert_eq!((m.id, m.rotation, m.hamming), (id, rot, 0));
            }
        }
        assert!(matcher.match_code(dict.code(5).expect("id") ^ 1).is_none());
    }

    #[test]
    fn bch_ids_survive_two_bit_errors() {
        let dict = IdDictionary::new(IdEncoding::Bch);
        let matcher = IdMatcher::new(dict.clone(), 3);
        for id in [0u32, 1, 7, 42, 100, 1234, 4095] {
            let code = dict.code(id).expect("id");
            let noisy = rotate_code(code ^ (1 << 3) ^ (1 << 20), ID_GRID, 2);
            let m = matcher.match_code(noisy).expect("match");
            assert_eq!((m.id, m.rotation, m.hamming), (id, 2, 2));
            assert_relative_eq!(m.confidence(), 1.0 - 2.0 / 36.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn out_of_range_id_is_an_error() {
        let dict = IdDictionary::new(IdEncoding::Simple);
        assert!(matches!(
            dict.code(512),
            Err(PatternError::IdOutOfRange { id: 512, max: 511 })
        ));
    }

    #[test]
    fn samples_are_binarized_before_matching() {
        let dict = IdDictionary::new(IdEncoding::Bch);
        let code = dict.code(42).expect("id");
        let samples: Vec<u8> = (0..36)
            .map(|i| if code >> i & 1 == 1 { 30 } else { 220 })
            .collect();
        let matcher = IdMatcher::new(dict, 3);
        let m = matcher.decode_samples(&samples).expect("decoded");
        assert_eq!((m.id, m.rotation), (42, 0));
    }

    #[test]
    fn encoding_names_are_snake_case() {
        assert_eq!(serde_json::to_string(&IdEncoding::Bch).expect("serialize"), r#""bch""#);
        let simple: IdEncoding = serde_json::from_str(r#""simple""#).expect("deserialize");
        assert_eq!(simple, IdEncoding::Simple);
        assert_eq!(simple.id_count(), 512);
        assert!(serde_json::from_str::<IdEncoding>(r#""hamming""#).is_err());
    }
}
