//! The `.patt` text format.
//!
//! A file holds four blocks, one per orientation; each block is three colour
//! planes of `size × size` whitespace-separated grey values. Block `h` shows
//! the pattern turned `h` quarter turns counter-clockwise.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::PatternError;
use crate::id::rotate_grid;

const PLANES: usize = 3;

/// Parsed `.patt` content reduced to grey.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PattFile {
    size: usize,
    blocks: [Vec<u8>; 4],
}

impl PattFile {
    /// Parse a file, inferring the pattern size from the value count.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let values = parse_values(text)?;
        let per_block = values.len() / 4 / PLANES;
        let size = (per_block as f64).sqrt().round() as usize;
        if size == 0 || size * size * PLANES * 4 != values.len() {
            return Err(PatternError::Malformed(format!(
                "{} values do not form 4 blocks of 3 square planes",
                values.len()
            )));
        }
        Self::from_values(size, &values)
    }

    /// Parse a file with a known pattern size.
    pub fn parse_with_size(text: &str, size: usize) -> Result<Self, PatternError> {
        let values = parse_values(text)?;
        let expected = size * size * PLANES * 4;
        if values.len() != expected {
            return Err(PatternError::SizeMismatch {
                expected,
                got: values.len(),
            });
        }
        Self::from_values(size, &values)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PatternError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PatternError::Malformed(format!("not utf-8: {e}")))?;
        Self::parse(text)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, PatternError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Four orientations of a canonical `size × size` grey pattern.
    pub fn from_grey(size: usize, grey: &[u8]) -> Result<Self, PatternError> {
        if grey.len() != size * size {
            return Err(PatternError::SizeMismatch {
                expected: size * size,
                got: grey.len(),
            });
        }
        let mut blocks: [Vec<u8>; 4] = Default::default();
        for (h, block) in blocks.iter_mut().enumerate() {
            // counter-clockwise h == clockwise (4 - h)
            rotate_grid(grey, size, ((4 - h) % 4) as u8, block);
        }
        Ok(Self { size, blocks })
    }

    fn from_values(size: usize, values: &[u8]) -> Result<Self, PatternError> {
        let plane = size * size;
        let mut blocks: [Vec<u8>; 4] = Default::default();
        for (h, block) in blocks.iter_mut().enumerate() {
            let base = h * PLANES * plane;
            block.extend((0..plane).map(|i| {
                let sum: u32 = (0..PLANES)
                    .map(|p| values[base + p * plane + i] as u32)
                    .sum();
                ((sum + 1) / PLANES as u32) as u8
            }));
        }
        Ok(Self { size, blocks })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block `h`: the pattern turned `h` quarter turns counter-clockwise.
    #[inline]
    pub fn block(&self, h: usize) -> &[u8] {
        &self.blocks[h % 4]
    }

    /// Upright pattern.
    #[inline]
    pub fn grey(&self) -> &[u8] {
        &self.blocks[0]
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            for _ in 0..PLANES {
                for row in block.chunks(self.size) {
                    for (i, v) in row.iter().enumerate() {
                        let sep = if i == 0 { "" } else { " " };
                        let _ = write!(out, "{sep}{v:3}");
                    }
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), PatternError> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

fn parse_values(text: &str) -> Result<Vec<u8>, PatternError> {
    text.split_ascii_whitespace()
        .map(|tok| {
            tok.parse::<u8>()
                .map_err(|_| PatternError::Malformed(format!("bad grey value {tok:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size: usize) -> Vec<u8> {
        (0..size * size).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn text_round_trip_keeps_all_blocks() {
        let patt = PattFile::from_grey(4, &ramp(4)).expect("patt");
        let text = patt.to_text();
        let back = PattFile::parse(&text).expect("parse");
        assert_eq!(back, patt);
        assert_eq!(PattFile::parse_with_size(&text, 4).expect("sized"), patt);
    }

    #[test]
    fn blocks_rotate_counter_clockwise() {
        let grey = [1u8, 2, 3, 4];
        let patt = PattFile::from_grey(2, &grey).expect("patt");
        assert_eq!(patt.block(0), &grey);
        // top-right moves to top-left
        assert_eq!(patt.block(1), &[2, 4, 1, 3]);
        assert_eq!(patt.block(2), &[4, 3, 2, 1]);
    }

    #[test]
    fn colour_planes_are_averaged() {
        let mut text = String::new();
        for _ in 0..4 {
            text.push_str("10\n20\n30\n\n");
        }
        let patt = PattFile::parse(&text).expect("parse");
        assert_eq!(patt.size(), 1);
        assert_eq!(patt.grey(), &[20]);
    }

    #[test]
    fn malformed_input_is_reported() {
        assert!(matches!(
            PattFile::parse("1 2 3"),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            PattFile::parse("abc"),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            PattFile::parse_with_size(&"0 ".repeat(48), 3),
            Err(PatternError::SizeMismatch {
                expected: 108,
                got: 48
            })
        ));
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hiro.patt");
        let patt = PattFile::from_grey(8, &ramp(8)).expect("patt");
        patt.write(&path).expect("write");
        assert_eq!(PattFile::read(&path).expect("read"), patt);
    }
}
