//! Camera frames, pixel formats and the luminance plane the pipeline runs on.

use serde::{Deserialize, Serialize};

/// Pixel layouts accepted by the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Abgr,
    /// 16-bit little-endian `RRRRRGGG GGGBBBBB`.
    Rgb565,
    /// Single-channel luminance.
    Lum,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Abgr => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Lum => 1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid frame buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
}

/// Borrowed camera frame. Immutable for the duration of one tracking call.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: &'a [u8],
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let expected = width * height * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(FrameError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Convert the frame into `out`, reusing its allocation.
    ///
    /// The format is resolved once; each arm runs its own tight loop.
    pub fn luminance_into(&self, out: &mut GrayImage) {
        out.width = self.width;
        out.height = self.height;
        out.data.clear();
        out.data.reserve(self.width * self.height);

        let src = self.data;
        match self.format {
            PixelFormat::Lum => out.data.extend_from_slice(src),
            PixelFormat::Rgb => out
                .data
                .extend(src.chunks_exact(3).map(|p| weighted_lum(p[0], p[1], p[2]))),
            PixelFormat::Bgr => out
                .data
                .extend(src.chunks_exact(3).map(|p| weighted_lum(p[2], p[1], p[0]))),
            PixelFormat::Rgba => out
                .data
                .extend(src.chunks_exact(4).map(|p| weighted_lum(p[0], p[1], p[2]))),
            PixelFormat::Bgra => out
                .data
                .extend(src.chunks_exact(4).map(|p| weighted_lum(p[2], p[1], p[0]))),
            PixelFormat::Abgr => out
                .data
                .extend(src.chunks_exact(4).map(|p| weighted_lum(p[3], p[2], p[1]))),
            PixelFormat::Rgb565 => out.data.extend(
                src.chunks_exact(2)
                    .map(|p| rgb565_lum(u16::from_le_bytes([p[0], p[1]]))),
            ),
        }
    }
}

#[inline(always)]
fn weighted_lum(r: u8, g: u8, b: u8) -> u8 {
    ((r as u16 + 2 * g as u16 + b as u16) >> 2) as u8
}

#[inline(always)]
fn rgb565_lum(px: u16) -> u8 {
    let r5 = (px >> 11) & 0x1f;
    let g6 = (px >> 5) & 0x3f;
    let b5 = px & 0x1f;
    let r = ((r5 << 3) | (r5 >> 2)) as u8;
    let g = ((g6 << 2) | (g6 >> 4)) as u8;
    let b = ((b5 << 3) | (b5 >> 2)) as u8;
    weighted_lum(r, g, b)
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, Default)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Empty plane with room for `width * height` pixels.
    pub fn with_capacity(width: usize, height: usize) -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::with_capacity(width * height),
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    // clamp-to-edge
    let x = x.clamp(0, src.width as i32 - 1);
    let y = y.clamp(0, src.height as i32 - 1);
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).clamp(0.0, 255.0) as u8
}
