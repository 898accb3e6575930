//! Frame views over `image` buffers.

use crate::core::{Frame, FrameError, PixelFormat};

/// Borrow an `image::GrayImage` as a luminance frame.
pub fn gray_frame(img: &::image::GrayImage) -> Result<Frame<'_>, FrameError> {
    Frame::new(
        img.width() as usize,
        img.height() as usize,
        PixelFormat::Lum,
        img.as_raw(),
    )
}

/// Borrow an `image::RgbImage` as a packed RGB frame.
pub fn rgb_frame(img: &::image::RgbImage) -> Result<Frame<'_>, FrameError> {
    Frame::new(
        img.width() as usize,
        img.height() as usize,
        PixelFormat::Rgb,
        img.as_raw(),
    )
}

pub fn rgba_frame(img: &::image::RgbaImage) -> Result<Frame<'_>, FrameError> {
    Frame::new(
        img.width() as usize,
        img.height() as usize,
        PixelFormat::Rgba,
        img.as_raw(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_and_grey_views_share_luminance() {
        let rgb = ::image::RgbImage::from_fn(8, 4, |x, _| ::image::Rgb([x as u8 * 10, x as u8 * 10, x as u8 * 10]));
        let gray = ::image::GrayImage::from_fn(8, 4, |x, _| ::image::Luma([x as u8 * 10]));

        let mut a = crate::core::GrayImage::default();
        let mut b = crate::core::GrayImage::default();
        rgb_frame(&rgb).unwrap().luminance_into(&mut a);
        gray_frame(&gray).unwrap().luminance_into(&mut b);
        assert_eq!(a.data, b.data);
        assert_eq!((a.width, a.height), (8, 4));
    }
}
